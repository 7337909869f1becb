//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)), and exactly 100 when
//! avg_loss == 0. Needs n + 1 closes (n price changes).

use super::{require, span, NotReady, Reading};

pub const DEFAULT_PERIOD: usize = 14;

pub fn rsi(closes: &[f64], period: usize) -> Reading<f64> {
    compute(closes, period).into()
}

fn compute(closes: &[f64], period: usize) -> Result<f64, NotReady> {
    require(period, span(period, 1)?, closes.len())?;

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: f64| if c > 0.0 { c } else { 0.0 };
    let loss = |c: f64| if c < 0.0 { -c } else { 0.0 };

    let n = period as f64;
    let mut avg_gain = changes[..period].iter().map(|&c| gain(c)).sum::<f64>() / n;
    let mut avg_loss = changes[..period].iter().map(|&c| loss(c)).sum::<f64>() / n;

    for &c in &changes[period..] {
        avg_gain = (avg_gain * (n - 1.0) + gain(c)) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss(c)) / n;
    }

    if avg_loss == 0.0 {
        return Ok(100.0);
    }
    Ok(100.0 - (100.0 / (1.0 + avg_gain / avg_loss)))
}
