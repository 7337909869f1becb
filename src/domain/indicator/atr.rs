//! Average True Range.
//!
//! True range needs the previous close, so the trailing window of n true
//! ranges spans n + 1 bars. ATR is their simple mean.

use super::{mean, require, same_len, span, NotReady, Reading};

pub const DEFAULT_PERIOD: usize = 14;

pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Reading<f64> {
    compute(highs, lows, closes, period).into()
}

fn compute(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Result<f64, NotReady> {
    let len = same_len(highs, lows, closes)?;
    require(period, span(period, 1)?, len)?;

    let ranges: Vec<f64> = (len - period..len)
        .map(|i| true_range(highs[i], lows[i], closes[i - 1]))
        .collect();
    Ok(mean(&ranges))
}

pub(crate) fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}
