//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of the MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9. Requires at least
//! slow + signal closes.

use super::ema::ema_series;
use super::{require, span, NotReady, Reading};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Reading<Macd> {
    compute(closes, fast, slow, signal).into()
}

pub fn macd_default(closes: &[f64]) -> Reading<Macd> {
    macd(closes, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}

fn compute(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Result<Macd, NotReady> {
    if fast == 0 || signal == 0 || fast >= slow {
        return Err(NotReady::Malformed);
    }
    let need = span(slow, signal)?;
    require(slow, need, closes.len())?;

    let fast_ema = ema_series(closes, fast)?;
    let slow_ema = ema_series(closes, slow)?;

    // slow_ema[0] sits at closes[slow - 1]; fast_ema is longer by slow - fast.
    let offset = slow - fast;
    let line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, s)| fast_ema[i + offset] - s)
        .collect();

    let signal_series = ema_series(&line, signal)?;
    let (Some(&line_now), Some(&signal_now)) = (line.last(), signal_series.last()) else {
        return Err(NotReady::History {
            need,
            have: closes.len(),
        });
    };

    Ok(Macd {
        line: line_now,
        signal: signal_now,
        histogram: line_now - signal_now,
    })
}
