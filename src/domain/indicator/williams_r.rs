//! Williams %R.
//!
//! %R = (highest high - close) / (highest high - lowest low) × -100 over the
//! trailing n bars, ranging from -100 (at the low) to 0 (at the high). A
//! window with no range reads as -50.

use super::stochastic::percent_k;
use super::{require, same_len, NotReady, Reading};

pub const DEFAULT_PERIOD: usize = 14;

pub fn williams_r(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Reading<f64> {
    compute(highs, lows, closes, period).into()
}

fn compute(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Result<f64, NotReady> {
    let len = same_len(highs, lows, closes)?;
    require(period, period, len)?;
    let end = len - 1;
    Ok(percent_k(highs, lows, closes[end], len - period, end) - 100.0)
}
