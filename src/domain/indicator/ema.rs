//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the simple mean of the first n closes, then
//! ema = (price - ema) * k + ema for every later close.

use super::{mean, require, NotReady, Reading};

pub fn ema(closes: &[f64], period: usize) -> Reading<f64> {
    latest(closes, period).into()
}

fn latest(closes: &[f64], period: usize) -> Result<f64, NotReady> {
    let series = ema_series(closes, period)?;
    series.last().copied().ok_or(NotReady::History {
        need: period,
        have: closes.len(),
    })
}

/// Every EMA value from the seed onward; element 0 lines up with
/// `closes[period - 1]`.
pub(crate) fn ema_series(closes: &[f64], period: usize) -> Result<Vec<f64>, NotReady> {
    require(period, period, closes.len())?;

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = mean(&closes[..period]);
    let mut out = Vec::with_capacity(closes.len() - period + 1);
    out.push(ema);
    for &price in &closes[period..] {
        ema = (price - ema) * k + ema;
        out.push(ema);
    }
    Ok(out)
}
