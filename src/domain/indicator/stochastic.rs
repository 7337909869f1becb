//! Stochastic oscillator.
//!
//! %K = (close - lowest low) / (highest high - lowest low) × 100 over the
//! trailing n bars; %D = simple mean of the last d %K values. A window with
//! no range reads as 50. Needs n + d - 1 bars.

use super::{highest, lowest, mean, require, same_len, span, NotReady, Reading};

pub const DEFAULT_PERIOD: usize = 14;
pub const DEFAULT_D_PERIOD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stochastic {
    pub k: f64,
    pub d: f64,
}

pub fn stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    d_period: usize,
) -> Reading<Stochastic> {
    compute(highs, lows, closes, period, d_period).into()
}

fn compute(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    d_period: usize,
) -> Result<Stochastic, NotReady> {
    let len = same_len(highs, lows, closes)?;
    if d_period == 0 {
        return Err(NotReady::Malformed);
    }
    require(period, span(period, d_period)? - 1, len)?;

    let ks: Vec<f64> = (len - d_period..len)
        .map(|i| percent_k(highs, lows, closes[i], i + 1 - period, i))
        .collect();

    Ok(Stochastic {
        k: ks[ks.len() - 1],
        d: mean(&ks),
    })
}

pub(crate) fn percent_k(highs: &[f64], lows: &[f64], close: f64, start: usize, end: usize) -> f64 {
    let hh = highest(&highs[start..=end]);
    let ll = lowest(&lows[start..=end]);
    let range = hh - ll;
    if range == 0.0 {
        return 50.0;
    }
    (close - ll) / range * 100.0
}
