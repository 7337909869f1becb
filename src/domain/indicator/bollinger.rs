//! Bollinger Bands.
//!
//! - Middle: simple moving average over the trailing n closes
//! - Upper: middle + k × stddev
//! - Lower: middle - k × stddev
//!
//! StdDev is the population standard deviation (divides by N, not N-1).
//! Default parameters: period=20, k=2.0.

use super::{mean, require, NotReady, Reading};

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_K: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Reading<Bands> {
    compute(closes, period, k).into()
}

fn compute(closes: &[f64], period: usize, k: f64) -> Result<Bands, NotReady> {
    require(period, period, closes.len())?;
    if !k.is_finite() || k < 0.0 {
        return Err(NotReady::Malformed);
    }

    let window = &closes[closes.len() - period..];
    let middle = mean(window);
    let stddev = population_stddev(window, middle);

    Ok(Bands {
        upper: middle + k * stddev,
        middle,
        lower: middle - k * stddev,
    })
}

fn population_stddev(window: &[f64], mean: f64) -> f64 {
    let variance = window
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / window.len() as f64;
    variance.sqrt()
}
