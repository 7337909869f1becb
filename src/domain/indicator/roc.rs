//! ROC (Rate of Change).
//!
//! ROC(n) = ((C[t] - C[t-n]) / C[t-n]) × 100. Needs n + 1 closes; a zero
//! reference close is malformed rather than a zero rate.

use super::{require, span, NotReady, Reading};

pub fn roc(closes: &[f64], period: usize) -> Reading<f64> {
    compute(closes, period).into()
}

fn compute(closes: &[f64], period: usize) -> Result<f64, NotReady> {
    require(period, span(period, 1)?, closes.len())?;

    let curr = closes[closes.len() - 1];
    let prev = closes[closes.len() - 1 - period];
    if prev == 0.0 {
        return Err(NotReady::Malformed);
    }
    Ok((curr - prev) / prev * 100.0)
}
