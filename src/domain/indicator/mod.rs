//! Technical indicator library.
//!
//! Pure functions over ordered price columns (oldest first). Each returns the
//! value at the newest point as a [`Reading`], which is either `Ready` or a
//! typed `NotReady` explaining why nothing could be computed. A short series
//! never panics and never produces a placeholder zero.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod cci;
pub mod ema;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod stochastic;
pub mod williams_r;

pub use adx::{adx, Adx};
pub use atr::atr;
pub use bollinger::{bollinger, Bands};
pub use cci::cci;
pub use ema::ema;
pub use macd::{macd, Macd};
pub use roc::roc;
pub use rsi::rsi;
pub use stochastic::{stochastic, Stochastic};
pub use williams_r::williams_r;

use std::fmt;

/// Why an indicator call produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    /// The series is shorter than the indicator's look-back.
    History { need: usize, have: usize },
    /// Zero period, fast >= slow, mismatched column lengths, or a zero
    /// divisor in the input prices.
    Malformed,
}

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReady::History { need, have } => {
                write!(f, "need {} points, have {}", need, have)
            }
            NotReady::Malformed => write!(f, "malformed input"),
        }
    }
}

/// Result of a single indicator evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    Ready(T),
    NotReady(NotReady),
}

impl<T> Reading<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Reading::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Reading::Ready(v) => Some(v),
            Reading::NotReady(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reading<U> {
        match self {
            Reading::Ready(v) => Reading::Ready(f(v)),
            Reading::NotReady(why) => Reading::NotReady(why),
        }
    }
}

impl<T> From<Result<T, NotReady>> for Reading<T> {
    fn from(result: Result<T, NotReady>) -> Self {
        match result {
            Ok(v) => Reading::Ready(v),
            Err(why) => Reading::NotReady(why),
        }
    }
}

/// Gate shared by every indicator: a positive period and at least `need` points.
pub(crate) fn require(period: usize, need: usize, have: usize) -> Result<(), NotReady> {
    if period == 0 {
        return Err(NotReady::Malformed);
    }
    if have < need {
        return Err(NotReady::History { need, have });
    }
    Ok(())
}

/// `a + b` as a look-back length. A period so large the sum overflows can
/// never be satisfied and is treated as malformed.
pub(crate) fn span(a: usize, b: usize) -> Result<usize, NotReady> {
    a.checked_add(b).ok_or(NotReady::Malformed)
}

/// Highs, lows and closes must line up bar for bar.
pub(crate) fn same_len(highs: &[f64], lows: &[f64], closes: &[f64]) -> Result<usize, NotReady> {
    if highs.len() != lows.len() || lows.len() != closes.len() {
        return Err(NotReady::Malformed);
    }
    Ok(closes.len())
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn highest(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

pub(crate) fn lowest(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
