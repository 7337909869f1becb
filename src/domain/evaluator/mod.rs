//! Rule evaluators.
//!
//! One pure function per alert kind, each mapping `(alert, snapshot)` to a
//! [`Decision`]. Evaluators never perform I/O: the orchestrator delivers the
//! message and applies the [`Effect`] afterwards.
//!
//! # Outcomes
//!
//! - `Quiet`: the data was there and the condition does not hold.
//! - `Skipped`: some input was unavailable or not ready. Never a trigger and
//!   never a mutation.
//! - `Fired`: one or more triggers, each with its own message and effect.
//!   Only portfolio limits can fire twice (one per bound).
//!
//! An alert whose stored fields make no sense (non-positive base price,
//! stop above take, ...) yields `EngineError::InvalidAlert`.

pub mod indicator;
pub mod percent;
pub mod portfolio;
pub mod price;
pub mod risk;
pub mod volume;
pub mod watchlist;

use crate::domain::alert::{Alert, AlertId, AlertKind, Bound};
use crate::domain::error::EngineError;
use crate::domain::indicator::NotReady;
use crate::domain::snapshot::MarketSnapshot;
use std::fmt;

/// Record mutation to apply after a trigger was delivered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Leave the record as is; it stays eligible next cycle.
    Keep,
    Delete,
    ResetBaseline { new_base: f64 },
    ClearBound(Bound),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub message: String,
    pub effect: Effect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoQuote { symbol: String },
    NoVolumeWindow,
    ZeroAverageVolume,
    IndicatorMissing,
    IndicatorNotReady(NotReady),
    PartialPortfolio { symbol: String },
    EmptyPortfolio,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoQuote { symbol } => write!(f, "no quote for {}", symbol),
            SkipReason::NoVolumeWindow => write!(f, "no volume window"),
            SkipReason::ZeroAverageVolume => write!(f, "average volume is zero"),
            SkipReason::IndicatorMissing => write!(f, "indicator value missing"),
            SkipReason::IndicatorNotReady(why) => write!(f, "indicator not ready: {}", why),
            SkipReason::PartialPortfolio { symbol } => {
                write!(f, "portfolio incomplete, no quote for {}", symbol)
            }
            SkipReason::EmptyPortfolio => write!(f, "portfolio has no holdings"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Quiet,
    Skipped(SkipReason),
    Fired(Vec<Trigger>),
}

impl Decision {
    pub fn fire(message: String, effect: Effect) -> Self {
        Decision::Fired(vec![Trigger { message, effect }])
    }

    pub fn no_quote(symbol: &str) -> Self {
        Decision::Skipped(SkipReason::NoQuote {
            symbol: symbol.to_string(),
        })
    }

    pub fn is_fired(&self) -> bool {
        matches!(self, Decision::Fired(_))
    }
}

/// Post-trigger effect for alerts whose only lifecycle choice is the repeat flag.
pub(crate) fn keep_or_delete(repeat: bool) -> Effect {
    if repeat {
        Effect::Keep
    } else {
        Effect::Delete
    }
}

pub(crate) fn invalid(kind: AlertKind, id: AlertId, reason: impl Into<String>) -> EngineError {
    EngineError::InvalidAlert {
        kind: kind.to_string(),
        id,
        reason: reason.into(),
    }
}

/// Absolute percent deviation of `price` from `base`. `base` must be positive.
pub(crate) fn percent_change(price: f64, base: f64) -> f64 {
    ((price - base) / base * 100.0).abs()
}

/// Two decimals with thousands separators: `4900` → `4,900.00`.
pub(crate) fn money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac)
}

/// Dispatches to the evaluator for the alert's kind.
pub fn evaluate(alert: &Alert, snapshot: &MarketSnapshot) -> Result<Decision, EngineError> {
    match alert {
        Alert::Price(a) => price::evaluate(a, snapshot),
        Alert::Percent(a) => percent::evaluate(a, snapshot),
        Alert::Volume(a) => volume::evaluate(a, snapshot),
        Alert::Risk(a) => risk::evaluate(a, snapshot),
        Alert::Indicator(a) => indicator::evaluate(a, snapshot),
        Alert::PortfolioLimit(p) => portfolio::evaluate(p, snapshot),
        Alert::Watchlist(w) => watchlist::evaluate(w, snapshot),
    }
}
