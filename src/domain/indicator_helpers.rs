//! Indicator selection for indicator-conditioned alerts.
//!
//! An [`IndicatorField`] names one scalar an alert can compare against
//! (RSI, one MACD line, one Bollinger band, ...), knows how many candles it
//! needs, and computes itself from a candle series.

use crate::domain::candle::Columns;
use crate::domain::engine_config::MAX_CANDLE_LIMIT;
use crate::domain::indicator::{self, adx, atr, bollinger, cci, macd, rsi, stochastic, williams_r, Reading};
use std::fmt;
use std::str::FromStr;

const DEFAULT_ROC_PERIOD: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorField {
    Rsi(usize),
    Ema(usize),
    Macd,
    MacdSignal,
    MacdHistogram,
    StochK,
    StochD,
    Cci(usize),
    Atr(usize),
    Adx(usize),
    PlusDi(usize),
    MinusDi(usize),
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
    WilliamsR(usize),
    Roc(usize),
}

impl IndicatorField {
    /// Candles required before [`IndicatorField::compute`] can be ready.
    pub fn lookback(&self) -> usize {
        match *self {
            IndicatorField::Rsi(n) | IndicatorField::Atr(n) | IndicatorField::Roc(n) => n.saturating_add(1),
            IndicatorField::Ema(n) | IndicatorField::Cci(n) | IndicatorField::WilliamsR(n) => n,
            IndicatorField::Macd | IndicatorField::MacdSignal | IndicatorField::MacdHistogram => {
                macd::DEFAULT_SLOW + macd::DEFAULT_SIGNAL
            }
            IndicatorField::StochK | IndicatorField::StochD => {
                stochastic::DEFAULT_PERIOD + stochastic::DEFAULT_D_PERIOD - 1
            }
            IndicatorField::Adx(n) | IndicatorField::PlusDi(n) | IndicatorField::MinusDi(n) => n.saturating_mul(2),
            IndicatorField::BollingerUpper
            | IndicatorField::BollingerMiddle
            | IndicatorField::BollingerLower => bollinger::DEFAULT_PERIOD,
        }
    }

    pub fn compute(&self, cols: &Columns) -> Reading<f64> {
        let (h, l, c) = (&cols.highs[..], &cols.lows[..], &cols.closes[..]);
        match *self {
            IndicatorField::Rsi(n) => indicator::rsi(c, n),
            IndicatorField::Ema(n) => indicator::ema(c, n),
            IndicatorField::Macd => macd::macd_default(c).map(|m| m.line),
            IndicatorField::MacdSignal => macd::macd_default(c).map(|m| m.signal),
            IndicatorField::MacdHistogram => macd::macd_default(c).map(|m| m.histogram),
            IndicatorField::StochK => default_stochastic(h, l, c).map(|s| s.k),
            IndicatorField::StochD => default_stochastic(h, l, c).map(|s| s.d),
            IndicatorField::Cci(n) => indicator::cci(h, l, c, n),
            IndicatorField::Atr(n) => indicator::atr(h, l, c, n),
            IndicatorField::Adx(n) => indicator::adx(h, l, c, n).map(|a| a.adx),
            IndicatorField::PlusDi(n) => indicator::adx(h, l, c, n).map(|a| a.plus_di),
            IndicatorField::MinusDi(n) => indicator::adx(h, l, c, n).map(|a| a.minus_di),
            IndicatorField::BollingerUpper => default_bands(c).map(|b| b.upper),
            IndicatorField::BollingerMiddle => default_bands(c).map(|b| b.middle),
            IndicatorField::BollingerLower => default_bands(c).map(|b| b.lower),
            IndicatorField::WilliamsR(n) => indicator::williams_r(h, l, c, n),
            IndicatorField::Roc(n) => indicator::roc(c, n),
        }
    }
}

fn default_stochastic(h: &[f64], l: &[f64], c: &[f64]) -> Reading<indicator::Stochastic> {
    indicator::stochastic(h, l, c, stochastic::DEFAULT_PERIOD, stochastic::DEFAULT_D_PERIOD)
}

fn default_bands(c: &[f64]) -> Reading<indicator::Bands> {
    indicator::bollinger(c, bollinger::DEFAULT_PERIOD, bollinger::DEFAULT_K)
}

impl fmt::Display for IndicatorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorField::Rsi(n) => write!(f, "rsi({})", n),
            IndicatorField::Ema(n) => write!(f, "ema({})", n),
            IndicatorField::Macd => write!(f, "macd"),
            IndicatorField::MacdSignal => write!(f, "macd_signal"),
            IndicatorField::MacdHistogram => write!(f, "macd_hist"),
            IndicatorField::StochK => write!(f, "stoch_k"),
            IndicatorField::StochD => write!(f, "stoch_d"),
            IndicatorField::Cci(n) => write!(f, "cci({})", n),
            IndicatorField::Atr(n) => write!(f, "atr({})", n),
            IndicatorField::Adx(n) => write!(f, "adx({})", n),
            IndicatorField::PlusDi(n) => write!(f, "plus_di({})", n),
            IndicatorField::MinusDi(n) => write!(f, "minus_di({})", n),
            IndicatorField::BollingerUpper => write!(f, "bb_upper"),
            IndicatorField::BollingerMiddle => write!(f, "bb_middle"),
            IndicatorField::BollingerLower => write!(f, "bb_lower"),
            IndicatorField::WilliamsR(n) => write!(f, "williams_r({})", n),
            IndicatorField::Roc(n) => write!(f, "roc({})", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown indicator: {0}")]
pub struct UnknownIndicator(pub String);

/// Accepts the canonical form (`rsi(14)`, `macd_hist`) as well as the compact
/// names users type (`rsi`, `ema20`, `macdHist`, `bbUpper`).
impl FromStr for IndicatorField {
    type Err = UnknownIndicator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownIndicator(s.to_string());
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| *c != '_' && *c != ' ')
            .collect();
        let (name, period) = split_period(&normalized).ok_or_else(unknown)?;

        let with = |default: usize| period.unwrap_or(default);
        let bare = |field: IndicatorField| match period {
            None => Ok(field),
            Some(_) => Err(unknown()),
        };

        match name {
            "rsi" => Ok(IndicatorField::Rsi(with(rsi::DEFAULT_PERIOD))),
            "ema" => Ok(IndicatorField::Ema(with(20))),
            "cci" => Ok(IndicatorField::Cci(with(cci::DEFAULT_PERIOD))),
            "atr" => Ok(IndicatorField::Atr(with(atr::DEFAULT_PERIOD))),
            "adx" => Ok(IndicatorField::Adx(with(adx::DEFAULT_PERIOD))),
            "plusdi" => Ok(IndicatorField::PlusDi(with(adx::DEFAULT_PERIOD))),
            "minusdi" => Ok(IndicatorField::MinusDi(with(adx::DEFAULT_PERIOD))),
            "williamsr" | "willr" => Ok(IndicatorField::WilliamsR(with(williams_r::DEFAULT_PERIOD))),
            "roc" => Ok(IndicatorField::Roc(with(DEFAULT_ROC_PERIOD))),
            "macd" => bare(IndicatorField::Macd),
            "macdsignal" => bare(IndicatorField::MacdSignal),
            "macdhist" | "macdhistogram" => bare(IndicatorField::MacdHistogram),
            "stochk" => bare(IndicatorField::StochK),
            "stochd" => bare(IndicatorField::StochD),
            "bbupper" => bare(IndicatorField::BollingerUpper),
            "bbmiddle" => bare(IndicatorField::BollingerMiddle),
            "bblower" => bare(IndicatorField::BollingerLower),
            _ => Err(unknown()),
        }
    }
}

/// `rsi(7)` → ("rsi", Some(7)), `ema20` → ("ema", Some(20)), `macd` → ("macd", None).
/// A period must be positive and no longer than the largest candle request.
fn split_period(s: &str) -> Option<(&str, Option<usize>)> {
    if let Some(open) = s.find('(') {
        let inner = s[open + 1..].strip_suffix(')')?;
        return Some((&s[..open], Some(period(inner)?)));
    }
    let digits = s.len() - s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return Some((s, None));
    }
    let (name, num) = s.split_at(s.len() - digits);
    Some((name, Some(period(num)?)))
}

fn period(raw: &str) -> Option<usize> {
    raw.parse::<usize>()
        .ok()
        .filter(|p| (1..=MAX_CANDLE_LIMIT).contains(p))
}
