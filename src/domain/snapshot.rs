//! Per-cycle market view handed to the evaluators.
//!
//! A snapshot is filled completely during the fetch phase and then read
//! without further I/O. Anything absent from it was unavailable this cycle.

use crate::domain::alert::Timeframe;
use crate::domain::candle::Candle;
use crate::domain::indicator::Reading;
use crate::domain::indicator_helpers::IndicatorField;
use std::collections::HashMap;

/// Candles averaged when building a volume window.
pub const VOLUME_WINDOW: usize = 50;

/// Latest candle volume against the mean of the candles before it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeWindow {
    pub current: f64,
    pub average: f64,
}

impl VolumeWindow {
    /// Needs at least two candles: one current, one or more for the average.
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        let (last, previous) = candles.split_last()?;
        if previous.is_empty() {
            return None;
        }
        let average = previous.iter().map(|c| c.volume).sum::<f64>() / previous.len() as f64;
        Some(VolumeWindow {
            current: last.volume,
            average,
        })
    }
}

/// Cache key for a derived indicator value: `symbol:indicator:timeframe`.
pub fn indicator_key(symbol: &str, field: &IndicatorField, timeframe: Timeframe) -> String {
    format!("{}:{}:{}", symbol, field, timeframe)
}

#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    quotes: HashMap<String, f64>,
    volumes: HashMap<(String, Timeframe), VolumeWindow>,
    indicators: HashMap<(String, IndicatorField, Timeframe), Reading<f64>>,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_quote(&mut self, symbol: impl Into<String>, price: f64) {
        self.quotes.insert(symbol.into(), price);
    }

    pub fn insert_volume(&mut self, symbol: impl Into<String>, timeframe: Timeframe, window: VolumeWindow) {
        self.volumes.insert((symbol.into(), timeframe), window);
    }

    pub fn insert_indicator(
        &mut self,
        symbol: impl Into<String>,
        field: IndicatorField,
        timeframe: Timeframe,
        reading: Reading<f64>,
    ) {
        self.indicators.insert((symbol.into(), field, timeframe), reading);
    }

    /// Only finite, positive prices count as a quote.
    pub fn quote(&self, symbol: &str) -> Option<f64> {
        self.quotes
            .get(symbol)
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    pub fn volume(&self, symbol: &str, timeframe: Timeframe) -> Option<VolumeWindow> {
        self.volumes.get(&(symbol.to_string(), timeframe)).copied()
    }

    pub fn indicator(&self, symbol: &str, field: IndicatorField, timeframe: Timeframe) -> Option<Reading<f64>> {
        self.indicators
            .get(&(symbol.to_string(), field, timeframe))
            .copied()
    }

    pub fn quote_count(&self) -> usize {
        self.quotes.len()
    }
}
