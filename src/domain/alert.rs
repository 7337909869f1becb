//! Alert records: a closed union with one variant per rule shape.
//!
//! Records are created by the account-management side and only ever mutated
//! here through the repository (delete, baseline reset, bound clear).

use crate::domain::engine_config::MAX_CANDLE_LIMIT;
use crate::domain::indicator_helpers::IndicatorField;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub type AlertId = i64;
pub type OwnerId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Price,
    Percent,
    Volume,
    Risk,
    Indicator,
    PortfolioLimit,
    Watchlist,
}

impl AlertKind {
    /// Evaluation order within a cycle.
    pub const ALL: [AlertKind; 7] = [
        AlertKind::Price,
        AlertKind::Percent,
        AlertKind::Volume,
        AlertKind::Risk,
        AlertKind::Indicator,
        AlertKind::PortfolioLimit,
        AlertKind::Watchlist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Price => "price",
            AlertKind::Percent => "percent",
            AlertKind::Volume => "volume",
            AlertKind::Risk => "risk",
            AlertKind::Indicator => "indicator",
            AlertKind::PortfolioLimit => "portfolio_limit",
            AlertKind::Watchlist => "watchlist",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candle interval used by volume, indicator and watchlist rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    #[default]
    H1,
    H2,
    H4,
    H8,
    H12,
    D1,
    W1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    /// Interval string the kline endpoint expects.
    pub fn kline_interval(&self) -> &'static str {
        self.as_str()
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H2 => 7_200,
            Timeframe::H4 => 14_400,
            Timeframe::H8 => 28_800,
            Timeframe::H12 => 43_200,
            Timeframe::D1 => 86_400,
            Timeframe::W1 => 604_800,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "2h" => Ok(Timeframe::H2),
            "4h" => Ok(Timeframe::H4),
            "8h" => Ok(Timeframe::H8),
            "12h" => Ok(Timeframe::H12),
            "1d" => Ok(Timeframe::D1),
            "1w" => Ok(Timeframe::W1),
            other => Err(format!("unknown timeframe '{}'", other)),
        }
    }
}

/// Direction of a price threshold. Both directions are strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceCondition {
    Above,
    Below,
}

impl PriceCondition {
    pub fn holds(&self, price: f64, target: f64) -> bool {
        match self {
            PriceCondition::Above => price > target,
            PriceCondition::Below => price < target,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            PriceCondition::Above => ">",
            PriceCondition::Below => "<",
        }
    }
}

impl fmt::Display for PriceCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for PriceCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(PriceCondition::Above),
            "<" => Ok(PriceCondition::Below),
            other => Err(format!("unknown price condition '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

impl Comparison {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Greater => lhs > rhs,
            Comparison::Less => lhs < rhs,
            Comparison::GreaterOrEqual => lhs >= rhs,
            Comparison::LessOrEqual => lhs <= rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Comparison::Greater => ">",
            Comparison::Less => "<",
            Comparison::GreaterOrEqual => ">=",
            Comparison::LessOrEqual => "<=",
        })
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Comparison::Greater),
            "<" => Ok(Comparison::Less),
            ">=" => Ok(Comparison::GreaterOrEqual),
            "<=" => Ok(Comparison::LessOrEqual),
            other => Err(format!("unknown comparison '{}'", other)),
        }
    }
}

/// One side of a portfolio limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    Loss,
    Profit,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bound::Loss => "loss",
            Bound::Profit => "profit",
        })
    }
}

/// The indicator half of an indicator alert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorCondition {
    /// `field op value`, e.g. `rsi(14) < 30`.
    Compare {
        field: IndicatorField,
        comparison: Comparison,
        value: f64,
    },
    /// Current price strictly above EMA(period).
    PriceAboveEma { period: usize },
}

impl IndicatorCondition {
    /// The indicator value this condition reads from the snapshot.
    pub fn field(&self) -> IndicatorField {
        match *self {
            IndicatorCondition::Compare { field, .. } => field,
            IndicatorCondition::PriceAboveEma { period } => IndicatorField::Ema(period),
        }
    }

    pub fn holds(&self, price: f64, reading: f64) -> bool {
        match *self {
            IndicatorCondition::Compare { comparison, value, .. } => comparison.holds(reading, value),
            IndicatorCondition::PriceAboveEma { .. } => price > reading,
        }
    }

    /// Builds a condition from its stored columns.
    ///
    /// Besides `field` + `op` + `value`, two bare legacy forms are accepted:
    /// `macd` (histogram above zero) and `ema>N` / `price_above_ema(N)`.
    pub fn parse(indicator: &str, op: Option<&str>, value: Option<f64>) -> Result<Self, String> {
        let text = indicator.trim();
        let lower = text.to_lowercase();

        if let Some(period) = lower
            .strip_prefix("ema>")
            .or_else(|| lower.strip_prefix("price_above_ema(").and_then(|r| r.strip_suffix(')')))
        {
            let period = period
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|p| (1..=MAX_CANDLE_LIMIT).contains(p))
                .ok_or_else(|| format!("bad EMA period in '{}'", text))?;
            return Ok(IndicatorCondition::PriceAboveEma { period });
        }

        match (op, value) {
            (Some(op), Some(value)) => {
                let field = text.parse::<IndicatorField>().map_err(|e| e.to_string())?;
                if !value.is_finite() {
                    return Err(format!("non-finite threshold for '{}'", text));
                }
                Ok(IndicatorCondition::Compare {
                    field,
                    comparison: op.parse()?,
                    value,
                })
            }
            (None, None) if lower == "macd" => Ok(IndicatorCondition::Compare {
                field: IndicatorField::MacdHistogram,
                comparison: Comparison::Greater,
                value: 0.0,
            }),
            _ => Err(format!("incomplete indicator condition '{}'", text)),
        }
    }
}

impl fmt::Display for IndicatorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorCondition::Compare { field, comparison, value } => {
                write!(f, "{} {} {}", field, comparison, value)
            }
            IndicatorCondition::PriceAboveEma { period } => write!(f, "price > ema({})", period),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceAlert {
    pub id: AlertId,
    pub owner: OwnerId,
    pub symbol: String,
    pub condition: PriceCondition,
    pub target: f64,
    pub repeat: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PercentAlert {
    pub id: AlertId,
    pub owner: OwnerId,
    pub symbol: String,
    pub base_price: f64,
    pub threshold_pct: f64,
    pub repeat: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeAlert {
    pub id: AlertId,
    pub owner: OwnerId,
    pub symbol: String,
    pub multiplier: f64,
    pub timeframe: Timeframe,
    pub repeat: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskAlert {
    pub id: AlertId,
    pub owner: OwnerId,
    pub symbol: String,
    pub stop_price: f64,
    pub take_price: f64,
    pub repeat: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorAlert {
    pub id: AlertId,
    pub owner: OwnerId,
    pub symbol: String,
    pub price_condition: PriceCondition,
    pub price_value: f64,
    pub indicator: IndicatorCondition,
    pub timeframe: Timeframe,
    pub repeat: bool,
}

/// Per-owner singleton. Each bound has its own repeat flag and is cleared
/// on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioLimit {
    pub owner: OwnerId,
    pub loss_limit: Option<f64>,
    pub profit_target: Option<f64>,
    pub repeat_loss: bool,
    pub repeat_profit: bool,
    pub holdings: Vec<Holding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchlistEntry {
    pub id: AlertId,
    pub owner: OwnerId,
    pub symbol: String,
    pub base_price: f64,
    pub threshold_pct: f64,
    pub timeframe: Timeframe,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Price(PriceAlert),
    Percent(PercentAlert),
    Volume(VolumeAlert),
    Risk(RiskAlert),
    Indicator(IndicatorAlert),
    PortfolioLimit(PortfolioLimit),
    Watchlist(WatchlistEntry),
}

impl Alert {
    pub fn kind(&self) -> AlertKind {
        match self {
            Alert::Price(_) => AlertKind::Price,
            Alert::Percent(_) => AlertKind::Percent,
            Alert::Volume(_) => AlertKind::Volume,
            Alert::Risk(_) => AlertKind::Risk,
            Alert::Indicator(_) => AlertKind::Indicator,
            Alert::PortfolioLimit(_) => AlertKind::PortfolioLimit,
            Alert::Watchlist(_) => AlertKind::Watchlist,
        }
    }

    /// Record identifier. Portfolio limits are keyed by owner.
    pub fn id(&self) -> AlertId {
        match self {
            Alert::Price(a) => a.id,
            Alert::Percent(a) => a.id,
            Alert::Volume(a) => a.id,
            Alert::Risk(a) => a.id,
            Alert::Indicator(a) => a.id,
            Alert::PortfolioLimit(p) => p.owner,
            Alert::Watchlist(w) => w.id,
        }
    }

    pub fn owner(&self) -> OwnerId {
        match self {
            Alert::Price(a) => a.owner,
            Alert::Percent(a) => a.owner,
            Alert::Volume(a) => a.owner,
            Alert::Risk(a) => a.owner,
            Alert::Indicator(a) => a.owner,
            Alert::PortfolioLimit(p) => p.owner,
            Alert::Watchlist(w) => w.owner,
        }
    }

    /// Every symbol whose quote this alert depends on.
    pub fn symbols(&self) -> Vec<&str> {
        match self {
            Alert::Price(a) => vec![a.symbol.as_str()],
            Alert::Percent(a) => vec![a.symbol.as_str()],
            Alert::Volume(a) => vec![a.symbol.as_str()],
            Alert::Risk(a) => vec![a.symbol.as_str()],
            Alert::Indicator(a) => vec![a.symbol.as_str()],
            Alert::PortfolioLimit(p) => p.holdings.iter().map(|h| h.symbol.as_str()).collect(),
            Alert::Watchlist(w) => vec![w.symbol.as_str()],
        }
    }
}
