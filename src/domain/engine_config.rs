//! Typed settings, parsed and validated once at startup.
//!
//! Every section is read through [`ConfigPort`]; the first bad key is
//! reported as `ConfigInvalid` or `ConfigMissing` and nothing starts.

use crate::domain::error::EngineError;
use crate::domain::indicator_helpers::IndicatorField;
use crate::ports::config_port::ConfigPort;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Binance caps a kline request at this many candles.
pub const MAX_CANDLE_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub interval: Duration,
    pub deadline: Duration,
    pub fan_out: usize,
    pub candle_limit: usize,
    pub quote_ttl: Duration,
    pub indicator_ttl: Duration,
    pub negative_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            deadline: Duration::from_secs(25),
            fan_out: 8,
            candle_limit: 100,
            quote_ttl: Duration::from_secs(20),
            indicator_ttl: Duration::from_secs(60),
            negative_ttl: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    pub quote_url: String,
    pub fallback_quote_url: String,
    pub klines_url: String,
    pub vs_currency: String,
    pub kline_quote: String,
    /// Coin symbol to CoinGecko id, used only by the fallback quote source.
    pub coingecko_ids: HashMap<String, String>,
    pub timeout: Duration,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            quote_url: "https://api.binance.com/api/v3/ticker/price".to_string(),
            fallback_quote_url: "https://api.coingecko.com/api/v3/simple/price".to_string(),
            klines_url: "https://api.binance.com/api/v3/klines".to_string(),
            vs_currency: "usd".to_string(),
            kline_quote: "USDT".to_string(),
            coingecko_ids: HashMap::new(),
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyBackend {
    Log,
    Telegram { token: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    pub backend: NotifyBackend,
    pub autodelete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    pub path: PathBuf,
    pub pool_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub engine: EngineConfig,
    pub market: MarketConfig,
    pub notify: NotifyConfig,
    pub sqlite: SqliteConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        Ok(Self {
            engine: EngineConfig::from_config(config)?,
            market: MarketConfig::from_config(config)?,
            notify: NotifyConfig::from_config(config)?,
            sqlite: SqliteConfig::from_config(config)?,
            logging: LoggingConfig::from_config(config)?,
        })
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> EngineError {
    EngineError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> EngineError {
    EngineError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn positive(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<u64, EngineError> {
    let value = config.get_int(section, key, default)?;
    if value <= 0 {
        return Err(invalid(section, key, format!("{} must be positive", key)));
    }
    Ok(value as u64)
}

fn non_negative(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<u64, EngineError> {
    let value = config.get_int(section, key, default)?;
    if value < 0 {
        return Err(invalid(section, key, format!("{} must be non-negative", key)));
    }
    Ok(value as u64)
}

/// Longest look-back among the default-parameter indicators.
pub fn default_lookback() -> usize {
    [
        IndicatorField::Macd,
        IndicatorField::StochD,
        IndicatorField::Adx(14),
        IndicatorField::BollingerMiddle,
        IndicatorField::Rsi(14),
        IndicatorField::Cci(20),
        IndicatorField::Atr(14),
    ]
    .iter()
    .map(IndicatorField::lookback)
    .max()
    .unwrap_or(0)
}

impl EngineConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        let d = Self::default();
        let interval = positive(config, "engine", "interval_secs", d.interval.as_secs() as i64)?;
        let deadline = positive(config, "engine", "deadline_secs", d.deadline.as_secs() as i64)?;
        if deadline > interval {
            return Err(invalid(
                "engine",
                "deadline_secs",
                "deadline_secs must not exceed interval_secs",
            ));
        }
        let fan_out = positive(config, "engine", "fan_out", d.fan_out as i64)? as usize;

        let candle_limit = positive(config, "engine", "candle_limit", d.candle_limit as i64)? as usize;
        let min = default_lookback();
        if candle_limit < min || candle_limit > MAX_CANDLE_LIMIT {
            return Err(invalid(
                "engine",
                "candle_limit",
                format!("candle_limit must be between {} and {}", min, MAX_CANDLE_LIMIT),
            ));
        }

        Ok(Self {
            interval: Duration::from_secs(interval),
            deadline: Duration::from_secs(deadline),
            fan_out,
            candle_limit,
            quote_ttl: Duration::from_secs(positive(config, "cache", "quote_ttl_secs", d.quote_ttl.as_secs() as i64)?),
            indicator_ttl: Duration::from_secs(positive(
                config,
                "cache",
                "indicator_ttl_secs",
                d.indicator_ttl.as_secs() as i64,
            )?),
            negative_ttl: Duration::from_secs(non_negative(config, "cache", "negative_ttl_secs", 0)?),
        })
    }
}

impl MarketConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        let d = Self::default();
        let url = |key: &str, default: String| -> Result<String, EngineError> {
            let value = config.get_string("market", key).unwrap_or(default);
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(invalid("market", key, "must be an http(s) URL"));
            }
            Ok(value)
        };
        let coingecko_ids = match config.get_string("market", "coingecko_ids") {
            Some(raw) => parse_id_map(&raw).ok_or_else(|| {
                invalid("market", "coingecko_ids", "expected SYMBOL:id pairs separated by commas")
            })?,
            None => HashMap::new(),
        };
        Ok(Self {
            quote_url: url("quote_url", d.quote_url)?,
            fallback_quote_url: url("fallback_quote_url", d.fallback_quote_url)?,
            klines_url: url("klines_url", d.klines_url)?,
            vs_currency: config
                .get_string("market", "vs_currency")
                .unwrap_or(d.vs_currency)
                .to_lowercase(),
            kline_quote: config
                .get_string("market", "kline_quote")
                .unwrap_or(d.kline_quote)
                .to_uppercase(),
            coingecko_ids,
            timeout: Duration::from_secs(positive(config, "market", "timeout_secs", d.timeout.as_secs() as i64)?),
        })
    }
}

/// `BTC:bitcoin, ETH:ethereum` → {"BTC": "bitcoin", "ETH": "ethereum"}
fn parse_id_map(raw: &str) -> Option<HashMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (symbol, id) = pair.split_once(':')?;
            let (symbol, id) = (symbol.trim(), id.trim());
            if symbol.is_empty() || id.is_empty() {
                return None;
            }
            Some((symbol.to_uppercase(), id.to_string()))
        })
        .collect()
}

impl NotifyConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        let backend = match config
            .get_string("notify", "backend")
            .unwrap_or_else(|| "log".to_string())
            .to_lowercase()
            .as_str()
        {
            "log" => NotifyBackend::Log,
            "telegram" => NotifyBackend::Telegram {
                token: config
                    .get_string("telegram", "token")
                    .ok_or_else(|| missing("telegram", "token"))?,
            },
            other => {
                return Err(invalid(
                    "notify",
                    "backend",
                    format!("unknown backend '{}', expected log or telegram", other),
                ))
            }
        };
        Ok(Self {
            backend,
            autodelete: config.get_bool("notify", "autodelete", true)?,
        })
    }
}

impl SqliteConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        let path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| missing("sqlite", "path"))?;
        let pool_size = positive(config, "sqlite", "pool_size", 4)?;
        Ok(Self {
            path: PathBuf::from(path),
            pool_size: u32::try_from(pool_size).map_err(|_| invalid("sqlite", "pool_size", "too large"))?,
        })
    }
}

impl LoggingConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        let level = config
            .get_string("logging", "level")
            .unwrap_or_else(|| "info".to_string())
            .to_lowercase();
        if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
            return Err(invalid("logging", "level", format!("unknown level '{}'", level)));
        }
        Ok(Self {
            level,
            json: config.get_bool("logging", "json", false)?,
        })
    }
}
