//! REST market data: Binance for quotes and klines, CoinGecko as the quote
//! fallback for symbols with a configured coin id.
//!
//! Symbols are stored as bare coins (`BTC`) or full pairs (`BTCUSDT`); both
//! resolve to the same Binance pair. HTTP 429 and Binance's 418 ban map to
//! `UpstreamRateLimited` so the orchestrator stops calling that feed for the
//! rest of the cycle. A rate-limited Binance quote that CoinGecko answers
//! still sidelines Binance quotes for `PRIMARY_BACKOFF`.

use crate::domain::alert::Timeframe;
use crate::domain::candle::Candle;
use crate::domain::engine_config::{MarketConfig, MAX_CANDLE_LIMIT};
use crate::domain::error::EngineError;
use crate::domain::snapshot::{VolumeWindow, VOLUME_WINDOW};
use crate::ports::market_data_port::{Feed, MarketDataPort};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long Binance quotes are skipped after it rate-limits us.
pub const PRIMARY_BACKOFF: Duration = Duration::from_secs(60);

pub struct HttpMarketGateway {
    http: Client,
    config: MarketConfig,
    quote_provider: String,
    fallback_provider: String,
    candle_provider: String,
    primary_limited_until: Mutex<Option<Instant>>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

impl HttpMarketGateway {
    pub fn new(config: MarketConfig) -> Result<Self, EngineError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("tripwire/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| invalid_market("timeout_secs", e))?;
        Ok(Self {
            http,
            quote_provider: host(&config.quote_url, "quote_url")?,
            fallback_provider: host(&config.fallback_quote_url, "fallback_quote_url")?,
            candle_provider: host(&config.klines_url, "klines_url")?,
            config,
            primary_limited_until: Mutex::new(None),
        })
    }

    fn primary_cooling(&self) -> bool {
        let mut until = self.primary_limited_until.lock().unwrap_or_else(|e| e.into_inner());
        match *until {
            Some(deadline) if Instant::now() < deadline => true,
            Some(_) => {
                *until = None;
                false
            }
            None => false,
        }
    }

    fn note_primary_limited(&self) {
        let mut until = self.primary_limited_until.lock().unwrap_or_else(|e| e.into_inner());
        if until.is_none() {
            warn!(provider = %self.quote_provider, backoff_secs = PRIMARY_BACKOFF.as_secs(), "primary quote feed rate limited");
        }
        *until = Some(Instant::now() + PRIMARY_BACKOFF);
    }

    /// `btc` → `BTCUSDT`; a symbol already ending in the quote asset is kept.
    pub fn pair(&self, symbol: &str) -> String {
        let symbol = symbol.trim().to_uppercase();
        let quote = &self.config.kline_quote;
        if symbol.len() > quote.len() && symbol.ends_with(quote.as_str()) {
            symbol
        } else {
            format!("{}{}", symbol, quote)
        }
    }

    fn coingecko_id(&self, symbol: &str) -> Option<&str> {
        let symbol = symbol.trim().to_uppercase();
        let coin = symbol
            .strip_suffix(self.config.kline_quote.as_str())
            .filter(|c| !c.is_empty())
            .unwrap_or(&symbol);
        self.config.coingecko_ids.get(coin).map(String::as_str)
    }

    async fn get(&self, provider: &str, symbol: &str, url: &str, query: &[(&str, &str)]) -> Result<Value, EngineError> {
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| EngineError::unavailable(symbol, format!("{}: {}", provider, e)))?;
        check_status(provider, symbol, res.status())?;
        res.json::<Value>()
            .await
            .map_err(|e| EngineError::unavailable(symbol, format!("{}: bad body: {}", provider, e)))
    }

    async fn binance_quote(&self, symbol: &str) -> Result<f64, EngineError> {
        let pair = self.pair(symbol);
        let body = self
            .get(&self.quote_provider, symbol, &self.config.quote_url, &[("symbol", pair.as_str())])
            .await?;
        let ticker: TickerPrice = serde_json::from_value(body)
            .map_err(|e| EngineError::unavailable(symbol, format!("{}: {}", self.quote_provider, e)))?;
        positive_price(symbol, ticker.price.parse().ok())
    }

    async fn coingecko_quote(&self, symbol: &str, id: &str) -> Result<f64, EngineError> {
        let body = self
            .get(
                &self.fallback_provider,
                symbol,
                &self.config.fallback_quote_url,
                &[("ids", id), ("vs_currencies", self.config.vs_currency.as_str())],
            )
            .await?;
        positive_price(symbol, simple_price(&body, id, &self.config.vs_currency))
    }

    async fn klines(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, EngineError> {
        let pair = self.pair(symbol);
        let limit = limit.clamp(1, MAX_CANDLE_LIMIT).to_string();
        let body = self
            .get(
                &self.candle_provider,
                symbol,
                &self.config.klines_url,
                &[
                    ("symbol", pair.as_str()),
                    ("interval", timeframe.kline_interval()),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;
        parse_klines(&body).ok_or_else(|| EngineError::unavailable(symbol, "malformed kline payload"))
    }
}

#[async_trait]
impl MarketDataPort for HttpMarketGateway {
    fn provider(&self, feed: Feed) -> &str {
        match feed {
            Feed::Quotes => &self.quote_provider,
            Feed::Candles => &self.candle_provider,
        }
    }

    async fn quote(&self, symbol: &str) -> Result<f64, EngineError> {
        let primary = if self.primary_cooling() {
            EngineError::UpstreamRateLimited {
                provider: self.quote_provider.clone(),
            }
        } else {
            match self.binance_quote(symbol).await {
                Ok(price) => return Ok(price),
                Err(e) => {
                    if matches!(e, EngineError::UpstreamRateLimited { .. }) {
                        self.note_primary_limited();
                    }
                    e
                }
            }
        };
        let Some(id) = self.coingecko_id(symbol) else {
            return Err(primary);
        };
        debug!(symbol = %symbol, error = %primary, "primary quote failed, trying fallback");
        match self.coingecko_quote(symbol, id).await {
            Ok(price) => Ok(price),
            Err(fallback) if matches!(primary, EngineError::UpstreamRateLimited { .. }) => {
                debug!(symbol = %symbol, error = %fallback, "fallback quote failed");
                Err(primary)
            }
            Err(fallback) => Err(fallback),
        }
    }

    async fn volume_window(&self, symbol: &str, timeframe: Timeframe) -> Result<VolumeWindow, EngineError> {
        let candles = self.klines(symbol, timeframe, VOLUME_WINDOW).await?;
        VolumeWindow::from_candles(&candles)
            .ok_or_else(|| EngineError::unavailable(symbol, format!("only {} candles for volume window", candles.len())))
    }

    async fn candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, EngineError> {
        self.klines(symbol, timeframe, limit).await
    }
}

fn invalid_market(key: &str, reason: impl ToString) -> EngineError {
    EngineError::ConfigInvalid {
        section: "market".to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn host(url: &str, key: &str) -> Result<String, EngineError> {
    let parsed = Url::parse(url).map_err(|e| invalid_market(key, e))?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| invalid_market(key, "URL has no host"))
}

fn check_status(provider: &str, symbol: &str, status: StatusCode) -> Result<(), EngineError> {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
        return Err(EngineError::UpstreamRateLimited {
            provider: provider.to_string(),
        });
    }
    if !status.is_success() {
        return Err(EngineError::unavailable(symbol, format!("{} returned {}", provider, status)));
    }
    Ok(())
}

fn positive_price(symbol: &str, price: Option<f64>) -> Result<f64, EngineError> {
    price
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| EngineError::unavailable(symbol, "no usable price in response"))
}

/// `{"bitcoin": {"usd": 43000.5}}`
fn simple_price(body: &Value, id: &str, vs_currency: &str) -> Option<f64> {
    let prices: HashMap<String, HashMap<String, f64>> = serde_json::from_value(body.clone()).ok()?;
    prices.get(id)?.get(vs_currency).copied()
}

/// Binance klines are arrays: `[open_time_ms, "open", "high", "low", "close", "volume", ...]`.
fn parse_klines(body: &Value) -> Option<Vec<Candle>> {
    body.as_array()?.iter().map(parse_kline).collect()
}

fn parse_kline(row: &Value) -> Option<Candle> {
    let row = row.as_array()?;
    let number = |i: usize| -> Option<f64> {
        match row.get(i)? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    };
    Some(Candle {
        open_time: DateTime::from_timestamp_millis(row.first()?.as_i64()?)?,
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(4)?,
        volume: number(5)?,
    })
}
