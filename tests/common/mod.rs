#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tripwire::adapters::memory_repository::MemoryRepository;
use tripwire::domain::alert::{
    Alert, AlertId, Holding, OwnerId, PercentAlert, PortfolioLimit, PriceAlert, PriceCondition, Timeframe,
};
pub use tripwire::domain::candle::Candle;
use tripwire::domain::cycle::Orchestrator;
use tripwire::domain::engine_config::EngineConfig;
use tripwire::domain::error::EngineError;
use tripwire::domain::snapshot::VolumeWindow;
use tripwire::ports::clock_port::Clock;
use tripwire::ports::market_data_port::{Feed, MarketDataPort};
use tripwire::ports::notification_port::{MessageHandle, NotificationPort};

pub const PROVIDER: &str = "scripted";

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )))
    }

    pub fn advance(&self, secs: i64) {
        *self.0.lock().unwrap() += chrono::Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Holds every quote call until released, so a cycle can be kept in flight.
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

/// Market port answering from fixed tables, counting every upstream call.
pub struct ScriptedMarket {
    quotes: Mutex<HashMap<String, Result<f64, EngineError>>>,
    candles: HashMap<String, Vec<Candle>>,
    volumes: HashMap<String, VolumeWindow>,
    pub quote_calls: AtomicUsize,
    pub candle_calls: AtomicUsize,
    pub volume_calls: AtomicUsize,
    gate: Option<Arc<Gate>>,
    clock_step: Option<(Arc<ManualClock>, i64)>,
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self {
            quotes: Mutex::new(HashMap::new()),
            candles: HashMap::new(),
            volumes: HashMap::new(),
            quote_calls: AtomicUsize::new(0),
            candle_calls: AtomicUsize::new(0),
            volume_calls: AtomicUsize::new(0),
            gate: None,
            clock_step: None,
        }
    }

    pub fn with_quote(self, symbol: &str, price: f64) -> Self {
        self.set_quote(symbol, price);
        self
    }

    pub fn with_quote_error(self, symbol: &str, err: EngineError) -> Self {
        self.quotes.lock().unwrap().insert(symbol.to_string(), Err(err));
        self
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.candles.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_volume(mut self, symbol: &str, current: f64, average: f64) -> Self {
        self.volumes
            .insert(symbol.to_string(), VolumeWindow { current, average });
        self
    }

    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Every quote call moves `clock` forward, simulating a slow upstream.
    pub fn advancing(mut self, clock: Arc<ManualClock>, secs: i64) -> Self {
        self.clock_step = Some((clock, secs));
        self
    }

    pub fn set_quote(&self, symbol: &str, price: f64) {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Ok(price));
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn candle_calls(&self) -> usize {
        self.candle_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataPort for ScriptedMarket {
    fn provider(&self, _feed: Feed) -> &str {
        PROVIDER
    }

    async fn quote(&self, symbol: &str) -> Result<f64, EngineError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if let Some((clock, secs)) = &self.clock_step {
            clock.advance(*secs);
        }
        self.quotes
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| Err(EngineError::unavailable(symbol, "no such symbol")))
    }

    async fn volume_window(&self, symbol: &str, _timeframe: Timeframe) -> Result<VolumeWindow, EngineError> {
        self.volume_calls.fetch_add(1, Ordering::SeqCst);
        self.volumes
            .get(symbol)
            .copied()
            .ok_or_else(|| EngineError::unavailable(symbol, "no volume"))
    }

    async fn candles(&self, symbol: &str, _timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, EngineError> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        let candles = self
            .candles
            .get(symbol)
            .ok_or_else(|| EngineError::unavailable(symbol, "no candles"))?;
        let skip = candles.len().saturating_sub(limit);
        Ok(candles[skip..].to_vec())
    }
}

/// Notifier that records every delivery and can refuse chosen owners.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(OwnerId, String)>>,
    refuse: HashSet<OwnerId>,
    refuse_all: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            refuse_all: true,
            ..Self::default()
        }
    }

    pub fn refusing(owner: OwnerId) -> Self {
        Self {
            refuse: HashSet::from([owner]),
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<(OwnerId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn send(&self, owner: OwnerId, text: &str) -> Result<MessageHandle, EngineError> {
        if self.refuse_all || self.refuse.contains(&owner) {
            return Err(EngineError::Delivery {
                owner,
                reason: "chat not found".to_string(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((owner, text.to_string()));
        Ok(MessageHandle {
            owner,
            message_id: sent.len() as i64,
        })
    }

    async fn retract(&self, _handle: &MessageHandle) -> Result<(), EngineError> {
        Ok(())
    }
}

pub struct Harness {
    pub repo: Arc<MemoryRepository>,
    pub market: Arc<ScriptedMarket>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new(repo: MemoryRepository, market: ScriptedMarket, notifier: RecordingNotifier) -> Self {
        Self::with_clock(repo, market, notifier, ManualClock::new(), EngineConfig::default())
    }

    pub fn with_clock(
        repo: MemoryRepository,
        market: ScriptedMarket,
        notifier: RecordingNotifier,
        clock: Arc<ManualClock>,
        config: EngineConfig,
    ) -> Self {
        let repo = Arc::new(repo);
        let market = Arc::new(market);
        let notifier = Arc::new(notifier);
        let orchestrator = Arc::new(Orchestrator::new(
            repo.clone(),
            market.clone(),
            notifier.clone(),
            clock.clone(),
            config,
        ));
        Self {
            repo,
            market,
            notifier,
            clock,
            orchestrator,
        }
    }
}

pub fn price_alert(id: AlertId, owner: OwnerId, symbol: &str, condition: PriceCondition, target: f64) -> Alert {
    Alert::Price(PriceAlert {
        id,
        owner,
        symbol: symbol.to_string(),
        condition,
        target,
        repeat: false,
    })
}

pub fn percent_alert(id: AlertId, symbol: &str, base_price: f64, threshold_pct: f64, repeat: bool) -> Alert {
    Alert::Percent(PercentAlert {
        id,
        owner: 1,
        symbol: symbol.to_string(),
        base_price,
        threshold_pct,
        repeat,
    })
}

pub fn portfolio_limit(owner: OwnerId, loss: Option<f64>, profit: Option<f64>, holdings: &[(&str, f64)]) -> Alert {
    Alert::PortfolioLimit(PortfolioLimit {
        owner,
        loss_limit: loss,
        profit_target: profit,
        repeat_loss: false,
        repeat_profit: false,
        holdings: holdings
            .iter()
            .map(|(symbol, quantity)| Holding {
                symbol: symbol.to_string(),
                quantity: *quantity,
            })
            .collect(),
    })
}

/// Hourly candles with the given closes; high/low one unit either side.
pub fn candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open_time: DateTime::from_timestamp(1_700_000_000 + i as i64 * 3600, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
        })
        .collect()
}

pub fn rising(n: usize) -> Vec<Candle> {
    let closes: Vec<f64> = (1..=n).map(|i| i as f64).collect();
    candles(&closes)
}
