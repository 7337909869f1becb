//! Cycle orchestrator.
//!
//! One pass walks `Idle → CollectingSymbols → FetchingQuotes → Evaluating →
//! Dispatching → Idle`:
//!
//! 1. List every alert kind through one repository session and collect the
//!    distinct symbols.
//! 2. Fetch quotes, volume windows and indicator readings with bounded
//!    fan-out, all through the TTL caches. Every fetch finishes before
//!    evaluation starts; the snapshot is never partially filled.
//! 3. Run the evaluator for every alert.
//! 4. Deliver each trigger, then apply its mutation only if delivery
//!    succeeded. Mutations for a kind go through one session.
//!
//! Repository calls are synchronous and run on the blocking pool, never on
//! a runtime worker.
//!
//! Failures are contained at the smallest scope: a failed symbol skips the
//! alerts that need it, a failed listing skips that kind, a failed delivery
//! or mutation leaves the record as it was so it fires again next cycle.
//!
//! Cycles never overlap. A tick that finds the previous cycle still running
//! is skipped and reported as busy.

use crate::domain::alert::{Alert, AlertId, AlertKind, OwnerId, Timeframe};
use crate::domain::cache::TtlCache;
use crate::domain::candle::{Candle, Columns};
use crate::domain::engine_config::{EngineConfig, MAX_CANDLE_LIMIT};
use crate::domain::error::EngineError;
use crate::domain::evaluator::{self, Decision, Effect, Trigger};
use crate::domain::indicator::{NotReady, Reading};
use crate::domain::indicator_helpers::IndicatorField;
use crate::domain::snapshot::{indicator_key, MarketSnapshot, VolumeWindow};
use crate::ports::alert_repository::AlertRepository;
use crate::ports::clock_port::Clock;
use crate::ports::market_data_port::{Feed, MarketDataPort};
use crate::ports::notification_port::NotificationPort;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    CollectingSymbols,
    FetchingQuotes,
    Evaluating,
    Dispatching,
}

/// What one cycle did. Logged at the end of every cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub seq: u64,
    /// The tick found a cycle already running and did nothing.
    pub skipped_busy: bool,
    /// Furthest state reached.
    pub reached: CycleState,
    pub symbols: usize,
    pub quotes_ok: usize,
    pub quotes_failed: usize,
    pub rate_limited: Vec<String>,
    pub alerts_evaluated: usize,
    pub triggered: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    pub undelivered: usize,
    pub mutations_applied: usize,
    pub mutations_failed: usize,
    pub abandoned: Vec<AlertKind>,
    pub deadline_exceeded: bool,
    pub error: Option<String>,
}

impl CycleReport {
    fn busy(seq: u64) -> Self {
        Self {
            seq,
            skipped_busy: true,
            ..Self::default()
        }
    }

    fn log(&self) {
        if self.skipped_busy {
            return;
        }
        info!(
            seq = self.seq,
            reached = ?self.reached,
            symbols = self.symbols,
            quotes_ok = self.quotes_ok,
            quotes_failed = self.quotes_failed,
            evaluated = self.alerts_evaluated,
            triggered = self.triggered,
            skipped = self.skipped,
            sent = self.notifications_sent,
            send_failed = self.notifications_failed,
            mutations = self.mutations_applied,
            mutations_failed = self.mutations_failed,
            deadline_exceeded = self.deadline_exceeded,
            "cycle finished"
        );
    }
}

/// Per-cycle record of which upstream feeds have answered 429.
#[derive(Default)]
struct RateLimits {
    quotes: AtomicBool,
    candles: AtomicBool,
}

impl RateLimits {
    fn flag(&self, feed: Feed) -> &AtomicBool {
        match feed {
            Feed::Quotes => &self.quotes,
            Feed::Candles => &self.candles,
        }
    }

    fn is_limited(&self, feed: Feed) -> bool {
        self.flag(feed).load(Ordering::SeqCst)
    }

    /// True only for the call that trips the flag.
    fn trip(&self, feed: Feed) -> bool {
        !self.flag(feed).swap(true, Ordering::SeqCst)
    }
}

struct Collected {
    batches: Vec<(AlertKind, Vec<Alert>)>,
    symbols: BTreeSet<String>,
    unlisted: Vec<AlertKind>,
}

impl Collected {
    fn volume_keys(&self) -> BTreeSet<(String, Timeframe)> {
        self.alerts()
            .filter_map(|a| match a {
                Alert::Volume(v) => Some((v.symbol.clone(), v.timeframe)),
                _ => None,
            })
            .collect()
    }

    /// Indicator fields grouped by the candle series they are computed from.
    fn indicator_groups(&self) -> HashMap<(String, Timeframe), Vec<IndicatorField>> {
        let mut groups: HashMap<(String, Timeframe), Vec<IndicatorField>> = HashMap::new();
        for alert in self.alerts() {
            if let Alert::Indicator(a) = alert {
                let fields = groups.entry((a.symbol.clone(), a.timeframe)).or_default();
                let field = a.indicator.field();
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        groups
    }

    fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.batches.iter().flat_map(|(_, alerts)| alerts.iter())
    }
}

struct Firing {
    alert_id: AlertId,
    owner: OwnerId,
    trigger: Trigger,
}

struct Mutation {
    alert_id: AlertId,
    owner: OwnerId,
    effect: Effect,
}

pub struct Orchestrator {
    repo: Arc<dyn AlertRepository>,
    market: Arc<dyn MarketDataPort>,
    notifier: Arc<dyn NotificationPort>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    quotes: TtlCache<f64>,
    volumes: TtlCache<VolumeWindow>,
    candles: TtlCache<Arc<Vec<Candle>>>,
    indicators: TtlCache<Reading<f64>>,
    gate: tokio::sync::Mutex<()>,
    seq: AtomicU64,
    state: Mutex<CycleState>,
}

impl Orchestrator {
    pub fn new(
        repo: Arc<dyn AlertRepository>,
        market: Arc<dyn MarketDataPort>,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let negative = config.negative_ttl;
        Self {
            quotes: TtlCache::new(clock.clone(), negative),
            volumes: TtlCache::new(clock.clone(), negative),
            candles: TtlCache::new(clock.clone(), negative),
            indicators: TtlCache::new(clock.clone(), negative),
            repo,
            market,
            notifier,
            clock,
            config,
            gate: tokio::sync::Mutex::new(()),
            seq: AtomicU64::new(0),
            state: Mutex::new(CycleState::Idle),
        }
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn transition(&self, next: CycleState, report: &mut CycleReport) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        debug!(from = ?*state, to = ?next, "cycle state");
        *state = next;
        if next != CycleState::Idle {
            report.reached = next;
        }
    }

    /// Runs one evaluation pass, or returns a busy report if one is already
    /// in progress.
    pub async fn run_cycle(&self) -> CycleReport {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let Ok(_guard) = self.gate.try_lock() else {
            info!(seq, "previous cycle still running, tick skipped");
            return CycleReport::busy(seq);
        };

        let mut report = CycleReport {
            seq,
            ..CycleReport::default()
        };
        self.cycle(&mut report).instrument(info_span!("cycle", seq)).await;
        self.transition(CycleState::Idle, &mut report);
        report.log();
        report
    }

    /// Ticks every `interval` until `shutdown` resolves. Each cycle runs in
    /// its own task so a panic stays inside that cycle.
    pub async fn run_until<S>(self: Arc<Self>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut running = JoinSet::new();
        tokio::pin!(shutdown);

        info!(interval_secs = self.config.interval.as_secs(), "scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    while let Some(done) = running.try_join_next() {
                        reap(done);
                    }
                    let orchestrator = Arc::clone(&self);
                    running.spawn(async move {
                        orchestrator.run_cycle().await;
                    });
                }
            }
        }
        while let Some(done) = running.join_next().await {
            reap(done);
        }
        info!("scheduler stopped");
    }

    async fn cycle(&self, report: &mut CycleReport) {
        let started = self.clock.now();
        self.evict_stale();

        self.transition(CycleState::CollectingSymbols, report);
        let collected = match self.collect().await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "could not list alerts, cycle aborted");
                report.error = Some(e.to_string());
                return;
            }
        };
        report.symbols = collected.symbols.len();
        report.abandoned.extend(collected.unlisted.iter().copied());

        self.transition(CycleState::FetchingQuotes, report);
        let remaining = self.config.deadline.saturating_sub(elapsed(started, self.clock.now()));
        let snapshot = match tokio::time::timeout(remaining, self.fetch(&collected, report)).await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                warn!("deadline passed while fetching, evaluation abandoned");
                report.deadline_exceeded = true;
                report.abandoned.extend(collected.batches.iter().map(|(k, _)| *k));
                return;
            }
        };

        self.transition(CycleState::Evaluating, report);
        let fired = self.evaluate(collected.batches, &snapshot, started, report);

        self.transition(CycleState::Dispatching, report);
        for (kind, batch) in fired {
            let delivered = self.dispatch(kind, batch, started, report).await;
            self.apply(kind, delivered, report).await;
        }
    }

    fn evict_stale(&self) {
        let quote_age = self.config.quote_ttl.max(self.config.negative_ttl);
        let indicator_age = self.config.indicator_ttl.max(self.config.negative_ttl);
        let evicted = self.quotes.evict_older_than(quote_age)
            + self.volumes.evict_older_than(quote_age)
            + self.candles.evict_older_than(indicator_age)
            + self.indicators.evict_older_than(indicator_age);
        if evicted > 0 {
            debug!(evicted, "expired cache entries dropped");
        }
    }

    fn past_deadline(&self, started: DateTime<Utc>) -> bool {
        elapsed(started, self.clock.now()) >= self.config.deadline
    }

    async fn collect(&self) -> Result<Collected, EngineError> {
        let repo = Arc::clone(&self.repo);
        blocking(move || {
            let session = repo.session()?;
            let symbols = session.distinct_symbols(&AlertKind::ALL)?;
            let mut batches = Vec::with_capacity(AlertKind::ALL.len());
            let mut unlisted = Vec::new();
            for kind in AlertKind::ALL {
                match session.list(kind) {
                    Ok(alerts) => {
                        debug!(kind = %kind, count = alerts.len(), "alerts listed");
                        batches.push((kind, alerts));
                    }
                    Err(e) => {
                        warn!(kind = %kind, error = %e, "listing failed, kind skipped this cycle");
                        unlisted.push(kind);
                    }
                }
            }
            Ok(Collected {
                batches,
                symbols,
                unlisted,
            })
        })
        .await
    }

    async fn fetch(&self, collected: &Collected, report: &mut CycleReport) -> MarketSnapshot {
        let limits = RateLimits::default();
        let fan_out = self.config.fan_out;
        let mut snapshot = MarketSnapshot::new();

        // Each stream is fed ready-made futures over owned keys so the cycle
        // future stays Send for the scheduler.
        let pending: Vec<_> = collected
            .symbols
            .iter()
            .cloned()
            .map(|symbol| self.quote_entry(symbol, &limits))
            .collect();
        let quotes: Vec<(String, Result<f64, EngineError>)> =
            stream::iter(pending).buffer_unordered(fan_out).collect().await;
        for (symbol, result) in quotes {
            match result {
                Ok(price) => {
                    report.quotes_ok += 1;
                    snapshot.insert_quote(symbol, price);
                }
                Err(e) => {
                    report.quotes_failed += 1;
                    log_fetch_failure(&symbol, "quote", &e);
                }
            }
        }

        let pending: Vec<_> = collected
            .volume_keys()
            .into_iter()
            .map(|(symbol, tf)| self.volume_entry(symbol, tf, &limits))
            .collect();
        let volumes: Vec<((String, Timeframe), Result<VolumeWindow, EngineError>)> =
            stream::iter(pending).buffer_unordered(fan_out).collect().await;
        for ((symbol, tf), result) in volumes {
            match result {
                Ok(window) => snapshot.insert_volume(symbol, tf, window),
                Err(e) => log_fetch_failure(&symbol, "volume", &e),
            }
        }

        let pending: Vec<_> = collected
            .indicator_groups()
            .into_iter()
            .map(|((symbol, tf), fields)| self.fetch_indicators(symbol, tf, fields, &limits))
            .collect();
        let readings: Vec<Vec<(String, Timeframe, IndicatorField, Result<Reading<f64>, EngineError>)>> =
            stream::iter(pending).buffer_unordered(fan_out).collect().await;
        for (symbol, tf, field, result) in readings.into_iter().flatten() {
            match result {
                Ok(reading) => {
                    if let Reading::NotReady(NotReady::History { need, have }) = reading {
                        let e = EngineError::InsufficientHistory {
                            symbol: symbol.clone(),
                            indicator: field.to_string(),
                            have,
                            need,
                        };
                        debug!(error = %e, "indicator not ready");
                    }
                    snapshot.insert_indicator(symbol, field, tf, reading);
                }
                Err(e) => log_fetch_failure(&symbol, "candles", &e),
            }
        }

        for feed in [Feed::Quotes, Feed::Candles] {
            if limits.is_limited(feed) {
                report.rate_limited.push(self.market.provider(feed).to_string());
            }
        }
        snapshot
    }

    /// Runs `call` unless `feed` is already rate limited this cycle, and trips
    /// the feed when the call itself reports a rate limit.
    async fn guarded<T, F>(&self, feed: Feed, limits: &RateLimits, call: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        if limits.is_limited(feed) {
            return Err(EngineError::UpstreamRateLimited {
                provider: self.market.provider(feed).to_string(),
            });
        }
        let result = call.await;
        if let Err(EngineError::UpstreamRateLimited { provider }) = &result {
            if limits.trip(feed) {
                warn!(provider = %provider, "rate limited, remaining fetches on this feed skipped until next cycle");
            }
        }
        result
    }

    async fn quote_entry(&self, symbol: String, limits: &RateLimits) -> (String, Result<f64, EngineError>) {
        let result = self.fetch_quote(&symbol, limits).await;
        (symbol, result)
    }

    async fn volume_entry(
        &self,
        symbol: String,
        tf: Timeframe,
        limits: &RateLimits,
    ) -> ((String, Timeframe), Result<VolumeWindow, EngineError>) {
        let result = self.fetch_volume(&symbol, tf, limits).await;
        ((symbol, tf), result)
    }

    async fn fetch_quote(&self, symbol: &str, limits: &RateLimits) -> Result<f64, EngineError> {
        self.quotes
            .get_or_fetch(symbol, self.config.quote_ttl, || {
                self.guarded(Feed::Quotes, limits, self.market.quote(symbol))
            })
            .await
    }

    async fn fetch_volume(&self, symbol: &str, tf: Timeframe, limits: &RateLimits) -> Result<VolumeWindow, EngineError> {
        let key = format!("{}:volume:{}", symbol, tf);
        self.volumes
            .get_or_fetch(&key, self.config.quote_ttl, || {
                self.guarded(Feed::Candles, limits, self.market.volume_window(symbol, tf))
            })
            .await
    }

    /// Computes every field of one `(symbol, timeframe)` group. Fields are
    /// handled in order so the candle series is fetched at most once.
    async fn fetch_indicators(
        &self,
        symbol: String,
        tf: Timeframe,
        fields: Vec<IndicatorField>,
        limits: &RateLimits,
    ) -> Vec<(String, Timeframe, IndicatorField, Result<Reading<f64>, EngineError>)> {
        let limit = fields
            .iter()
            .map(IndicatorField::lookback)
            .max()
            .unwrap_or(0)
            .max(self.config.candle_limit)
            .min(MAX_CANDLE_LIMIT);
        let candle_key = format!("{}:candles:{}:{}", symbol, tf, limit);
        let ttl = self.config.indicator_ttl;

        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            let key = indicator_key(&symbol, &field, tf);
            let result = self
                .indicators
                .get_or_fetch(&key, ttl, || async {
                    let candles = self
                        .candles
                        .get_or_fetch(&candle_key, ttl, || {
                            self.guarded(Feed::Candles, limits, async {
                                self.market.candles(&symbol, tf, limit).await.map(Arc::new)
                            })
                        })
                        .await?;
                    Ok(field.compute(&Columns::from_candles(&candles)))
                })
                .await;
            out.push((symbol.clone(), tf, field, result));
        }
        out
    }

    fn evaluate(
        &self,
        batches: Vec<(AlertKind, Vec<Alert>)>,
        snapshot: &MarketSnapshot,
        started: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Vec<(AlertKind, Vec<Firing>)> {
        let mut fired = Vec::with_capacity(batches.len());
        let mut batches = batches.into_iter();

        while let Some((kind, alerts)) = batches.next() {
            if self.past_deadline(started) {
                warn!(kind = %kind, "deadline passed, remaining kinds abandoned");
                report.deadline_exceeded = true;
                report.abandoned.push(kind);
                report.abandoned.extend(batches.by_ref().map(|(k, _)| k));
                break;
            }

            let mut batch = Vec::new();
            for alert in &alerts {
                report.alerts_evaluated += 1;
                match evaluator::evaluate(alert, snapshot) {
                    Ok(Decision::Quiet) => {}
                    Ok(Decision::Skipped(reason)) => {
                        report.skipped += 1;
                        debug!(kind = %kind, alert_id = alert.id(), reason = %reason, "alert skipped");
                    }
                    Ok(Decision::Fired(triggers)) => {
                        report.triggered += triggers.len();
                        for trigger in triggers {
                            info!(
                                kind = %kind,
                                alert_id = alert.id(),
                                owner = alert.owner(),
                                effect = ?trigger.effect,
                                "alert triggered"
                            );
                            batch.push(Firing {
                                alert_id: alert.id(),
                                owner: alert.owner(),
                                trigger,
                            });
                        }
                    }
                    Err(e) => {
                        report.invalid += 1;
                        warn!(kind = %kind, alert_id = alert.id(), error = %e, "alert not evaluated");
                    }
                }
            }
            fired.push((kind, batch));
        }
        fired
    }

    /// Sends each trigger in the batch and returns the ones that were delivered.
    async fn dispatch(
        &self,
        kind: AlertKind,
        batch: Vec<Firing>,
        started: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Vec<Firing> {
        let mut delivered = Vec::with_capacity(batch.len());
        for firing in batch {
            if self.past_deadline(started) {
                report.deadline_exceeded = true;
                report.undelivered += 1;
                debug!(kind = %kind, alert_id = firing.alert_id, "deadline passed, delivery deferred");
                continue;
            }
            match self.notifier.send(firing.owner, &firing.trigger.message).await {
                Ok(handle) => {
                    report.notifications_sent += 1;
                    debug!(kind = %kind, alert_id = firing.alert_id, message_id = handle.message_id, "delivered");
                    delivered.push(firing);
                }
                Err(e) => {
                    report.notifications_failed += 1;
                    warn!(
                        kind = %kind,
                        alert_id = firing.alert_id,
                        owner = firing.owner,
                        error = %e,
                        "delivery failed, record left unchanged"
                    );
                }
            }
        }
        delivered
    }

    async fn apply(&self, kind: AlertKind, delivered: Vec<Firing>, report: &mut CycleReport) {
        let pending: Vec<Mutation> = delivered
            .into_iter()
            .filter(|f| !matches!(f.trigger.effect, Effect::Keep))
            .map(|f| Mutation {
                alert_id: f.alert_id,
                owner: f.owner,
                effect: f.trigger.effect,
            })
            .collect();
        if pending.is_empty() {
            return;
        }

        let count = pending.len();
        let repo = Arc::clone(&self.repo);
        let outcome = blocking(move || {
            let session = repo.session()?;
            Ok(pending
                .into_iter()
                .map(|m| {
                    let result = match m.effect {
                        Effect::Keep => Ok(()),
                        Effect::Delete => session.delete(kind, m.alert_id),
                        Effect::ResetBaseline { new_base } => session.reset_baseline(kind, m.alert_id, new_base),
                        Effect::ClearBound(bound) => session.clear_bound(m.owner, bound),
                    };
                    (m, result)
                })
                .collect::<Vec<_>>())
        })
        .await;

        let results = match outcome {
            Ok(results) => results,
            Err(e) => {
                report.mutations_failed += count;
                warn!(kind = %kind, error = %e, "no session for mutations, records left unchanged");
                return;
            }
        };
        for (m, result) in results {
            match result {
                Ok(()) => report.mutations_applied += 1,
                Err(e) => {
                    report.mutations_failed += 1;
                    warn!(
                        kind = %kind,
                        alert_id = m.alert_id,
                        effect = ?m.effect,
                        error = %e,
                        "mutation failed, alert will be re-evaluated next cycle"
                    );
                }
            }
        }
    }
}

fn elapsed(started: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - started).to_std().unwrap_or(Duration::ZERO)
}

/// Runs synchronous repository work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, EngineError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(work))
        .await
        .unwrap_or_else(|e| Err(EngineError::persistence(format!("repository task failed: {e}"))))
}

fn reap(done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        error!(error = %e, "cycle task failed");
    }
}

fn log_fetch_failure(symbol: &str, what: &str, err: &EngineError) {
    match err {
        EngineError::UpstreamRateLimited { .. } => {
            debug!(symbol = %symbol, what, error = %err, "fetch skipped");
        }
        _ => warn!(symbol = %symbol, what, error = %err, "fetch failed, dependent alerts skipped"),
    }
}
