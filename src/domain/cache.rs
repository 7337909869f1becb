//! TTL memoization for quotes and derived indicator values.
//!
//! Keys are plain strings: the symbol for quotes, `symbol:indicator:timeframe`
//! for indicators. A hit younger than its TTL is served without calling the
//! fetcher. Failures are only remembered for `negative_ttl`, which is usually
//! zero, so one bad symbol never suppresses retries for long.
//!
//! The lock is never held across the fetch await; two concurrent misses on
//! the same key may both fetch, and the later store wins.

use crate::domain::error::EngineError;
use crate::ports::clock_port::Clock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

struct Entry<V> {
    stored_at: DateTime<Utc>,
    value: Result<V, EngineError>,
}

pub struct TtlCache<V> {
    clock: Arc<dyn Clock>,
    negative_ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>, negative_ttl: Duration) -> Self {
        Self {
            clock,
            negative_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, EngineError>>,
    {
        if let Some(hit) = self.lookup(key, ttl) {
            debug!(key, ok = hit.is_ok(), "cache hit");
            return hit;
        }
        let result = fetch().await;
        self.store(key, &result);
        result
    }

    fn lookup(&self, key: &str, ttl: Duration) -> Option<Result<V, EngineError>> {
        let now = self.clock.now();
        let entries = self.lock();
        let entry = entries.get(key)?;
        let age = age(entry.stored_at, now);
        match &entry.value {
            Ok(v) if age < ttl => Some(Ok(v.clone())),
            Err(e) if age < self.negative_ttl => Some(Err(e.clone())),
            _ => None,
        }
    }

    fn store(&self, key: &str, result: &Result<V, EngineError>) {
        let now = self.clock.now();
        let mut entries = self.lock();
        if result.is_err() && self.negative_ttl.is_zero() {
            entries.remove(key);
            return;
        }
        entries.insert(
            key.to_string(),
            Entry {
                stored_at: now,
                value: result.clone(),
            },
        );
    }

    /// Drops entries older than `max_age`. Returns how many were removed.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| age(e.stored_at, now) < max_age);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Elapsed time since `stored_at`; a clock that moved backwards counts as zero.
fn age(stored_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - stored_at).to_std().unwrap_or(Duration::ZERO)
}
