//! In-process alert store.
//!
//! Backs tests and dry runs. Portfolio limits are keyed by owner, matching
//! `Alert::id`. Listing applies the same activity filters as the SQLite
//! store: passive watchlist entries and limits without bounds are hidden.

use crate::domain::alert::{Alert, AlertId, AlertKind, Bound, OwnerId};
use crate::domain::error::EngineError;
use crate::ports::alert_repository::{AlertRepository, AlertSession};
use crate::ports::notification_port::RetentionPolicy;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct State {
    alerts: BTreeMap<(AlertKind, AlertId), Alert>,
    retention: HashMap<OwnerId, Duration>,
    fail_mutations: bool,
    mutations: usize,
}

#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alerts(alerts: impl IntoIterator<Item = Alert>) -> Self {
        let repo = Self::new();
        for alert in alerts {
            repo.insert(alert);
        }
        repo
    }

    /// Replaces any record with the same kind and id.
    pub fn insert(&self, alert: Alert) {
        self.lock().alerts.insert((alert.kind(), alert.id()), alert);
    }

    pub fn get(&self, kind: AlertKind, id: AlertId) -> Option<Alert> {
        self.lock().alerts.get(&(kind, id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_retention(&self, owner: OwnerId, after: Duration) {
        self.lock().retention.insert(owner, after);
    }

    /// Makes every subsequent mutation fail with `Persistence`.
    pub fn fail_mutations(&self, fail: bool) {
        self.lock().fail_mutations = fail;
    }

    /// Mutations applied successfully so far.
    pub fn mutation_count(&self) -> usize {
        self.lock().mutations
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mutate<F>(&self, apply: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut BTreeMap<(AlertKind, AlertId), Alert>) -> Result<(), EngineError>,
    {
        let mut state = self.lock();
        if state.fail_mutations {
            return Err(EngineError::persistence("store is read-only"));
        }
        apply(&mut state.alerts)?;
        state.mutations += 1;
        Ok(())
    }
}

fn is_active(alert: &Alert) -> bool {
    match alert {
        Alert::Watchlist(w) => w.threshold_pct > 0.0,
        Alert::PortfolioLimit(p) => p.loss_limit.is_some() || p.profit_target.is_some(),
        _ => true,
    }
}

impl AlertRepository for MemoryRepository {
    fn session(&self) -> Result<Box<dyn AlertSession + '_>, EngineError> {
        Ok(Box::new(MemorySession { repo: self }))
    }
}

impl RetentionPolicy for MemoryRepository {
    fn retention(&self, owner: OwnerId) -> Result<Option<Duration>, EngineError> {
        Ok(self.lock().retention.get(&owner).copied())
    }
}

struct MemorySession<'a> {
    repo: &'a MemoryRepository,
}

impl AlertSession for MemorySession<'_> {
    fn list(&self, kind: AlertKind) -> Result<Vec<Alert>, EngineError> {
        Ok(self
            .repo
            .lock()
            .alerts
            .range((kind, AlertId::MIN)..=(kind, AlertId::MAX))
            .map(|(_, alert)| alert)
            .filter(|alert| is_active(alert))
            .cloned()
            .collect())
    }

    fn distinct_symbols(&self, kinds: &[AlertKind]) -> Result<BTreeSet<String>, EngineError> {
        let mut symbols = BTreeSet::new();
        for kind in kinds {
            for alert in self.list(*kind)? {
                symbols.extend(alert.symbols().into_iter().map(str::to_string));
            }
        }
        Ok(symbols)
    }

    fn delete(&self, kind: AlertKind, id: AlertId) -> Result<(), EngineError> {
        self.repo.mutate(|alerts| {
            alerts.remove(&(kind, id));
            Ok(())
        })
    }

    fn reset_baseline(&self, kind: AlertKind, id: AlertId, new_base: f64) -> Result<(), EngineError> {
        self.repo.mutate(|alerts| {
            match alerts.get_mut(&(kind, id)) {
                Some(Alert::Percent(p)) => p.base_price = new_base,
                Some(Alert::Watchlist(w)) => w.base_price = new_base,
                Some(other) => {
                    return Err(EngineError::persistence(format!("{} alerts have no baseline", other.kind())));
                }
                None => {}
            }
            Ok(())
        })
    }

    fn clear_bound(&self, owner: OwnerId, bound: Bound) -> Result<(), EngineError> {
        self.repo.mutate(|alerts| {
            if let Some(Alert::PortfolioLimit(limit)) = alerts.get_mut(&(AlertKind::PortfolioLimit, owner)) {
                match bound {
                    Bound::Loss => limit.loss_limit = None,
                    Bound::Profit => limit.profit_target = None,
                }
            }
            Ok(())
        })
    }
}
