//! Alert persistence port.
//!
//! The repository hands out scoped sessions. A session holds one underlying
//! connection for its lifetime and releases it on drop, so callers open one
//! per batch instead of pairing open/close calls around every query.
//!
//! Every mutation is keyed by a single record and is idempotent: deleting a
//! row twice, or resetting a baseline to the same value twice, is not an
//! error.

use crate::domain::alert::{Alert, AlertId, AlertKind, Bound, OwnerId};
use crate::domain::error::EngineError;
use std::collections::BTreeSet;

pub trait AlertRepository: Send + Sync {
    fn session(&self) -> Result<Box<dyn AlertSession + '_>, EngineError>;
}

pub trait AlertSession {
    /// All active records of one kind. Rows that cannot be decoded are
    /// logged and left out rather than failing the whole listing.
    fn list(&self, kind: AlertKind) -> Result<Vec<Alert>, EngineError>;

    /// Every symbol referenced by records of the given kinds.
    fn distinct_symbols(&self, kinds: &[AlertKind]) -> Result<BTreeSet<String>, EngineError>;

    fn delete(&self, kind: AlertKind, id: AlertId) -> Result<(), EngineError>;

    /// Only percent alerts and watchlist entries carry a baseline.
    fn reset_baseline(&self, kind: AlertKind, id: AlertId, new_base: f64) -> Result<(), EngineError>;

    fn clear_bound(&self, owner: OwnerId, bound: Bound) -> Result<(), EngineError>;
}
