//! Time source port.
//!
//! Cache expiry and cycle deadlines read time only through this trait so
//! tests can drive them with a hand-advanced clock.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
