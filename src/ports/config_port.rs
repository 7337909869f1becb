//! Configuration access port trait.
//!
//! Missing keys fall back to the caller's default. A key that is present but
//! does not parse is an error, never silently replaced by the default.

use crate::domain::error::EngineError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, EngineError>;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, EngineError>;
}
