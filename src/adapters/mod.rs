//! Concrete implementations of the ports.

pub mod auto_delete;
pub mod file_config_adapter;
pub mod http_market_gateway;
pub mod log_dispatcher;
pub mod memory_repository;
#[cfg(feature = "sqlite")]
pub mod sqlite_alert_repository;
pub mod system_clock;
#[cfg(feature = "telegram")]
pub mod telegram_dispatcher;
