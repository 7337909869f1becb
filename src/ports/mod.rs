//! Port trait definitions for hexagonal architecture.

pub mod alert_repository;
pub mod clock_port;
pub mod config_port;
pub mod market_data_port;
pub mod notification_port;
