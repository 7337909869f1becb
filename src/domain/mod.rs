//! Core domain types and logic: indicators, alert rules, caching and the
//! evaluation cycle. Nothing in here performs I/O except through ports.

pub mod alert;
pub mod cache;
pub mod candle;
pub mod cycle;
pub mod engine_config;
pub mod error;
pub mod evaluator;
pub mod indicator;
pub mod indicator_helpers;
pub mod snapshot;
