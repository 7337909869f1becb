//! Engine error taxonomy.
//!
//! Every variant is caught at the smallest enclosing scope (symbol, alert or
//! evaluator batch) by the cycle orchestrator. Only configuration errors
//! escape to the CLI.

/// Top-level error type for tripwire.
///
/// `Clone` so a cached fetch failure can be replayed to every caller that
/// hits the same key inside its negative TTL.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("insufficient history for {indicator} on {symbol}: have {have} candles, need {need}")]
    InsufficientHistory {
        symbol: String,
        indicator: String,
        have: usize,
        need: usize,
    },

    #[error("upstream provider {provider} is rate limiting requests")]
    UpstreamRateLimited { provider: String },

    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    #[error("delivery to {owner} failed: {reason}")]
    Delivery { owner: i64, reason: String },

    #[error("invalid {kind} alert {id}: {reason}")]
    InvalidAlert { kind: String, id: i64, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },
}

impl EngineError {
    pub fn unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        EngineError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl ToString) -> Self {
        EngineError::Persistence {
            reason: reason.to_string(),
        }
    }

    /// Failures that clear up on their own; the affected work is retried on
    /// the next cycle rather than reported as a defect.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::DataUnavailable { .. }
                | EngineError::InsufficientHistory { .. }
                | EngineError::UpstreamRateLimited { .. }
                | EngineError::Persistence { .. }
                | EngineError::Delivery { .. }
        )
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::Persistence { .. } => 3,
            EngineError::DataUnavailable { .. }
            | EngineError::InsufficientHistory { .. }
            | EngineError::UpstreamRateLimited { .. } => 4,
            EngineError::Delivery { .. } | EngineError::InvalidAlert { .. } => 1,
        };
        std::process::ExitCode::from(code)
    }
}
