//! Market data port.

use crate::domain::alert::Timeframe;
use crate::domain::candle::Candle;
use crate::domain::error::EngineError;
use crate::domain::snapshot::VolumeWindow;
use async_trait::async_trait;

/// Which upstream feed a call goes to. Rate limiting is tracked per feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Quotes,
    Candles,
}

#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Provider name reported in `UpstreamRateLimited`.
    fn provider(&self, feed: Feed) -> &str;

    async fn quote(&self, symbol: &str) -> Result<f64, EngineError>;

    /// Latest candle volume against the trailing average for `timeframe`.
    async fn volume_window(&self, symbol: &str, timeframe: Timeframe) -> Result<VolumeWindow, EngineError>;

    /// Most recent `limit` candles, oldest first.
    async fn candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, EngineError>;
}
