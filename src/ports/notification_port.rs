//! Outbound notification port.

use crate::domain::alert::OwnerId;
use crate::domain::error::EngineError;
use async_trait::async_trait;

/// Identifies a delivered message so it can be retracted later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub owner: OwnerId,
    pub message_id: i64,
}

#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Delivers Markdown `text` to `owner`. Best effort: no retry here.
    async fn send(&self, owner: OwnerId, text: &str) -> Result<MessageHandle, EngineError>;

    async fn retract(&self, handle: &MessageHandle) -> Result<(), EngineError>;
}

/// How long an owner wants alert messages kept before they are retracted.
pub trait RetentionPolicy: Send + Sync {
    /// `None` means keep forever.
    fn retention(&self, owner: OwnerId) -> Result<Option<std::time::Duration>, EngineError>;
}
