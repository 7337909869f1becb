//! Notification sink that writes alert messages to the log.
//!
//! Used for dry runs and when no chat backend is configured. Message ids are
//! local counters so auto-delete can still be exercised end to end.

use crate::domain::alert::OwnerId;
use crate::domain::error::EngineError;
use crate::ports::notification_port::{MessageHandle, NotificationPort};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info};

#[derive(Default)]
pub struct LogDispatcher {
    next_id: AtomicI64,
}

impl LogDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationPort for LogDispatcher {
    async fn send(&self, owner: OwnerId, text: &str) -> Result<MessageHandle, EngineError> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!(owner, message_id, text = %text, "alert notification");
        Ok(MessageHandle { owner, message_id })
    }

    async fn retract(&self, handle: &MessageHandle) -> Result<(), EngineError> {
        debug!(owner = handle.owner, message_id = handle.message_id, "notification retracted");
        Ok(())
    }
}
