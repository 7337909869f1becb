//! Telegram delivery through the Bot API.

use crate::domain::alert::OwnerId;
use crate::domain::error::EngineError;
use crate::ports::notification_port::{MessageHandle, NotificationPort};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};

/// Owner ids are Telegram chat ids.
pub struct TelegramDispatcher {
    bot: Bot,
}

impl TelegramDispatcher {
    pub fn new(token: &str) -> Self {
        Self { bot: Bot::new(token) }
    }
}

#[async_trait]
impl NotificationPort for TelegramDispatcher {
    #[allow(deprecated)]
    async fn send(&self, owner: OwnerId, text: &str) -> Result<MessageHandle, EngineError> {
        // Alert texts use legacy Markdown (`*bold*`, backticks) and are not
        // escaped for MarkdownV2.
        let message = self
            .bot
            .send_message(ChatId(owner), text)
            .parse_mode(ParseMode::Markdown)
            .await
            .map_err(|e| EngineError::Delivery {
                owner,
                reason: e.to_string(),
            })?;
        Ok(MessageHandle {
            owner,
            message_id: i64::from(message.id.0),
        })
    }

    async fn retract(&self, handle: &MessageHandle) -> Result<(), EngineError> {
        let message_id = i32::try_from(handle.message_id).map_err(|_| EngineError::Delivery {
            owner: handle.owner,
            reason: format!("message id {} out of range", handle.message_id),
        })?;
        self.bot
            .delete_message(ChatId(handle.owner), MessageId(message_id))
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Delivery {
                owner: handle.owner,
                reason: e.to_string(),
            })
    }
}
