use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    Result,
};

/// Outbound messaging port. Telegram (teloxide) is the production implementation.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send plain text, optionally as a reply to `reply_to`.
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef>;
}
