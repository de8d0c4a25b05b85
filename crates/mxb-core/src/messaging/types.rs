use crate::domain::{ChatId, MessageId, UserId};

/// Inbound update as seen by the core.
///
/// Telegram-specific fields stay in the Telegram adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncomingUpdate {
    Text(TextMessage),
    /// Anything the bot does not act on (stickers, joins, edits, ...).
    Other { chat_id: ChatId, kind: String },
}

impl IncomingUpdate {
    pub fn chat_id(&self) -> ChatId {
        match self {
            IncomingUpdate::Text(m) => m.chat_id,
            IncomingUpdate::Other { chat_id, .. } => *chat_id,
        }
    }
}

/// Who sent a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sender {
    User(UserId),
    /// Anonymous admin or channel posting on behalf of a chat.
    Chat(ChatId),
    Unknown,
}

impl Sender {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Sender::User(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: Sender,
    pub text: String,
}
