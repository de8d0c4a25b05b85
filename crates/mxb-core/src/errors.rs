use std::path::PathBuf;

use crate::domain::ChatId;

/// Core error type for the export bot.
///
/// Adapter crates should map their specific errors into this type so the gate can report
/// failures consistently (log + reply to the triggering chat).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("chat {chat_id} not found")]
    ChatNotFound { chat_id: ChatId },

    #[error("chat {chat_id} is not a supergroup")]
    NotASupergroup { chat_id: ChatId },

    #[error("chat service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("export already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
