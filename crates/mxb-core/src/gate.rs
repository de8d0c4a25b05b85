//! Command gate: turns an authorized export command into an export run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId},
    exporter::MemberExporter,
    messaging::{
        port::MessagingPort,
        types::{IncomingUpdate, TextMessage},
    },
    security::is_admin,
    supervisor::UpdateHandler,
    Result,
};

pub const NOT_ALLOWED_REPLY: &str = "Not allowed: not the bot admin";

/// Split `/cmd@botname args` into a lowercase command name and the rest.
///
/// Returns `None` for anything that is not a command.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    if cmd.is_empty() {
        return None;
    }
    Some((cmd, rest))
}

pub struct CommandGate {
    admin_user_id: i64,
    command: String,
    exporter: Arc<MemberExporter>,
    messenger: Arc<dyn MessagingPort>,
}

impl CommandGate {
    pub fn new(
        admin_user_id: i64,
        command: impl Into<String>,
        exporter: Arc<MemberExporter>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            admin_user_id,
            command: command.into(),
            exporter,
            messenger,
        }
    }

    async fn reply(&self, chat_id: ChatId, reply_to: MessageId, text: &str) {
        if let Err(e) = self
            .messenger
            .send_text(chat_id, text, Some(reply_to))
            .await
        {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
        }
    }

    async fn handle_text(&self, msg: TextMessage) -> Result<()> {
        let Some((cmd, _args)) = parse_command(&msg.text) else {
            tracing::debug!(chat_id = msg.chat_id.0, text = %msg.text, "message");
            return Ok(());
        };
        if cmd != self.command {
            tracing::debug!(chat_id = msg.chat_id.0, command = %cmd, "ignoring command");
            return Ok(());
        }

        if !is_admin(msg.sender, self.admin_user_id) {
            tracing::warn!(
                chat_id = msg.chat_id.0,
                sender = ?msg.sender,
                "export refused: not the bot admin"
            );
            self.reply(msg.chat_id, msg.message_id, NOT_ALLOWED_REPLY)
                .await;
            return Ok(());
        }

        match self.exporter.export(msg.chat_id).await {
            Ok(report) => {
                let text = format!(
                    "Exported {} members (export {})",
                    report.member_count, report.id
                );
                self.reply(msg.chat_id, msg.message_id, &text).await;
                Ok(())
            }
            Err(e) => {
                let text = format!("Export failed: {e}");
                self.reply(msg.chat_id, msg.message_id, &text).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl UpdateHandler for CommandGate {
    async fn handle(&self, update: IncomingUpdate) -> Result<()> {
        match update {
            IncomingUpdate::Text(msg) => self.handle_text(msg).await,
            IncomingUpdate::Other { chat_id, kind } => {
                tracing::debug!(chat_id = chat_id.0, kind = %kind, "ignoring update");
                Ok(())
            }
        }
    }
}
