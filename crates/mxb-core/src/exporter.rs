//! One export request end to end: resolve, paginate, write.
//!
//! `Resolving -> Paginating -> Writing -> Done`; a failure in any phase aborts the
//! request and nothing is written. Partial results are dropped, never persisted.

use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    chat::ChatService,
    domain::ChatId,
    enumerate::MemberEnumeration,
    export::{ExportArtifact, ExportId, ExportWriter},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportPhase {
    Resolving,
    Paginating,
    Writing,
    Done,
    Failed,
}

#[derive(Clone, Debug)]
pub struct ExportReport {
    pub id: ExportId,
    pub path: PathBuf,
    pub chat_title: String,
    pub member_count: usize,
    pub pages: usize,
}

pub struct MemberExporter {
    chats: Arc<dyn ChatService>,
    writer: ExportWriter,
    page_size: u32,
}

impl MemberExporter {
    pub fn new(chats: Arc<dyn ChatService>, writer: ExportWriter, page_size: u32) -> Self {
        Self {
            chats,
            writer,
            page_size,
        }
    }

    pub async fn export(&self, chat_id: ChatId) -> Result<ExportReport> {
        self.export_at(chat_id, Utc::now()).await
    }

    /// Export `chat_id` with an explicit start time (the time the export id is derived from).
    pub async fn export_at(
        &self,
        chat_id: ChatId,
        started_at: DateTime<Utc>,
    ) -> Result<ExportReport> {
        let id = ExportId::new(started_at, chat_id);
        let mut phase = ExportPhase::Resolving;

        let result = self.run(chat_id, &id, &mut phase).await;
        match &result {
            Ok(report) => {
                phase = ExportPhase::Done;
                tracing::info!(
                    export_id = %report.id,
                    chat_id = chat_id.0,
                    members = report.member_count,
                    pages = report.pages,
                    path = %report.path.display(),
                    ?phase,
                    "export finished"
                );
            }
            Err(e) => {
                tracing::error!(
                    export_id = %id,
                    chat_id = chat_id.0,
                    failed_in = ?phase,
                    phase = ?ExportPhase::Failed,
                    error = %e,
                    "export failed"
                );
            }
        }
        result
    }

    async fn run(
        &self,
        chat_id: ChatId,
        id: &ExportId,
        phase: &mut ExportPhase,
    ) -> Result<ExportReport> {
        *phase = ExportPhase::Resolving;
        tracing::info!(export_id = %id, chat_id = chat_id.0, "resolving chat");
        let enumeration =
            MemberEnumeration::start(self.chats.as_ref(), chat_id, self.page_size).await?;

        *phase = ExportPhase::Paginating;
        tracing::info!(
            export_id = %id,
            chat_id = chat_id.0,
            title = %enumeration.chat().title,
            page_size = self.page_size,
            "enumerating members"
        );
        let enumerated = enumeration.collect().await?;

        *phase = ExportPhase::Writing;
        let artifact = ExportArtifact {
            id: id.clone(),
            target_group_id: chat_id.0,
            members: enumerated.members,
        };
        let path = self.writer.write(&artifact)?;

        Ok(ExportReport {
            id: artifact.id,
            path,
            chat_title: enumerated.chat.title,
            member_count: artifact.members.len(),
            pages: enumerated.pages,
        })
    }
}
