//! Chat membership service port.
//!
//! The remote service (TDLib in production) is injected as `Arc<dyn ChatService>` so the
//! enumeration core can be driven by a scripted fake in tests.

use async_trait::async_trait;

use crate::{
    domain::{ChatId, SupergroupId, UserId},
    Result,
};

/// Kind of chat a chat id resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private { user_id: UserId },
    BasicGroup { basic_group_id: i64 },
    Supergroup { supergroup_id: SupergroupId, is_channel: bool },
    Secret { secret_chat_id: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedChat {
    pub chat_id: ChatId,
    pub title: String,
    pub kind: ChatKind,
}

impl ResolvedChat {
    pub fn supergroup_id(&self) -> Option<SupergroupId> {
        match self.kind {
            ChatKind::Supergroup { supergroup_id, .. } => Some(supergroup_id),
            _ => None,
        }
    }
}

/// Who a membership entry belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberSender {
    User { user_id: UserId },
    /// Anonymous admins / linked channels posting as a chat.
    Chat { chat_id: ChatId },
}

/// Membership status tag as reported by the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    pub const ALL: [MemberStatus; 6] = [
        MemberStatus::Creator,
        MemberStatus::Administrator,
        MemberStatus::Member,
        MemberStatus::Restricted,
        MemberStatus::Left,
        MemberStatus::Banned,
    ];
}

/// One raw entry of a member page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatMember {
    pub member_id: MemberSender,
    /// 0 when the inviter is unknown.
    pub inviter_user_id: i64,
    pub status: MemberStatus,
}

/// Server-side filter for a member listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberFilter {
    /// Substring search; an empty query matches everyone.
    Search { query: String },
}

impl MemberFilter {
    pub fn match_all() -> Self {
        Self::Search {
            query: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemberPage {
    pub members: Vec<ChatMember>,
    /// Approximate total reported by the service. Informational only; never used to advance the
    /// cursor or to decide termination.
    pub total_count: Option<u32>,
}

/// Hexagonal port for the chat membership service.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Resolve a chat id to its kind. Fails with `ChatNotFound` for unknown chats.
    async fn resolve(&self, chat_id: ChatId) -> Result<ResolvedChat>;

    /// Fetch one page of members. `offset = None` means "from the start".
    async fn list_members(
        &self,
        group_id: SupergroupId,
        filter: &MemberFilter,
        limit: u32,
        offset: Option<u32>,
    ) -> Result<MemberPage>;
}
