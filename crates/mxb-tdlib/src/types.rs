//! The subset of TDLib's JSON objects the exporter reads.
//!
//! Objects are tagged with `@type`; fields we do not need are ignored.

use serde::Deserialize;

use mxb_core::{
    chat::{ChatKind, ChatMember, MemberPage, MemberSender, MemberStatus, ResolvedChat},
    domain::{ChatId, SupergroupId, UserId},
};

#[derive(Clone, Debug, Deserialize)]
pub struct TdError {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TdUser {
    pub id: i64,
}

impl TdUser {
    pub fn user_id(&self) -> UserId {
        UserId(self.id)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TdChat {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub kind: TdChatType,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum TdChatType {
    ChatTypePrivate {
        user_id: i64,
    },
    ChatTypeBasicGroup {
        basic_group_id: i64,
    },
    ChatTypeSupergroup {
        supergroup_id: i64,
        #[serde(default)]
        is_channel: bool,
    },
    ChatTypeSecret {
        secret_chat_id: i64,
    },
}

impl TdChat {
    pub fn into_resolved(self) -> ResolvedChat {
        let kind = match self.kind {
            TdChatType::ChatTypePrivate { user_id } => ChatKind::Private {
                user_id: UserId(user_id),
            },
            TdChatType::ChatTypeBasicGroup { basic_group_id } => {
                ChatKind::BasicGroup { basic_group_id }
            }
            TdChatType::ChatTypeSupergroup {
                supergroup_id,
                is_channel,
            } => ChatKind::Supergroup {
                supergroup_id: SupergroupId(supergroup_id),
                is_channel,
            },
            TdChatType::ChatTypeSecret { secret_chat_id } => ChatKind::Secret { secret_chat_id },
        };

        ResolvedChat {
            chat_id: ChatId(self.id),
            title: self.title,
            kind,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TdChatMembers {
    #[serde(default)]
    pub total_count: Option<u32>,
    #[serde(default)]
    pub members: Vec<TdChatMember>,
}

impl TdChatMembers {
    pub fn into_page(self) -> MemberPage {
        MemberPage {
            members: self.members.into_iter().map(TdChatMember::into_member).collect(),
            total_count: self.total_count,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TdChatMember {
    pub member_id: TdMessageSender,
    /// Absent or 0 when unknown.
    #[serde(default)]
    pub inviter_user_id: i64,
    pub status: TdChatMemberStatus,
}

impl TdChatMember {
    fn into_member(self) -> ChatMember {
        let member_id = match self.member_id {
            TdMessageSender::MessageSenderUser { user_id } => MemberSender::User {
                user_id: UserId(user_id),
            },
            TdMessageSender::MessageSenderChat { chat_id } => MemberSender::Chat {
                chat_id: ChatId(chat_id),
            },
        };
        let status = match self.status {
            TdChatMemberStatus::ChatMemberStatusCreator {} => MemberStatus::Creator,
            TdChatMemberStatus::ChatMemberStatusAdministrator {} => MemberStatus::Administrator,
            TdChatMemberStatus::ChatMemberStatusMember {} => MemberStatus::Member,
            TdChatMemberStatus::ChatMemberStatusRestricted {} => MemberStatus::Restricted,
            TdChatMemberStatus::ChatMemberStatusLeft {} => MemberStatus::Left,
            TdChatMemberStatus::ChatMemberStatusBanned {} => MemberStatus::Banned,
        };

        ChatMember {
            member_id,
            inviter_user_id: self.inviter_user_id,
            status,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum TdMessageSender {
    MessageSenderUser { user_id: i64 },
    MessageSenderChat { chat_id: i64 },
}

// Status payloads (rights, titles, until-dates) are not needed; only the tag is.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum TdChatMemberStatus {
    ChatMemberStatusCreator {},
    ChatMemberStatusAdministrator {},
    ChatMemberStatusMember {},
    ChatMemberStatusRestricted {},
    ChatMemberStatusLeft {},
    ChatMemberStatusBanned {},
}
