use serde::{Deserialize, Serialize};

use crate::chat::{ChatMember, MemberSender, MemberStatus};

/// One confirmed human member at export time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub user_id: i64,
    pub invited_by_user_id: i64,
}

/// Reduce a raw page entry to a `MemberRecord`.
///
/// Only plain active members that are users are kept. Chat senders, creators, administrators,
/// restricted, left and banned entries are skipped.
pub fn normalize(entry: &ChatMember) -> Option<MemberRecord> {
    let MemberSender::User { user_id } = entry.member_id else {
        return None;
    };
    if entry.status != MemberStatus::Member {
        return None;
    }

    Some(MemberRecord {
        user_id: user_id.0,
        invited_by_user_id: entry.inviter_user_id,
    })
}
