//! Pagination driver for supergroup member listings.
//!
//! The service pages by offset and never says "done": an empty page is the only end marker.
//! The cursor advances by what was actually received, not by the requested limit, so a short
//! (or oversized) page cannot skip or repeat entries.

use std::collections::HashSet;

use crate::{
    chat::{ChatService, MemberFilter, ResolvedChat},
    domain::{ChatId, SupergroupId},
    errors::Error,
    members::{normalize, MemberRecord},
    Result,
};

/// Client-side pagination cursor. `None` means "start from the beginning".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageCursor {
    offset: Option<u32>,
}

impl PageCursor {
    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    fn advance(&mut self, received: usize) {
        let step = u32::try_from(received).unwrap_or(u32::MAX);
        self.offset = Some(self.offset.unwrap_or(0).saturating_add(step));
    }
}

/// Result of driving an enumeration to exhaustion.
#[derive(Clone, Debug)]
pub struct Enumerated {
    pub chat: ResolvedChat,
    pub members: Vec<MemberRecord>,
    /// Non-empty pages fetched.
    pub pages: usize,
    pub cursor: PageCursor,
}

/// One in-flight member enumeration.
///
/// Finite and non-restartable: once the terminating empty page (or an error) has been seen,
/// `next_page` keeps returning `Ok(None)`.
pub struct MemberEnumeration<'a> {
    chats: &'a dyn ChatService,
    chat: ResolvedChat,
    group_id: SupergroupId,
    filter: MemberFilter,
    page_size: u32,
    cursor: PageCursor,
    seen: HashSet<i64>,
    pages: usize,
    done: bool,
}

impl<'a> MemberEnumeration<'a> {
    /// Resolve `chat_id` and prepare an enumeration. Fails with `NotASupergroup` for any other
    /// chat kind.
    pub async fn start(
        chats: &'a dyn ChatService,
        chat_id: ChatId,
        page_size: u32,
    ) -> Result<MemberEnumeration<'a>> {
        let chat = chats.resolve(chat_id).await?;
        let Some(group_id) = chat.supergroup_id() else {
            return Err(Error::NotASupergroup { chat_id });
        };

        Ok(Self {
            chats,
            chat,
            group_id,
            filter: MemberFilter::match_all(),
            page_size: page_size.max(1),
            cursor: PageCursor::default(),
            seen: HashSet::new(),
            pages: 0,
            done: false,
        })
    }

    pub fn chat(&self) -> &ResolvedChat {
        &self.chat
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    /// Fetch the next page and return the records it contributed (possibly empty when every
    /// entry was filtered out). `Ok(None)` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<MemberRecord>>> {
        if self.done {
            return Ok(None);
        }

        let page = match self
            .chats
            .list_members(
                self.group_id,
                &self.filter,
                self.page_size,
                self.cursor.offset(),
            )
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        let received = page.members.len();
        if received == 0 {
            self.done = true;
            return Ok(None);
        }

        self.cursor.advance(received);
        self.pages += 1;

        let mut kept = Vec::with_capacity(received);
        for entry in &page.members {
            let Some(record) = normalize(entry) else {
                continue;
            };
            if self.seen.insert(record.user_id) {
                kept.push(record);
            }
        }

        tracing::debug!(
            chat_id = self.chat.chat_id.0,
            page = self.pages,
            received,
            kept = kept.len(),
            offset = self.cursor.offset().unwrap_or(0),
            total = page.total_count,
            "fetched member page"
        );

        Ok(Some(kept))
    }

    /// Drive the enumeration to exhaustion. Any page failure fails the whole run.
    pub async fn collect(mut self) -> Result<Enumerated> {
        let mut members = Vec::new();
        while let Some(batch) = self.next_page().await? {
            members.extend(batch);
        }

        Ok(Enumerated {
            chat: self.chat,
            members,
            pages: self.pages,
            cursor: self.cursor,
        })
    }
}

/// Resolve `chat_id` and enumerate all of its plain user members.
pub async fn enumerate_members(
    chats: &dyn ChatService,
    chat_id: ChatId,
    page_size: u32,
) -> Result<Enumerated> {
    MemberEnumeration::start(chats, chat_id, page_size)
        .await?
        .collect()
        .await
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::chat::{ChatKind, MemberStatus};
    use crate::domain::UserId;

    const CHAT: ChatId = ChatId(-100_900);

    #[tokio::test]
    async fn counts_members_and_advances_by_received_entries() {
        // Pages [2, 2, 1, 0]; entry #3 is a channel sender.
        let svc = FakeChatService::supergroup(vec![
            Ok(vec![user(1, 10), user(2, 10)]),
            Ok(vec![channel_sender(-100_5), user(4, 0)]),
            Ok(vec![user(5, 1)]),
            Ok(vec![]),
        ]);

        let out = enumerate_members(&svc, CHAT, 2).await.unwrap();

        assert_eq!(out.members.len(), 4);
        assert_eq!(
            out.members.iter().map(|m| m.user_id).collect::<Vec<_>>(),
            vec![1, 2, 4, 5]
        );
        assert_eq!(out.cursor.offset(), Some(5));
        assert_eq!(out.pages, 3);
        assert_eq!(svc.offsets(), vec![None, Some(2), Some(4), Some(5)]);
    }

    #[tokio::test]
    async fn requests_match_all_filter_with_fixed_limit() {
        let svc = FakeChatService::supergroup(vec![Ok(vec![user(1, 0)]), Ok(vec![])]);
        enumerate_members(&svc, CHAT, 200).await.unwrap();

        let reqs = svc.requests.lock().unwrap().clone();
        assert_eq!(reqs.len(), 2);
        for (group, filter, limit, _) in reqs {
            assert_eq!(group, SupergroupId(900));
            assert_eq!(filter, MemberFilter::match_all());
            assert_eq!(limit, 200);
        }
    }

    #[tokio::test]
    async fn oversized_page_advances_by_actual_length() {
        let svc = FakeChatService::supergroup(vec![
            Ok(vec![user(1, 0), user(2, 0), user(3, 0)]),
            Ok(vec![]),
        ]);

        let out = enumerate_members(&svc, CHAT, 2).await.unwrap();
        assert_eq!(out.members.len(), 3);
        assert_eq!(svc.offsets(), vec![None, Some(3)]);
    }

    #[tokio::test]
    async fn skips_non_members_and_duplicates() {
        let svc = FakeChatService::supergroup(vec![
            Ok(vec![
                with_status(user(1, 0), MemberStatus::Creator),
                user(2, 1),
                with_status(user(3, 0), MemberStatus::Banned),
            ]),
            // A shifted listing can hand back an entry we already saw.
            Ok(vec![user(2, 1), user(6, 2)]),
            Ok(vec![]),
        ]);

        let out = enumerate_members(&svc, CHAT, 3).await.unwrap();
        assert_eq!(
            out.members.iter().map(|m| m.user_id).collect::<Vec<_>>(),
            vec![2, 6]
        );
        assert_eq!(out.cursor.offset(), Some(5));
    }

    #[tokio::test]
    async fn page_with_only_filtered_entries_does_not_end_the_listing() {
        let svc = FakeChatService::supergroup(vec![
            Ok(vec![user(1, 0), user(2, 1)]),
            Ok(vec![
                with_status(user(3, 0), MemberStatus::Administrator),
                channel_sender(4),
            ]),
            Ok(vec![user(5, 2)]),
            Ok(vec![]),
        ]);

        let mut run = MemberEnumeration::start(&svc, CHAT, 2).await.unwrap();
        assert_eq!(run.next_page().await.unwrap().map(|b| b.len()), Some(2));
        // Contributes nothing but still counts as received entries.
        assert_eq!(run.next_page().await.unwrap(), Some(vec![]));
        assert_eq!(run.cursor().offset(), Some(4));

        let out = run.collect().await.unwrap();
        assert_eq!(
            out.members.iter().map(|m| m.user_id).collect::<Vec<_>>(),
            vec![5]
        );
        assert_eq!(out.cursor.offset(), Some(5));
        assert_eq!(svc.request_count(), 4);
        assert_eq!(svc.offsets(), vec![None, Some(2), Some(4), Some(5)]);
    }

    #[tokio::test]
    async fn empty_group_yields_no_records() {
        let svc = FakeChatService::supergroup(vec![Ok(vec![])]);
        let out = enumerate_members(&svc, CHAT, 50).await.unwrap();
        assert!(out.members.is_empty());
        assert_eq!(out.cursor.offset(), None);
        assert_eq!(out.pages, 0);
    }

    #[tokio::test]
    async fn rejects_non_supergroups_without_listing() {
        for kind in [
            ChatKind::Private {
                user_id: UserId(5),
            },
            ChatKind::BasicGroup { basic_group_id: 9 },
            ChatKind::Secret { secret_chat_id: 3 },
        ] {
            let svc = FakeChatService::with_kind(kind);
            let err = enumerate_members(&svc, CHAT, 10).await.unwrap_err();
            assert!(matches!(err, Error::NotASupergroup { chat_id } if chat_id == CHAT));
            assert_eq!(svc.request_count(), 0);
        }
    }

    #[tokio::test]
    async fn mid_enumeration_failure_fails_the_run() {
        let svc = FakeChatService::supergroup(vec![
            Ok(vec![user(1, 0), user(2, 0)]),
            Err("connection reset".to_string()),
            Ok(vec![user(3, 0)]),
            Ok(vec![]),
        ]);

        let err = enumerate_members(&svc, CHAT, 2).await.unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
        // No retry of the failed page, no further pages.
        assert_eq!(svc.request_count(), 2);
    }

    #[tokio::test]
    async fn is_not_restartable_after_exhaustion() {
        let svc = FakeChatService::supergroup(vec![Ok(vec![user(1, 0)]), Ok(vec![])]);
        let mut run = MemberEnumeration::start(&svc, CHAT, 10).await.unwrap();

        assert_eq!(run.next_page().await.unwrap().map(|p| p.len()), Some(1));
        assert!(run.next_page().await.unwrap().is_none());
        assert!(run.next_page().await.unwrap().is_none());
        assert_eq!(svc.request_count(), 2);
        assert_eq!(run.cursor().offset(), Some(1));
    }
}
