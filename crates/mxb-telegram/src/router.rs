use std::{fmt::Debug, future::Future, sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::Message};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mxb_core::{
    domain::{ChatId, MessageId, UserId},
    messaging::types::{IncomingUpdate, Sender, TextMessage},
    supervisor::{run_update_loop, UpdateHandler},
};

/// Poll Telegram and hand every message to `handler` through the core update loop.
///
/// Returns once `shutdown` fires (or polling stops) and the update loop has finished.
pub async fn run_polling(
    bot: Bot,
    handler: Arc<dyn UpdateHandler>,
    queue_capacity: usize,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => tracing::info!(user_id = me.id.0, username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "getMe failed"),
    }

    let (tx, rx) = mpsc::channel::<IncomingUpdate>(queue_capacity.max(1));
    let update_loop = tokio::spawn(run_update_loop(handler, rx, shutdown.clone()));

    let endpoint = dptree::entry().branch(Update::filter_message().endpoint(forward_message));
    let mut dispatcher = Dispatcher::builder(bot, endpoint)
        .dependencies(dptree::deps![tx])
        .build();

    let dispatch_token = dispatcher.shutdown_token();
    let stop = shutdown.clone();
    let stopper = tokio::spawn(async move {
        stop.cancelled().await;
        shutdown_when_running(|| dispatch_token.shutdown()).await;
    });

    dispatcher.dispatch().await;
    stopper.abort();
    // Dropping the dispatcher drops the last sender, which lets the loop drain and return.
    drop(dispatcher);

    update_loop.await?;
    Ok(())
}

const SHUTDOWN_RETRY: Duration = Duration::from_millis(50);

/// Keep requesting shutdown until the dispatcher accepts it, then wait for it to stop.
///
/// A dispatcher that has not started polling yet reports itself idle and ignores the request.
async fn shutdown_when_running<F, E>(mut request: impl FnMut() -> Result<F, E>)
where
    F: Future<Output = ()>,
    E: Debug,
{
    let mut refused = 0u32;
    loop {
        match request() {
            Ok(done) => {
                done.await;
                return;
            }
            Err(e) => {
                refused += 1;
                if refused == 1 {
                    tracing::debug!(error = ?e, "dispatcher idle; retrying shutdown");
                }
                tokio::time::sleep(SHUTDOWN_RETRY).await;
            }
        }
    }
}

async fn forward_message(msg: Message, tx: mpsc::Sender<IncomingUpdate>) -> ResponseResult<()> {
    if tx.send(to_incoming(&msg)).await.is_err() {
        tracing::warn!(chat_id = msg.chat.id.0, "update loop closed; dropping message");
    }
    Ok(())
}

fn to_incoming(msg: &Message) -> IncomingUpdate {
    let chat_id = ChatId(msg.chat.id.0);

    let Some(text) = msg.text() else {
        return IncomingUpdate::Other {
            chat_id,
            kind: message_kind(msg).to_string(),
        };
    };

    // Anonymous admins and channels carry `sender_chat`; `from` is then a placeholder bot.
    let sender = match (msg.sender_chat(), msg.from()) {
        (Some(chat), _) => Sender::Chat(ChatId(chat.id.0)),
        (None, Some(user)) => Sender::User(UserId(user.id.0 as i64)),
        (None, None) => Sender::Unknown,
    };

    IncomingUpdate::Text(TextMessage {
        chat_id,
        message_id: MessageId(msg.id.0),
        sender,
        text: text.to_string(),
    })
}

fn message_kind(msg: &Message) -> &'static str {
    if msg.photo().is_some() {
        "photo"
    } else if msg.document().is_some() {
        "document"
    } else if msg.sticker().is_some() {
        "sticker"
    } else if msg.new_chat_members().is_some() {
        "new_chat_members"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(extra: serde_json::Value) -> Message {
        let mut v = serde_json::json!({
            "message_id": 17,
            "date": 1_700_000_000,
            "chat": { "id": -1001234, "type": "supergroup", "title": "Rustaceans" },
            "from": { "id": 42, "is_bot": false, "first_name": "Ada" }
        });
        if let (Some(base), Some(extra)) = (v.as_object_mut(), extra.as_object()) {
            for (k, val) in extra {
                base.insert(k.clone(), val.clone());
            }
        }
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn maps_user_text_message() {
        let msg = message(serde_json::json!({ "text": "/export" }));
        assert_eq!(
            to_incoming(&msg),
            IncomingUpdate::Text(TextMessage {
                chat_id: ChatId(-1001234),
                message_id: MessageId(17),
                sender: Sender::User(UserId(42)),
                text: "/export".to_string(),
            })
        );
    }

    #[test]
    fn anonymous_admin_is_a_chat_sender() {
        let msg = message(serde_json::json!({
            "text": "/export",
            "sender_chat": { "id": -1001234, "type": "supergroup", "title": "Rustaceans" }
        }));
        let IncomingUpdate::Text(text) = to_incoming(&msg) else {
            panic!("expected text update");
        };
        assert_eq!(text.sender, Sender::Chat(ChatId(-1001234)));
    }

    #[tokio::test]
    async fn shutdown_is_retried_until_the_dispatcher_runs() {
        let attempts = std::sync::atomic::AtomicUsize::new(0);
        let stopped = std::sync::atomic::AtomicBool::new(false);

        tokio::time::timeout(
            Duration::from_secs(1),
            shutdown_when_running(|| {
                let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n < 2 {
                    Err("idle")
                } else {
                    Ok(async {
                        stopped.store(true, std::sync::atomic::Ordering::SeqCst);
                    })
                }
            }),
        )
        .await
        .unwrap();

        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(stopped.load(std::sync::atomic::Ordering::SeqCst));
    }
}
