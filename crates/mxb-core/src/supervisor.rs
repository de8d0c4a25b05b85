//! Inbound update loop.
//!
//! Updates arrive on one ordered channel. Chats are handled concurrently so a long export in one
//! chat does not hold up others, while updates for the same chat run strictly in arrival order.
//! A handler error or panic is logged and the loop moves on to the next update.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::{
    sync::mpsc,
    task::{JoinError, JoinSet},
};
use tokio_util::{sync::CancellationToken, task::AbortOnDropHandle};

use crate::{domain::ChatId, messaging::types::IncomingUpdate, Result};

#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    async fn handle(&self, update: IncomingUpdate) -> Result<()>;
}

type Finished = (ChatId, std::result::Result<Result<()>, JoinError>);

/// Per-chat serialization of handler calls.
///
/// A chat has an entry in `pending` only while one of its updates is in flight, so idle chats
/// hold no state.
struct ChatQueues {
    handler: Arc<dyn UpdateHandler>,
    pending: HashMap<ChatId, VecDeque<IncomingUpdate>>,
    tasks: JoinSet<Finished>,
}

impl ChatQueues {
    fn new(handler: Arc<dyn UpdateHandler>) -> Self {
        Self {
            handler,
            pending: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    fn active_chats(&self) -> usize {
        self.pending.len()
    }

    fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    fn dispatch(&mut self, update: IncomingUpdate) {
        let chat_id = update.chat_id();
        match self.pending.get_mut(&chat_id) {
            Some(queue) => queue.push_back(update),
            None => {
                self.pending.insert(chat_id, VecDeque::new());
                self.spawn(chat_id, update);
            }
        }
    }

    fn spawn(&mut self, chat_id: ChatId, update: IncomingUpdate) {
        let handler = self.handler.clone();
        // Own task per update so a panic stays with that update; dropping the outer task aborts it.
        let call =
            AbortOnDropHandle::new(tokio::spawn(async move { handler.handle(update).await }));
        self.tasks.spawn(async move { (chat_id, call.await) });
    }

    /// Wait for one in-flight update to finish and start the next one queued for its chat.
    ///
    /// Returns `None` when nothing is in flight.
    async fn finish_next(&mut self) -> Option<()> {
        match self.tasks.join_next().await? {
            Ok((chat_id, outcome)) => {
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(chat_id = chat_id.0, error = %e, "update handler failed");
                    }
                    Err(e) => {
                        tracing::error!(chat_id = chat_id.0, error = %e, "update handler panicked");
                    }
                }
                self.advance(chat_id);
            }
            Err(e) => tracing::error!(error = %e, "update task failed"),
        }
        Some(())
    }

    fn advance(&mut self, chat_id: ChatId) {
        match self.pending.get_mut(&chat_id).and_then(VecDeque::pop_front) {
            Some(next) => self.spawn(chat_id, next),
            None => {
                self.pending.remove(&chat_id);
            }
        }
    }

    /// Drop queued updates and abort every in-flight handler.
    async fn shutdown(&mut self) {
        self.pending.clear();
        self.tasks.shutdown().await;
    }
}

/// Consume `updates` until the channel closes or `shutdown` fires.
///
/// On channel close, queued updates are drained before returning. On shutdown, queued updates
/// are dropped and in-flight handlers are aborted.
pub async fn run_update_loop(
    handler: Arc<dyn UpdateHandler>,
    mut updates: mpsc::Receiver<IncomingUpdate>,
    shutdown: CancellationToken,
) {
    let mut queues = ChatQueues::new(handler);
    let mut open = true;

    while open || !queues.is_idle() {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(active_chats = queues.active_chats(), "update loop shutting down");
                queues.shutdown().await;
                return;
            }
            next = updates.recv(), if open => match next {
                Some(update) => queues.dispatch(update),
                None => open = false,
            },
            Some(()) = queues.finish_next() => {}
        }
    }

    tracing::info!("update stream closed");
}
