//! Per-`(worldId, chatId)` inbound-message FIFO (§4.7). One [`MessageQueue`]
//! serializes human chat submissions the way [`crate::registry::WorldRuntime`]'s
//! agent locks serialize an agent's own completion loop: at most one item's full
//! conversation turn is in flight at a time.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::WorldError;
use crate::model;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Drives one inbound message to completion. Implemented by
/// [`crate::orchestrator::Orchestrator`]; kept as a trait so the queue carries no
/// compile-time dependency on the orchestrator's internals.
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        world_id: &str,
        chat_id: &str,
        sender_id: &str,
        sender_is_human: bool,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<(), WorldError>;
}

/// Overall queue state (§4.7: `idle -> running -> paused -> running -> stopped`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Idle,
    Running,
    Paused,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub sender_id: String,
    pub sender_is_human: bool,
    pub content: String,
    pub status: ItemStatus,
    pub attempts: u32,
}

impl QueueItem {
    fn new(sender_id: impl Into<String>, sender_is_human: bool, content: impl Into<String>) -> Self {
        QueueItem {
            id: model::short_id(),
            sender_id: sender_id.into(),
            sender_is_human,
            content: content.into(),
            status: ItemStatus::Pending,
            attempts: 0,
        }
    }
}

/// A persistable snapshot of one chat's queue, keyed by `chatId` in per-client
/// storage (§4.7). `items` with [`ItemStatus::Running`] are reset to
/// [`ItemStatus::Pending`] by [`QueueSnapshot::on_load`] -- a process restart loses
/// whatever was in flight, so it is resubmitted rather than treated as done.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueSnapshot {
    pub chat_id: String,
    pub state: QueueState,
    pub items: Vec<QueueItem>,
}

impl QueueSnapshot {
    pub fn on_load(mut self) -> Self {
        for item in &mut self.items {
            if item.status == ItemStatus::Running {
                item.status = ItemStatus::Pending;
            }
        }
        if self.state == QueueState::Running {
            self.state = QueueState::Paused;
        }
        self
    }
}

struct Inner {
    state: QueueState,
    items: VecDeque<QueueItem>,
    current: Option<QueueItem>,
    editing: HashSet<String>,
}

/// The FIFO for one `(worldId, chatId)` pair, with a background worker task that
/// dispatches items one at a time while `state == Running`.
pub struct MessageQueue {
    world_id: String,
    chat_id: String,
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    current_cancel: Arc<Mutex<Option<CancellationToken>>>,
    _worker: tokio::task::JoinHandle<()>,
}

impl MessageQueue {
    pub fn new(world_id: impl Into<String>, chat_id: impl Into<String>, dispatcher: Arc<dyn MessageDispatcher>) -> Self {
        Self::with_initial(world_id, chat_id, dispatcher, QueueState::Idle, VecDeque::new())
    }

    /// Rehydrates a queue from a persisted [`QueueSnapshot`] (§4.7: items left
    /// `running` by a prior process are reset to `pending` before dispatch resumes).
    pub fn restore(world_id: impl Into<String>, chat_id: impl Into<String>, dispatcher: Arc<dyn MessageDispatcher>, snapshot: QueueSnapshot) -> Self {
        let snapshot = snapshot.on_load();
        Self::with_initial(world_id, chat_id, dispatcher, snapshot.state, snapshot.items.into())
    }

    fn with_initial(
        world_id: impl Into<String>,
        chat_id: impl Into<String>,
        dispatcher: Arc<dyn MessageDispatcher>,
        state: QueueState,
        items: VecDeque<QueueItem>,
    ) -> Self {
        let world_id = world_id.into();
        let chat_id = chat_id.into();
        let inner = Arc::new(Mutex::new(Inner { state, items, current: None, editing: HashSet::new() }));
        let notify = Arc::new(Notify::new());
        let current_cancel = Arc::new(Mutex::new(None));

        let worker = tokio::spawn(run_worker(world_id.clone(), chat_id.clone(), dispatcher, inner.clone(), notify.clone(), current_cancel.clone()));
        notify.notify_one();

        MessageQueue { world_id, chat_id, inner, notify, current_cancel, _worker: worker }
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let guard = self.inner.lock().await;
        let mut items: Vec<QueueItem> = guard.current.clone().into_iter().collect();
        items.extend(guard.items.iter().cloned());
        QueueSnapshot { chat_id: self.chat_id.clone(), state: guard.state, items }
    }

    /// Enqueues a pending human message, starting the worker if it was idle.
    pub async fn enqueue(&self, sender_id: impl Into<String>, sender_is_human: bool, content: impl Into<String>) -> String {
        let item = QueueItem::new(sender_id, sender_is_human, content);
        let id = item.id.clone();
        let mut guard = self.inner.lock().await;
        guard.items.push_back(item);
        if guard.state == QueueState::Idle {
            guard.state = QueueState::Running;
        }
        drop(guard);
        self.notify.notify_one();
        id
    }

    /// Completes the current item, then does not start the next (§4.7 `pause`).
    pub async fn pause(&self) {
        let mut guard = self.inner.lock().await;
        if guard.state == QueueState::Running {
            guard.state = QueueState::Paused;
        }
    }

    /// Resumes dispatching from a paused state.
    pub async fn resume(&self) {
        let mut guard = self.inner.lock().await;
        if guard.state == QueueState::Paused {
            guard.state = QueueState::Running;
        }
        drop(guard);
        self.notify.notify_one();
    }

    /// Aborts the in-flight item via its cancellation token (stopping both the LLM
    /// call and any shell tool call it started) and discards everything queued
    /// behind it (§4.7 `stop`).
    pub async fn stop(&self) {
        if let Some(cancel) = self.current_cancel.lock().await.take() {
            cancel.cancel();
        }
        let mut guard = self.inner.lock().await;
        guard.items.clear();
        guard.state = QueueState::Stopped;
    }

    /// Clears pending items without cancelling whatever is currently dispatching
    /// (§4.7 `discard`).
    pub async fn discard(&self) {
        let mut guard = self.inner.lock().await;
        guard.items.clear();
    }

    /// Marks `item_id` as being edited; if the worker reaches it before
    /// [`Self::commit_edit`] is called, it pauses instead of dispatching it
    /// (§4.7 `edit`: "auto-pauses if dispatcher reaches an item in edit mode").
    pub async fn begin_edit(&self, item_id: &str) {
        self.inner.lock().await.editing.insert(item_id.to_string());
    }

    /// Applies an edited message body and clears the edit-in-progress flag.
    pub async fn commit_edit(&self, item_id: &str, content: impl Into<String>) {
        let mut guard = self.inner.lock().await;
        guard.editing.remove(item_id);
        if let Some(item) = guard.items.iter_mut().find(|i| i.id == item_id) {
            item.content = content.into();
        }
        drop(guard);
        self.notify.notify_one();
    }

    /// Removes a still-pending item (not yet dispatched).
    pub async fn delete(&self, item_id: &str) {
        let mut guard = self.inner.lock().await;
        guard.items.retain(|i| i.id != item_id);
        guard.editing.remove(item_id);
    }

    /// Error-state affordance: clears attempts on the failed front item and resumes.
    pub async fn retry(&self) {
        let mut guard = self.inner.lock().await;
        if guard.state != QueueState::Error {
            return;
        }
        if let Some(item) = guard.items.front_mut() {
            item.attempts = 0;
            item.status = ItemStatus::Pending;
        }
        guard.state = QueueState::Running;
        drop(guard);
        self.notify.notify_one();
    }

    /// Error-state affordance: drops the failed front item and resumes.
    pub async fn skip(&self) {
        let mut guard = self.inner.lock().await;
        if guard.state != QueueState::Error {
            return;
        }
        guard.items.pop_front();
        guard.state = QueueState::Running;
        drop(guard);
        self.notify.notify_one();
    }

    pub async fn state(&self) -> QueueState {
        self.inner.lock().await.state
    }
}

async fn run_worker(
    world_id: String,
    chat_id: String,
    dispatcher: Arc<dyn MessageDispatcher>,
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    current_cancel: Arc<Mutex<Option<CancellationToken>>>,
) {
    loop {
        let next = {
            let mut guard = inner.lock().await;
            if guard.state != QueueState::Running {
                None
            } else if let Some(front) = guard.items.front() {
                if guard.editing.contains(&front.id) {
                    guard.state = QueueState::Paused;
                    None
                } else {
                    let mut item = guard.items.pop_front().expect("front just checked");
                    item.status = ItemStatus::Running;
                    item.attempts += 1;
                    guard.current = Some(item.clone());
                    Some(item)
                }
            } else {
                None
            }
        };

        let Some(item) = next else {
            notify.notified().await;
            continue;
        };

        let cancel = CancellationToken::new();
        *current_cancel.lock().await = Some(cancel.clone());

        let result = dispatcher
            .dispatch(&world_id, &chat_id, &item.sender_id, item.sender_is_human, &item.content, cancel.clone())
            .await;

        *current_cancel.lock().await = None;
        let mut guard = inner.lock().await;
        guard.current = None;

        if cancel.is_cancelled() {
            // `stop()` already cleared `items` and set state to `Stopped`.
            continue;
        }

        match result {
            Ok(()) => {
                // Item completes its full conversation turn inside `dispatch`
                // (including any recursive `@mention` continuations), so by the
                // time we get here the queue's single in-flight slot is free and
                // the next item -- if any -- may start.
                continue;
            }
            Err(e) => {
                if item.attempts >= MAX_ATTEMPTS {
                    warn!(world_id, chat_id, item_id = %item.id, attempts = item.attempts, error = %e, "message dispatch failed after max retries");
                    let mut failed = item;
                    failed.status = ItemStatus::Failed;
                    guard.items.push_front(failed);
                    guard.state = QueueState::Error;
                } else {
                    let backoff = BACKOFF_BASE * 2u32.pow(item.attempts - 1);
                    warn!(world_id, chat_id, item_id = %item.id, attempts = item.attempts, backoff_ms = backoff.as_millis() as u64, error = %e, "retrying message dispatch after backoff");
                    guard.items.push_front(item);
                    drop(guard);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Lazily creates and retains one [`MessageQueue`] per `(worldId, chatId)`.
#[derive(Default)]
pub struct QueueManager {
    queues: Mutex<std::collections::HashMap<(String, String), Arc<MessageQueue>>>,
}

impl QueueManager {
    pub fn new() -> Self {
        QueueManager::default()
    }

    pub async fn get_or_create(&self, world_id: &str, chat_id: &str, dispatcher: Arc<dyn MessageDispatcher>) -> Arc<MessageQueue> {
        let mut guard = self.queues.lock().await;
        guard
            .entry((world_id.to_string(), chat_id.to_string()))
            .or_insert_with(|| Arc::new(MessageQueue::new(world_id, chat_id, dispatcher)))
            .clone()
    }

    pub async fn get(&self, world_id: &str, chat_id: &str) -> Option<Arc<MessageQueue>> {
        self.queues.lock().await.get(&(world_id.to_string(), chat_id.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct RecordingDispatcher {
        seen: Mutex<Vec<String>>,
        fail_first_n: AtomicU32,
    }

    #[async_trait]
    impl MessageDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            _world_id: &str,
            _chat_id: &str,
            _sender_id: &str,
            _sender_is_human: bool,
            content: &str,
            cancel: CancellationToken,
        ) -> Result<(), WorldError> {
            if cancel.is_cancelled() {
                return Err(WorldError::Cancelled);
            }
            if self.fail_first_n.load(Ordering::SeqCst) > 0 {
                self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
                return Err(WorldError::Fatal("transient".to_string()));
            }
            self.seen.lock().await.push(content.to_string());
            Ok(())
        }
    }

    async fn wait_for_seen_len(dispatcher: &RecordingDispatcher, n: usize) {
        for _ in 0..200 {
            if dispatcher.seen.lock().await.len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("dispatcher never saw {n} items");
    }

    async fn wait_for_state(queue: &MessageQueue, state: QueueState) {
        for _ in 0..200 {
            if queue.state().await == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue never reached {state:?}");
    }

    #[tokio::test]
    async fn dispatches_items_in_order() {
        let dispatcher = Arc::new(RecordingDispatcher { seen: Mutex::new(Vec::new()), fail_first_n: AtomicU32::new(0) });
        let queue = MessageQueue::new("w1", "c1", dispatcher.clone());
        queue.enqueue("user", true, "first").await;
        queue.enqueue("user", true, "second").await;

        wait_for_seen_len(&dispatcher, 2).await;
        let seen = dispatcher.seen.lock().await;
        assert_eq!(*seen, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn retries_then_succeeds_within_budget() {
        let dispatcher = Arc::new(RecordingDispatcher { seen: Mutex::new(Vec::new()), fail_first_n: AtomicU32::new(2) });
        let queue = MessageQueue::new("w1", "c1", dispatcher.clone());
        queue.enqueue("user", true, "flaky").await;

        wait_for_seen_len(&dispatcher, 1).await;
        assert_eq!(queue.state().await, QueueState::Running);
    }

    #[tokio::test]
    async fn exhausting_retries_enters_error_state_with_retry_affordance() {
        let dispatcher = Arc::new(RecordingDispatcher { seen: Mutex::new(Vec::new()), fail_first_n: AtomicU32::new(10) });
        let queue = MessageQueue::new("w1", "c1", dispatcher.clone());
        queue.enqueue("user", true, "always fails").await;

        wait_for_state(&queue, QueueState::Error).await;

        dispatcher.fail_first_n.store(0, Ordering::SeqCst);
        queue.retry().await;
        wait_for_seen_len(&dispatcher, 1).await;
    }

    #[tokio::test]
    async fn stop_cancels_in_flight_and_clears_backlog() {
        struct BlockingDispatcher;
        #[async_trait]
        impl MessageDispatcher for BlockingDispatcher {
            async fn dispatch(
                &self,
                _world_id: &str,
                _chat_id: &str,
                _sender_id: &str,
                _sender_is_human: bool,
                _content: &str,
                cancel: CancellationToken,
            ) -> Result<(), WorldError> {
                cancel.cancelled().await;
                Err(WorldError::Cancelled)
            }
        }
        let queue = MessageQueue::new("w1", "c1", Arc::new(BlockingDispatcher));
        queue.enqueue("user", true, "first").await;
        queue.enqueue("user", true, "second").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.stop().await;
        wait_for_state(&queue, QueueState::Stopped).await;
        let snapshot = queue.snapshot().await;
        assert!(snapshot.items.is_empty());
    }
}
