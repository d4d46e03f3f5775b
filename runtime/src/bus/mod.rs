//! Per-world event bus (§4.1). Each loaded World owns exactly one `EventBus`; it is
//! the sole sequencer serializing persistence and subscriber notification so that
//! `seq` order and delivery order always agree (§5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::error::WorldError;
use crate::storage::{EventFilter, Storage};
use stream_event::{Channel, Envelope, WireEvent};

/// A one-shot subscription token. Reuse after `unsubscribe` is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscriber {
    handle: SubscriptionHandle,
    chat_id: Option<String>,
    sender: mpsc::UnboundedSender<WireEvent>,
}

/// One loaded World's event sequencer and fan-out point.
pub struct EventBus {
    world_id: String,
    storage: Arc<dyn Storage>,
    next_handle: AtomicU64,
    /// Serializes `append_event` + subscriber notification so delivery order always
    /// matches persisted `seq` order (§4.1 invariant), and so `subscribe`'s replay
    /// snapshot never races a concurrent publish.
    sequencer: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new(world_id: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        EventBus {
            world_id: world_id.into(),
            storage,
            next_handle: AtomicU64::new(1),
            sequencer: Mutex::new(Vec::new()),
        }
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    /// Persists the event, then notifies all subscribers in registration order.
    /// A failing subscriber channel (receiver dropped) is pruned silently and does
    /// not affect delivery to other subscribers (§4.1).
    pub async fn publish(
        &self,
        channel: Channel,
        chat_id: Option<String>,
        payload: serde_json::Value,
        meta: serde_json::Value,
    ) -> Result<u64, WorldError> {
        let mut subs = self.sequencer.lock().await;

        let event = self
            .storage
            .append_event(&self.world_id, chat_id.clone(), channel, payload.clone(), meta.clone())
            .await?;

        let envelope = Envelope::new(
            event.seq,
            self.world_id.clone(),
            chat_id.clone(),
            event.created_at.timestamp_millis(),
        );
        let wire = WireEvent::new(channel, envelope, payload).with_meta(meta);

        subs.retain(|s| {
            let matches_chat = match (&s.chat_id, &chat_id) {
                (Some(want), Some(have)) => want == have,
                (Some(_), None) => false,
                (None, _) => true,
            };
            if !matches_chat {
                return true;
            }
            match s.sender.send(wire.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!(world_id = %self.world_id, "dropping detached subscriber");
                    false
                }
            }
        });

        debug!(world_id = %self.world_id, seq = event.seq, channel = %channel, "published event");
        Ok(event.seq)
    }

    /// Replays events with `seq > since_seq` (optionally filtered by `chat_id`), then
    /// attaches a live subscriber. The returned receiver observes replay and live
    /// events with no reordering and no gap, because registration happens under the
    /// same lock that serializes `publish`.
    pub async fn subscribe(
        &self,
        since_seq: u64,
        chat_id: Option<String>,
    ) -> Result<(SubscriptionHandle, mpsc::UnboundedReceiver<WireEvent>), WorldError> {
        let mut subs = self.sequencer.lock().await;

        let filter = EventFilter {
            chat_id: chat_id.clone(),
            channel: None,
        };
        let backlog = self.storage.read_events(&self.world_id, since_seq, filter).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        for event in backlog {
            let envelope = Envelope::new(
                event.seq,
                event.world_id.clone(),
                event.chat_id.clone(),
                event.created_at.timestamp_millis(),
            );
            let wire = WireEvent::new(event.channel, envelope, event.payload).with_meta(event.meta);
            if tx.send(wire).is_err() {
                warn!(world_id = %self.world_id, "subscriber dropped during replay");
                break;
            }
        }

        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        subs.push(Subscriber {
            handle,
            chat_id,
            sender: tx,
        });

        Ok((handle, rx))
    }

    /// Detaches a subscriber. Reusing `handle` afterward is a no-op (one-shot token,
    /// §4.1).
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut subs = self.sequencer.lock().await;
        subs.retain(|s| s.handle != handle);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.sequencer.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests_support::InMemoryStorage;

    fn bus() -> EventBus {
        EventBus::new("w1", Arc::new(InMemoryStorage::default()))
    }

    #[tokio::test]
    async fn publish_assigns_gap_free_monotonic_seq() {
        let bus = bus();
        let s1 = bus
            .publish(Channel::Message, None, serde_json::json!({"n": 1}), serde_json::json!({}))
            .await
            .unwrap();
        let s2 = bus
            .publish(Channel::Message, None, serde_json::json!({"n": 2}), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(s1, 1);
        assert_eq!(s2, 2);
    }

    #[tokio::test]
    async fn subscribe_replays_then_delivers_live_in_order() {
        let bus = bus();
        bus.publish(Channel::Message, None, serde_json::json!({"n": 1}), serde_json::json!({}))
            .await
            .unwrap();
        bus.publish(Channel::Message, None, serde_json::json!({"n": 2}), serde_json::json!({}))
            .await
            .unwrap();

        let (_handle, mut rx) = bus.subscribe(0, None).await.unwrap();
        bus.publish(Channel::Message, None, serde_json::json!({"n": 3}), serde_json::json!({}))
            .await
            .unwrap();

        let mut seqs = Vec::new();
        for _ in 0..3 {
            seqs.push(rx.recv().await.unwrap().envelope.seq);
        }
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn subscribe_since_seq_skips_earlier_events() {
        let bus = bus();
        bus.publish(Channel::Message, None, serde_json::json!({"n": 1}), serde_json::json!({}))
            .await
            .unwrap();
        bus.publish(Channel::Message, None, serde_json::json!({"n": 2}), serde_json::json!({}))
            .await
            .unwrap();

        let (_handle, mut rx) = bus.subscribe(1, None).await.unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.envelope.seq, 2);
    }

    #[tokio::test]
    async fn unsubscribe_is_one_shot() {
        let bus = bus();
        let (handle, _rx) = bus.subscribe(0, None).await.unwrap();
        assert_eq!(bus.subscriber_count().await, 1);
        bus.unsubscribe(handle).await;
        assert_eq!(bus.subscriber_count().await, 0);
        bus.unsubscribe(handle).await;
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn chat_scoped_subscriber_only_receives_matching_chat() {
        let bus = bus();
        let (_h, mut rx) = bus.subscribe(0, Some("c1".to_string())).await.unwrap();
        bus.publish(
            Channel::Message,
            Some("c2".to_string()),
            serde_json::json!({}),
            serde_json::json!({}),
        )
        .await
        .unwrap();
        bus.publish(
            Channel::Message,
            Some("c1".to_string()),
            serde_json::json!({"n": 1}),
            serde_json::json!({}),
        )
        .await
        .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.envelope.chat_id.as_deref(), Some("c1"));
    }
}
