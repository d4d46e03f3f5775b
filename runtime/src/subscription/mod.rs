//! Client-facing subscription lifecycle (§4.8): load-or-reuse the world, attach to
//! its [`EventBus`](crate::bus::EventBus) filtered by `chatId`, replay backlog, then
//! go live. Detach triggers [`WorldRegistry::unload_if_idle`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use stream_event::WireEvent;

use crate::bus::SubscriptionHandle;
use crate::error::WorldError;
use crate::model;
use crate::registry::WorldRegistry;
use crate::storage::Storage;

struct Attachment {
    world_id: String,
    handle: SubscriptionHandle,
}

/// Issues single-use client subscription tokens and binds/unbinds them to a
/// world's event bus.
pub struct SubscriptionManager {
    registry: Arc<WorldRegistry>,
    storage: Arc<dyn Storage>,
    /// Live `token -> (world, bus handle)`. Removing an entry (on `unsubscribe`)
    /// makes the token unknown to any subsequent call, so reuse -- including a
    /// double `unsubscribe` -- is rejected before touching the bus (§4.8 invariant).
    active: Mutex<HashMap<String, Attachment>>,
}

impl SubscriptionManager {
    pub fn new(registry: Arc<WorldRegistry>, storage: Arc<dyn Storage>) -> Self {
        SubscriptionManager { registry, storage, active: Mutex::new(HashMap::new()) }
    }

    /// Loads (or reuses) `world_id`, replays events with `seq > since_seq` filtered
    /// by `chat_id`, then attaches a live subscriber. Returns a fresh single-use
    /// token identifying this attachment, plus the event receiver.
    pub async fn subscribe(
        &self,
        world_id: &str,
        chat_id: Option<String>,
        since_seq: u64,
    ) -> Result<(String, tokio::sync::mpsc::UnboundedReceiver<WireEvent>), WorldError> {
        let runtime = self.registry.load(world_id, self.storage.clone()).await?;
        let (handle, rx) = runtime.bus.subscribe(since_seq, chat_id).await?;

        let token = model::short_id();
        self.active.lock().await.insert(token.clone(), Attachment { world_id: world_id.to_string(), handle });
        Ok((token, rx))
    }

    /// Detaches the subscriber identified by `token`, then unloads its world if no
    /// subscribers remain and no agent is processing (§4.8 step 4). Rejects an
    /// unknown or already-detached token without touching any bus.
    pub async fn unsubscribe(&self, token: &str) -> Result<(), WorldError> {
        let attachment = self
            .active
            .lock()
            .await
            .remove(token)
            .ok_or_else(|| WorldError::Validation(format!("subscription token {token} is unknown or already used")))?;

        if let Some(runtime) = self.registry.get(&attachment.world_id).await {
            runtime.bus.unsubscribe(attachment.handle).await;
            self.registry.unload_if_idle(&attachment.world_id).await;
        }
        Ok(())
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }
}
