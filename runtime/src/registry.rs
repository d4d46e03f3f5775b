//! Runtime-state owner for loaded worlds (§9 redesign note: "model World as a data
//! record plus a separate bus handle owned by a runtime registry keyed by
//! `worldId`"). No field of [`crate::model::World`] references a bus or any other
//! live state; everything mutable at runtime lives here instead.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::bus::EventBus;
use crate::error::WorldError;
use crate::model::World;
use crate::storage::Storage;

/// Live runtime state for one loaded world: its event bus, whether it is currently
/// processing a message, and a per-agent turn counter keyed by chat id.
pub struct WorldRuntime {
    pub world_id: String,
    pub bus: Arc<EventBus>,
    pub is_processing: AtomicBool,
    /// `(chat_id) -> turns taken this session`, per §4.3 step 4.
    turn_counters: Mutex<HashMap<String, u32>>,
    /// Chats that have already had their turn-limit system notice published this
    /// session, so it fires exactly once (§4.3 step 4, spec.md:243) instead of on
    /// every subsequent message once the limit is reached.
    turn_limit_notified: Mutex<HashSet<String>>,
    /// Per-agent in-flight lock, enforcing "at most one in-flight LLM call per
    /// agent" (§4.3 step 5, §8 invariant). Agents lock by id.
    agent_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorldRuntime {
    fn new(world_id: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        let world_id = world_id.into();
        WorldRuntime {
            bus: Arc::new(EventBus::new(world_id.clone(), storage)),
            world_id,
            is_processing: AtomicBool::new(false),
            turn_counters: Mutex::new(HashMap::new()),
            turn_limit_notified: Mutex::new(HashSet::new()),
            agent_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the lock an agent's processing pipeline must hold for the duration of
    /// one LLM call + tool continuation chain.
    pub async fn agent_lock(&self, agent_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.agent_locks.lock().await;
        locks
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Increments the turn counter for `chat_id`, returning the new count.
    pub async fn increment_turn(&self, chat_id: &str) -> u32 {
        let mut counters = self.turn_counters.lock().await;
        let entry = counters.entry(chat_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub async fn turn_count(&self, chat_id: &str) -> u32 {
        *self.turn_counters.lock().await.get(chat_id).unwrap_or(&0)
    }

    /// Resets the turn counter for a chat (e.g. on `new-chat` / `delete-chat`),
    /// re-arming its turn-limit notice for the next session.
    pub async fn reset_turns(&self, chat_id: &str) {
        self.turn_counters.lock().await.remove(chat_id);
        self.turn_limit_notified.lock().await.remove(chat_id);
    }

    /// Records that `chat_id`'s turn-limit notice has been published. Returns
    /// `true` the first time it's called for a chat, `false` on every call after
    /// -- callers publish the notice only when this returns `true`.
    pub async fn mark_turn_limit_notified(&self, chat_id: &str) -> bool {
        self.turn_limit_notified.lock().await.insert(chat_id.to_string())
    }
}

/// Registry of currently-loaded worlds. A world is loaded lazily on first
/// subscription and unloaded when idle (§3 "Ownership & lifecycle").
#[derive(Default)]
pub struct WorldRegistry {
    loaded: RwLock<HashMap<String, Arc<WorldRuntime>>>,
}

impl WorldRegistry {
    pub fn new() -> Self {
        WorldRegistry::default()
    }

    /// Returns the loaded runtime for `world_id`, constructing and inserting one if
    /// absent. `storage` is consulted only to verify the world exists.
    pub async fn load(
        &self,
        world_id: &str,
        storage: Arc<dyn Storage>,
    ) -> Result<Arc<WorldRuntime>, WorldError> {
        if let Some(existing) = self.loaded.read().await.get(world_id) {
            return Ok(existing.clone());
        }

        if storage.get_world(world_id).await?.is_none() {
            return Err(WorldError::NotFound(format!("world {world_id}")));
        }

        let mut loaded = self.loaded.write().await;
        let runtime = loaded
            .entry(world_id.to_string())
            .or_insert_with(|| Arc::new(WorldRuntime::new(world_id, storage)))
            .clone();
        Ok(runtime)
    }

    pub async fn get(&self, world_id: &str) -> Option<Arc<WorldRuntime>> {
        self.loaded.read().await.get(world_id).cloned()
    }

    /// Unloads `world_id` iff no subscribers remain and no agent is processing
    /// (§4.8 step 4). Returns `true` if it was unloaded.
    pub async fn unload_if_idle(&self, world_id: &str) -> bool {
        let should_remove = {
            let loaded = self.loaded.read().await;
            match loaded.get(world_id) {
                Some(runtime) => {
                    !runtime.is_processing.load(Ordering::SeqCst) && runtime.bus.subscriber_count().await == 0
                }
                None => false,
            }
        };
        if should_remove {
            self.loaded.write().await.remove(world_id);
        }
        should_remove
    }

    pub async fn loaded_world_ids(&self) -> Vec<String> {
        self.loaded.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::World;
    use crate::storage::tests_support::InMemoryStorage;

    #[tokio::test]
    async fn load_fails_for_unknown_world() {
        let registry = WorldRegistry::new();
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        let err = registry.load("missing", storage).await.unwrap_err();
        assert!(matches!(err, WorldError::NotFound(_)));
    }

    #[tokio::test]
    async fn load_is_idempotent_for_same_world() {
        let registry = WorldRegistry::new();
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        storage.create_world(World::new("w1", "Test")).await.unwrap();

        let a = registry.load("w1", storage.clone()).await.unwrap();
        let b = registry.load("w1", storage).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn unload_if_idle_removes_world_with_no_subscribers() {
        let registry = WorldRegistry::new();
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::default());
        storage.create_world(World::new("w1", "Test")).await.unwrap();
        registry.load("w1", storage).await.unwrap();

        assert!(registry.unload_if_idle("w1").await);
        assert!(registry.get("w1").await.is_none());
    }

    #[tokio::test]
    async fn turn_counter_increments_per_chat() {
        let runtime = WorldRuntime::new("w1", Arc::new(InMemoryStorage::default()));
        assert_eq!(runtime.increment_turn("c1").await, 1);
        assert_eq!(runtime.increment_turn("c1").await, 2);
        assert_eq!(runtime.turn_count("c2").await, 0);
    }
}
