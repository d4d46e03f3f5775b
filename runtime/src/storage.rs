//! Persistence interface required of a storage backend (§6). The skill registry is
//! explicitly excluded -- it is "a standard in-memory singleton, not persisted across
//! process restarts" and lives entirely in [`crate::skills`].

use async_trait::async_trait;

use crate::error::WorldError;
use crate::model::{Agent, AgentMessage, Chat, Event, World};
use stream_event::Channel;

/// Filter for reading back previously-persisted events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub chat_id: Option<String>,
    pub channel: Option<Channel>,
}

/// What the World Runtime core requires of a storage backend. Concrete backends
/// (e.g. the `storage` crate's SQLite adapter) implement this trait; `runtime` never
/// depends on a specific engine.
#[async_trait]
pub trait Storage: Send + Sync {
    // -- Worlds --
    async fn create_world(&self, world: World) -> Result<World, WorldError>;
    async fn get_world(&self, id: &str) -> Result<Option<World>, WorldError>;
    async fn update_world(&self, world: World) -> Result<World, WorldError>;
    async fn delete_world(&self, id: &str) -> Result<(), WorldError>;
    async fn list_worlds(&self) -> Result<Vec<World>, WorldError>;

    // -- Agents --
    async fn create_agent(&self, agent: Agent) -> Result<Agent, WorldError>;
    async fn get_agent(&self, world_id: &str, agent_id: &str) -> Result<Option<Agent>, WorldError>;
    async fn update_agent(&self, agent: Agent) -> Result<Agent, WorldError>;
    async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), WorldError>;
    async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, WorldError>;

    // -- Chats --
    async fn create_chat(&self, chat: Chat) -> Result<Chat, WorldError>;
    async fn get_chat(&self, world_id: &str, chat_id: &str) -> Result<Option<Chat>, WorldError>;
    async fn update_chat(&self, chat: Chat) -> Result<Chat, WorldError>;
    async fn delete_chat(&self, world_id: &str, chat_id: &str) -> Result<(), WorldError>;
    async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, WorldError>;

    // -- Agent memory --
    async fn append_agent_message(
        &self,
        world_id: &str,
        agent_id: &str,
        message: AgentMessage,
    ) -> Result<(), WorldError>;

    /// Bulk-loads an agent's full memory, filtered by `chat_id` when given.
    async fn load_agent_memory(
        &self,
        world_id: &str,
        agent_id: &str,
        chat_id: Option<&str>,
    ) -> Result<Vec<AgentMessage>, WorldError>;

    /// Deletes all of an agent's messages with the given `chat_id` (chat deletion,
    /// §3 ownership rule).
    async fn delete_agent_messages_for_chat(
        &self,
        world_id: &str,
        agent_id: &str,
        chat_id: &str,
    ) -> Result<(), WorldError>;

    /// Replaces an agent's full memory after an edit (`edit-message`, §6).
    async fn rewrite_agent_memory(
        &self,
        world_id: &str,
        agent_id: &str,
        messages: Vec<AgentMessage>,
    ) -> Result<(), WorldError>;

    // -- Events --
    /// Persists `event`, assigning it the next sequence number for `world_id`
    /// atomically. The returned `Event.seq` is the assigned value.
    async fn append_event(
        &self,
        world_id: &str,
        chat_id: Option<String>,
        channel: Channel,
        payload: serde_json::Value,
        meta: serde_json::Value,
    ) -> Result<Event, WorldError>;

    /// Reads events with `seq > since_seq` for `world_id`, optionally filtered, in
    /// `seq` order.
    async fn read_events(
        &self,
        world_id: &str,
        since_seq: u64,
        filter: EventFilter,
    ) -> Result<Vec<Event>, WorldError>;
}

/// A plain `Mutex`-guarded in-memory `Storage`, for tests that exercise
/// `EventBus`/orchestrator logic without pulling in the `storage` crate's SQLite
/// backend (kept dependency-free: used only under `#[cfg(test)]`).
#[cfg(test)]
pub mod tests_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryStorage {
        worlds: Mutex<HashMap<String, World>>,
        agents: Mutex<HashMap<(String, String), Agent>>,
        chats: Mutex<HashMap<(String, String), Chat>>,
        events: Mutex<HashMap<String, Vec<Event>>>,
    }

    #[async_trait]
    impl Storage for InMemoryStorage {
        async fn create_world(&self, world: World) -> Result<World, WorldError> {
            self.worlds.lock().unwrap().insert(world.id.clone(), world.clone());
            Ok(world)
        }
        async fn get_world(&self, id: &str) -> Result<Option<World>, WorldError> {
            Ok(self.worlds.lock().unwrap().get(id).cloned())
        }
        async fn update_world(&self, world: World) -> Result<World, WorldError> {
            self.worlds.lock().unwrap().insert(world.id.clone(), world.clone());
            Ok(world)
        }
        async fn delete_world(&self, id: &str) -> Result<(), WorldError> {
            self.worlds.lock().unwrap().remove(id);
            Ok(())
        }
        async fn list_worlds(&self) -> Result<Vec<World>, WorldError> {
            Ok(self.worlds.lock().unwrap().values().cloned().collect())
        }

        async fn create_agent(&self, agent: Agent) -> Result<Agent, WorldError> {
            self.agents
                .lock()
                .unwrap()
                .insert((agent.world_id.clone(), agent.id.clone()), agent.clone());
            Ok(agent)
        }
        async fn get_agent(&self, world_id: &str, agent_id: &str) -> Result<Option<Agent>, WorldError> {
            Ok(self
                .agents
                .lock()
                .unwrap()
                .get(&(world_id.to_string(), agent_id.to_string()))
                .cloned())
        }
        async fn update_agent(&self, agent: Agent) -> Result<Agent, WorldError> {
            self.agents
                .lock()
                .unwrap()
                .insert((agent.world_id.clone(), agent.id.clone()), agent.clone());
            Ok(agent)
        }
        async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), WorldError> {
            self.agents
                .lock()
                .unwrap()
                .remove(&(world_id.to_string(), agent_id.to_string()));
            Ok(())
        }
        async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, WorldError> {
            Ok(self
                .agents
                .lock()
                .unwrap()
                .values()
                .filter(|a| a.world_id == world_id)
                .cloned()
                .collect())
        }

        async fn create_chat(&self, chat: Chat) -> Result<Chat, WorldError> {
            self.chats
                .lock()
                .unwrap()
                .insert((chat.world_id.clone(), chat.id.clone()), chat.clone());
            Ok(chat)
        }
        async fn get_chat(&self, world_id: &str, chat_id: &str) -> Result<Option<Chat>, WorldError> {
            Ok(self
                .chats
                .lock()
                .unwrap()
                .get(&(world_id.to_string(), chat_id.to_string()))
                .cloned())
        }
        async fn update_chat(&self, chat: Chat) -> Result<Chat, WorldError> {
            self.chats
                .lock()
                .unwrap()
                .insert((chat.world_id.clone(), chat.id.clone()), chat.clone());
            Ok(chat)
        }
        async fn delete_chat(&self, world_id: &str, chat_id: &str) -> Result<(), WorldError> {
            self.chats
                .lock()
                .unwrap()
                .remove(&(world_id.to_string(), chat_id.to_string()));
            Ok(())
        }
        async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, WorldError> {
            Ok(self
                .chats
                .lock()
                .unwrap()
                .values()
                .filter(|c| c.world_id == world_id)
                .cloned()
                .collect())
        }

        async fn append_agent_message(
            &self,
            world_id: &str,
            agent_id: &str,
            message: AgentMessage,
        ) -> Result<(), WorldError> {
            let mut agents = self.agents.lock().unwrap();
            if let Some(agent) = agents.get_mut(&(world_id.to_string(), agent_id.to_string())) {
                agent.memory.push(message);
            }
            Ok(())
        }

        async fn load_agent_memory(
            &self,
            world_id: &str,
            agent_id: &str,
            chat_id: Option<&str>,
        ) -> Result<Vec<AgentMessage>, WorldError> {
            let agents = self.agents.lock().unwrap();
            let Some(agent) = agents.get(&(world_id.to_string(), agent_id.to_string())) else {
                return Ok(Vec::new());
            };
            Ok(match chat_id {
                Some(cid) => agent
                    .memory
                    .iter()
                    .filter(|m| m.chat_id.as_deref() == Some(cid))
                    .cloned()
                    .collect(),
                None => agent.memory.clone(),
            })
        }

        async fn delete_agent_messages_for_chat(
            &self,
            world_id: &str,
            agent_id: &str,
            chat_id: &str,
        ) -> Result<(), WorldError> {
            let mut agents = self.agents.lock().unwrap();
            if let Some(agent) = agents.get_mut(&(world_id.to_string(), agent_id.to_string())) {
                agent.memory.retain(|m| m.chat_id.as_deref() != Some(chat_id));
            }
            Ok(())
        }

        async fn rewrite_agent_memory(
            &self,
            world_id: &str,
            agent_id: &str,
            messages: Vec<AgentMessage>,
        ) -> Result<(), WorldError> {
            let mut agents = self.agents.lock().unwrap();
            if let Some(agent) = agents.get_mut(&(world_id.to_string(), agent_id.to_string())) {
                agent.memory = messages;
            }
            Ok(())
        }

        async fn append_event(
            &self,
            world_id: &str,
            chat_id: Option<String>,
            channel: Channel,
            payload: serde_json::Value,
            meta: serde_json::Value,
        ) -> Result<Event, WorldError> {
            let mut events = self.events.lock().unwrap();
            let log = events.entry(world_id.to_string()).or_default();
            let seq = log.len() as u64 + 1;
            let event = Event {
                seq,
                world_id: world_id.to_string(),
                chat_id,
                channel,
                payload,
                meta,
                created_at: chrono::Utc::now(),
            };
            log.push(event.clone());
            Ok(event)
        }

        async fn read_events(
            &self,
            world_id: &str,
            since_seq: u64,
            filter: EventFilter,
        ) -> Result<Vec<Event>, WorldError> {
            let events = self.events.lock().unwrap();
            let log = events.get(world_id).cloned().unwrap_or_default();
            Ok(log
                .into_iter()
                .filter(|e| e.seq > since_seq)
                .filter(|e| filter.chat_id.as_ref().map_or(true, |c| e.chat_id.as_deref() == Some(c)))
                .filter(|e| filter.channel.map_or(true, |c| e.channel == c))
                .collect())
        }
    }
}
