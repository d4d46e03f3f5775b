use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stream_event::Channel;

/// A persisted, append-only entry in a World's event log (§3). `seq` is assigned
/// atomically by the `EventBus` at publish time; events are never mutated after
/// persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub world_id: String,
    pub chat_id: Option<String>,
    pub channel: Channel,
    pub payload: serde_json::Value,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
