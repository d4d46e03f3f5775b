//! Envelope and framed wire event (§3 "Event", §4.1 Event Bus).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::Channel;

/// Per-world, per-event metadata the bus attaches at publish time.
///
/// `seq` is monotonic and gap-free per world, starting at 1 — the invariant
/// every subscriber's replay/live ordering guarantee is built on (§8).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    pub world_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub created_at_ms: i64,
}

impl Envelope {
    pub fn new(seq: u64, world_id: impl Into<String>, chat_id: Option<String>, created_at_ms: i64) -> Self {
        Self {
            seq,
            world_id: world_id.into(),
            chat_id,
            created_at_ms,
        }
    }
}

/// One event as delivered to a client: channel, envelope, typed payload, and
/// free-form meta (e.g. correlation ids) that does not belong in the payload
/// shape itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireEvent {
    pub channel: Channel,
    #[serde(flatten)]
    pub envelope: Envelope,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

impl WireEvent {
    pub fn new(channel: Channel, envelope: Envelope, payload: Value) -> Self {
        Self {
            channel,
            envelope,
            payload,
            meta: Value::Null,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{MessagePayload, Role};

    #[test]
    fn wire_event_serializes_flat_envelope() {
        let payload = MessagePayload {
            message_id: "m1".into(),
            chat_id: "c0".into(),
            role: Role::User,
            content: "hi".into(),
            sender: Some("alice".into()),
            tool_calls: vec![],
            tool_call_id: None,
        };
        let env = Envelope::new(1, "w1", Some("c0".into()), 0);
        let event = WireEvent::new(Channel::Message, env, serde_json::to_value(&payload).unwrap());
        let value = event.to_value().unwrap();
        assert_eq!(value["seq"], 1);
        assert_eq!(value["world_id"], "w1");
        assert_eq!(value["chat_id"], "c0");
        assert_eq!(value["channel"], "message");
        assert_eq!(value["payload"]["content"], "hi");
    }

    #[test]
    fn wire_event_omits_missing_chat_id() {
        let env = Envelope::new(2, "w1", None, 0);
        let event = WireEvent::new(Channel::World, env, serde_json::json!({"type": "idle"}));
        let value = event.to_value().unwrap();
        assert!(value.get("chat_id").is_none());
    }
}
