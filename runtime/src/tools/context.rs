//! Per-call context passed to every [`super::Tool::call`] (teacher's
//! `ToolCallContext` pattern, generalized with bus access for shell streaming and
//! working-directory resolution).

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use stream_event::payload::{SseStreamKind, WorldPayload};
use stream_event::Channel;

pub struct ToolCallContext {
    pub world_id: String,
    pub chat_id: String,
    pub agent_id: String,
    pub message_id: String,
    pub execution_id: String,
    /// Resolved per §4.4 step 2: explicit tool arg > world `working_directory`
    /// variable > error. Resolution happens before `call` runs; a tool that needs a
    /// directory treats `None` as the already-surfaced error case.
    pub working_directory: Option<PathBuf>,
    pub bus: Arc<EventBus>,
    pub cancel: CancellationToken,
}

impl ToolCallContext {
    /// Publishes one `sse` `tool-stream` chunk for this execution (§4.4 step 2).
    pub async fn emit_tool_stream(&self, stream: SseStreamKind, content: String) {
        let payload = stream_event::payload::SsePayload::ToolStream {
            message_id: self.message_id.clone(),
            stream,
            content,
        };
        let _ = self
            .bus
            .publish(
                Channel::Sse,
                Some(self.chat_id.clone()),
                serde_json::to_value(&payload).unwrap_or_default(),
                serde_json::Value::Null,
            )
            .await;
    }

    /// Publishes one `world`-channel tool lifecycle event (§4.4 step 3).
    pub async fn emit_world(&self, payload: WorldPayload) {
        let _ = self
            .bus
            .publish(
                Channel::World,
                Some(self.chat_id.clone()),
                serde_json::to_value(&payload).unwrap_or_default(),
                serde_json::Value::Null,
            )
            .await;
    }
}
