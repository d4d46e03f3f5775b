//! Typed payload shapes for each channel (§6 "Event channels").
//!
//! Each channel carries a different payload shape. We model them as distinct
//! tagged enums rather than one grab-bag struct per [DESIGN NOTES, "dynamically
//! shaped message payloads"] — the runtime builds one of these, the bus stores
//! it as `serde_json::Value` (it does not need to interpret it), and clients
//! deserialize whichever shape matches the channel they subscribed to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of one chat-log entry, mirrors the OpenAI-style roles used in agent memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One tool call requested by an assistant message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// `message` channel payload: one chat-timeline entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message_id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Which std stream a `tool-stream` sse chunk carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SseStreamKind {
    Stdout,
    Stderr,
}

/// Token usage reported at the end of an LLM completion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UsagePayload {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// `sse` channel payload: streaming lifecycle for one in-flight LLM/tool turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SsePayload {
    Start {
        message_id: String,
    },
    Chunk {
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    End {
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsagePayload>,
        #[serde(default)]
        cancelled: bool,
    },
    Error {
        message_id: String,
        message: String,
    },
    ToolStream {
        message_id: String,
        stream: SseStreamKind,
        content: String,
    },
}

/// `world` channel payload: response lifecycle and tool telemetry, scoped to a chat.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorldPayload {
    ResponseStart {
        chat_id: String,
        agent_id: String,
        message_id: String,
    },
    ResponseEnd {
        chat_id: String,
        agent_id: String,
        message_id: String,
    },
    Idle {
        chat_id: String,
    },
    ToolStart {
        chat_id: String,
        execution_id: String,
        tool_name: String,
    },
    ToolProgress {
        chat_id: String,
        execution_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    ToolResult {
        chat_id: String,
        execution_id: String,
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    ToolError {
        chat_id: String,
        execution_id: String,
        tool_name: String,
        message: String,
    },
}

/// `system` channel payload: a world-scoped notification with an explicit `eventType`
/// tag and free-form data (e.g. `chat-title-updated`, `create-agent-success`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemPayload {
    pub event_type: String,
    #[serde(flatten)]
    pub data: Value,
}

impl SystemPayload {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}
