//! LLM request/response types and the abstract provider interface (§4.2).

mod queue;
pub mod provider;

pub use queue::LlmQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::WorldError;
use crate::model::Role;
use crate::tools::ToolSpec;

/// One message in an LLM completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<crate::model::ToolCall>,
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ToolChoiceMode {
    #[default]
    Auto,
    None,
    Required,
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub provider: String,
    pub model: String,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoiceMode,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// `true` for the idle-hook title summarization call (§4.3 step 7): a
    /// non-streaming, one-shot completion that never enters the streaming pipeline.
    pub stream: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmToolCallDelta {
    pub id: String,
    pub name: String,
    pub arguments_fragment: String,
}

/// One chunk of a streaming completion (§4.2).
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Start,
    Chunk {
        content: Option<String>,
        tool_call_delta: Option<LlmToolCallDelta>,
    },
    End {
        usage: Option<LlmUsage>,
    },
    Error {
        message: String,
    },
}

/// Aggregated, non-streaming response -- used for the idle-hook summarization call.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<crate::model::ToolCall>,
    pub usage: Option<LlmUsage>,
}

/// Abstract streaming completion API a provider adapter implements (§2, §4.2:
/// "Provider adapters (OpenAI-protocol, Anthropic, Google) share one abstract
/// interface emitting the chunk types above").
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Streams a completion, honoring `cancel` both while queued (caller's
    /// responsibility) and in-flight (this call's responsibility, forwarded to the
    /// provider's abort mechanism where supported).
    async fn invoke_stream(
        &self,
        request: LlmRequest,
        cancel: CancellationToken,
    ) -> Result<tokio::sync::mpsc::UnboundedReceiver<StreamChunk>, WorldError>;

    /// One-shot non-streaming call, used by the idle hook (§4.3 step 7).
    async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, WorldError>;
}
