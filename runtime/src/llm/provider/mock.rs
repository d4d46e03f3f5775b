//! Deterministic [`LlmClient`] for tests, mirroring the teacher's `MockLlm` pattern.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WorldError;
use crate::llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage, StreamChunk};

/// Always replies with a fixed string, streamed as a single chunk.
pub struct MockLlmClient {
    reply: String,
}

impl MockLlmClient {
    pub fn with_reply(reply: impl Into<String>) -> Self {
        MockLlmClient { reply: reply.into() }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn invoke_stream(
        &self,
        _request: LlmRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamChunk>, WorldError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let reply = self.reply.clone();
        tokio::spawn(async move {
            if cancel.is_cancelled() {
                let _ = tx.send(StreamChunk::Error { message: "cancelled".into() });
                return;
            }
            let _ = tx.send(StreamChunk::Start);
            let _ = tx.send(StreamChunk::Chunk {
                content: Some(reply),
                tool_call_delta: None,
            });
            let _ = tx.send(StreamChunk::End {
                usage: Some(LlmUsage {
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    total_tokens: 2,
                }),
            });
        });
        Ok(rx)
    }

    async fn invoke(&self, _request: LlmRequest) -> Result<LlmResponse, WorldError> {
        Ok(LlmResponse {
            content: self.reply.clone(),
            tool_calls: vec![],
            usage: None,
        })
    }
}
