//! OpenAI-protocol adapter (also used for any OpenAI-compatible endpoint via a
//! custom base URL), grounded on the teacher's `async-openai`-based `ChatOpenAI`.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WorldError;
use crate::llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage, StreamChunk};
use crate::model::Role;

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key.into());
        OpenAiClient {
            client: Client::with_config(config),
        }
    }

    /// For OpenAI-compatible self-hosted endpoints (§2).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key.into()).with_api_base(base_url.into());
        OpenAiClient {
            client: Client::with_config(config),
        }
    }

    fn build_request(
        &self,
        request: &LlmRequest,
        stream: bool,
    ) -> Result<async_openai::types::CreateChatCompletionRequest, WorldError> {
        let mut messages = Vec::new();
        for m in &request.messages {
            let msg = match m.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map(Into::into),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map(Into::into),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map(Into::into),
                Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                    .content(m.content.clone())
                    .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                    .build()
                    .map(Into::into),
            }
            .map_err(|e| WorldError::Llm(e.to_string()))?;
            messages.push(msg);
        }

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(request.model.clone()).messages(messages).stream(stream);
        if let Some(t) = request.temperature {
            builder.temperature(t);
        }
        if let Some(m) = request.max_tokens {
            builder.max_tokens(m);
        }
        builder.build().map_err(|e| WorldError::Llm(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn invoke_stream(
        &self,
        request: LlmRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamChunk>, WorldError> {
        let req = self.build_request(&request, true)?;
        let mut stream = self
            .client
            .chat()
            .create_stream(req)
            .await
            .map_err(|e| WorldError::Llm(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let _ = tx.send(StreamChunk::Start);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = tx.send(StreamChunk::Error { message: "cancelled".into() });
                        return;
                    }
                    next = stream.next() => {
                        match next {
                            Some(Ok(resp)) => {
                                let Some(choice) = resp.choices.first() else { continue };
                                let content = choice.delta.content.clone();
                                if tx.send(StreamChunk::Chunk { content, tool_call_delta: None }).is_err() {
                                    return;
                                }
                            }
                            Some(Err(e)) => {
                                let _ = tx.send(StreamChunk::Error { message: e.to_string() });
                                return;
                            }
                            None => {
                                let _ = tx.send(StreamChunk::End { usage: None });
                                return;
                            }
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, WorldError> {
        let req = self.build_request(&request, false)?;
        let resp = self
            .client
            .chat()
            .create(req)
            .await
            .map_err(|e| WorldError::Llm(e.to_string()))?;

        let content = resp
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let usage = resp.usage.map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(LlmResponse {
            content,
            tool_calls: vec![],
            usage,
        })
    }
}
