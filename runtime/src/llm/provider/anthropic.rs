//! Anthropic Messages API adapter. No dedicated Anthropic SDK is in the dependency
//! stack, so this speaks the wire protocol directly over `reqwest`, the same way the
//! teacher's `tools::file`/`tool_source` modules reach for `reqwest` whenever no
//! purpose-built client crate is already in the tree.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WorldError;
use crate::llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage, StreamChunk};
use crate::model::Role;

const API_BASE: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    api_key: String,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        AnthropicClient {
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    fn body(&self, request: &LlmRequest, stream: bool) -> serde_json::Value {
        let mut system = String::new();
        let mut messages = Vec::new();
        for m in &request.messages {
            match m.role {
                Role::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&m.content);
                }
                Role::User => messages.push(json!({"role": "user", "content": m.content})),
                Role::Assistant => messages.push(json!({"role": "assistant", "content": m.content})),
                Role::Tool => messages.push(json!({"role": "user", "content": m.content})),
            }
        }
        json!({
            "model": request.model,
            "system": system,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(4096),
            "temperature": request.temperature,
            "stream": stream,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn invoke_stream(
        &self,
        request: LlmRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamChunk>, WorldError> {
        let body = self.body(&request, true);
        let resp = self
            .http
            .post(API_BASE)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorldError::Llm(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut byte_stream = resp.bytes_stream();
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let _ = tx.send(StreamChunk::Start);
            let mut buf = String::new();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = tx.send(StreamChunk::Error { message: "cancelled".into() });
                        return;
                    }
                    next = byte_stream.next() => {
                        match next {
                            Some(Ok(bytes)) => {
                                buf.push_str(&String::from_utf8_lossy(&bytes));
                                while let Some(pos) = buf.find("\n\n") {
                                    let event = buf[..pos].to_string();
                                    buf.drain(..pos + 2);
                                    for line in event.lines() {
                                        if let Some(data) = line.strip_prefix("data: ") {
                                            if let Ok(v) = serde_json::from_str::<serde_json::Value>(data) {
                                                if v["type"] == "content_block_delta" {
                                                    let text = v["delta"]["text"].as_str().map(String::from);
                                                    if tx.send(StreamChunk::Chunk { content: text, tool_call_delta: None }).is_err() {
                                                        return;
                                                    }
                                                } else if v["type"] == "message_stop" {
                                                    let _ = tx.send(StreamChunk::End { usage: None });
                                                    return;
                                                }
                                            }
                                        }
                                    }
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
        let body = self.body(&request, false);
        let resp: serde_json::Value = self
            .http
            .post(API_BASE)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorldError::Llm(e.to_string()))?
            .json()
            .await
            .map_err(|e| WorldError::Llm(e.to_string()))?;

        let content = resp["content"][0]["text"].as_str().unwrap_or_default().to_string();
        let usage = resp.get("usage").map(|u| LlmUsage {
            prompt_tokens: u["input_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: u["output_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: (u["input_tokens"].as_u64().unwrap_or(0) + u["output_tokens"].as_u64().unwrap_or(0)) as u32,
        });

        Ok(LlmResponse {
            content,
            tool_calls: vec![],
            usage,
        })
    }
}
