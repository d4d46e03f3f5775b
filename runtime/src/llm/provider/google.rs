//! Google (Gemini) adapter, speaking the `generateContent`/`streamGenerateContent`
//! REST surface directly over `reqwest` for the same reason as [`super::anthropic`]:
//! no dedicated Google SDK sits in the dependency stack.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WorldError;
use crate::llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage, StreamChunk};
use crate::model::Role;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GoogleClient {
    api_key: String,
    http: reqwest::Client,
}

impl GoogleClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        GoogleClient {
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    fn body(&self, request: &LlmRequest) -> serde_json::Value {
        let contents: Vec<_> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant { "model" } else { "user" };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();
        let system_instruction: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        json!({
            "contents": contents,
            "systemInstruction": {"parts": [{"text": system_instruction.join("\n")}]},
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            },
        })
    }
}

#[async_trait]
impl LlmClient for GoogleClient {
    async fn invoke_stream(
        &self,
        request: LlmRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamChunk>, WorldError> {
        let url = format!(
            "{API_BASE}/{}:streamGenerateContent?alt=sse&key={}",
            request.model, self.api_key
        );
        let body = self.body(&request);
        let resp = self
            .http
            .post(url)
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
                                while let Some(pos) = buf.find('\n') {
                                    let line = buf[..pos].to_string();
                                    buf.drain(..pos + 1);
                                    if let Some(data) = line.strip_prefix("data: ") {
                                        if let Ok(v) = serde_json::from_str::<serde_json::Value>(data) {
                                            let text = v["candidates"][0]["content"]["parts"][0]["text"]
                                                .as_str()
                                                .map(String::from);
                                            if text.is_some()
                                                && tx
                                                    .send(StreamChunk::Chunk { content: text, tool_call_delta: None })
                                                    .is_err()
                                            {
                                                return;
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
        let url = format!("{API_BASE}/{}:generateContent?key={}", request.model, self.api_key);
        let body = self.body(&request);
        let resp: serde_json::Value = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorldError::Llm(e.to_string()))?
            .json()
            .await
            .map_err(|e| WorldError::Llm(e.to_string()))?;

        let content = resp["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let usage = resp.get("usageMetadata").map(|u| LlmUsage {
            prompt_tokens: u["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            completion_tokens: u["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
            total_tokens: u["totalTokenCount"].as_u64().unwrap_or(0) as u32,
        });

        Ok(LlmResponse {
            content,
            tool_calls: vec![],
            usage,
        })
    }
}
