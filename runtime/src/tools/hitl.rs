//! `hitl_request`: an options-only human-in-the-loop question (§4.4). No approval
//! gating of its own — asking a question is never a mutation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::ToolError;

use super::{Tool, ToolCallContent, ToolCallContext, ToolSpec, TOOL_HITL_REQUEST};

#[derive(Deserialize)]
struct HitlRequestArgs {
    #[allow(dead_code)]
    message: String,
    options: Vec<String>,
}

/// Resolves a pending HITL question to a selected option, or `None` if the user
/// canceled. In this process the resolution channel is supplied by the caller
/// (orchestrator), since answering requires a reply from the chat that can arrive
/// on a different task than the one awaiting it.
pub struct HitlRequestTool<F> {
    resolver: F,
}

impl<F> HitlRequestTool<F>
where
    F: Fn(&str, &[String]) -> futures::future::BoxFuture<'static, Option<String>> + Send + Sync,
{
    pub fn new(resolver: F) -> Self {
        HitlRequestTool { resolver }
    }
}

#[async_trait]
impl<F> Tool for HitlRequestTool<F>
where
    F: Fn(&str, &[String]) -> futures::future::BoxFuture<'static, Option<String>> + Send + Sync,
{
    fn name(&self) -> &str {
        TOOL_HITL_REQUEST
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_HITL_REQUEST.to_string(),
            description: Some("Ask the user to pick one of a fixed set of options.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string"},
                    "options": {"type": "array", "items": {"type": "string"}},
                },
                "required": ["message", "options"],
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolCallContext) -> Result<ToolCallContent, ToolError> {
        let parsed: HitlRequestArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArgs { tool: TOOL_HITL_REQUEST.to_string(), message: e.to_string() })?;
        if parsed.options.is_empty() {
            return Err(ToolError::InvalidArgs {
                tool: TOOL_HITL_REQUEST.to_string(),
                message: "options must be non-empty".to_string(),
            });
        }

        let selected = (self.resolver)(&ctx.chat_id, &parsed.options).await;
        let result = match selected {
            Some(selected) => json!({"outcome": "confirmed", "selected": selected}),
            None => json!({"outcome": "canceled", "selected": null}),
        };
        Ok(ToolCallContent::json(&result))
    }
}
