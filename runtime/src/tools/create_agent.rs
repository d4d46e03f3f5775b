//! `create_agent`: define a new agent in the current World (§4.4). On success,
//! emits an informational confirmation with `refreshAfterDismiss: true` so clients
//! reload the agent roster.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use stream_event::payload::SystemPayload;
use stream_event::Channel;

use crate::error::ToolError;
use crate::model::Agent;
use crate::storage::Storage;

use super::{Tool, ToolCallContent, ToolCallContext, ToolSpec, TOOL_CREATE_AGENT};

#[derive(Deserialize)]
struct CreateAgentArgs {
    name: String,
    #[serde(default)]
    system_prompt: String,
    #[serde(default)]
    llm_provider: Option<String>,
    #[serde(default)]
    llm_model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

pub struct CreateAgentTool {
    storage: Arc<dyn Storage>,
}

impl CreateAgentTool {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        CreateAgentTool { storage }
    }
}

#[async_trait]
impl Tool for CreateAgentTool {
    fn name(&self) -> &str {
        TOOL_CREATE_AGENT
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_CREATE_AGENT.to_string(),
            description: Some("Define a new agent participant in this world.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "system_prompt": {"type": "string"},
                    "llm_provider": {"type": "string"},
                    "llm_model": {"type": "string"},
                    "temperature": {"type": "number"},
                    "max_tokens": {"type": "integer"},
                },
                "required": ["name"],
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolCallContext) -> Result<ToolCallContent, ToolError> {
        let parsed: CreateAgentArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArgs { tool: TOOL_CREATE_AGENT.to_string(), message: e.to_string() })?;

        let mut agent = Agent::new(ctx.world_id.clone(), parsed.name);
        agent.system_prompt = parsed.system_prompt;
        if let Some(provider) = parsed.llm_provider {
            agent.llm_provider = provider;
        }
        if let Some(model) = parsed.llm_model {
            agent.llm_model = model;
        }
        agent.temperature = parsed.temperature;
        agent.max_tokens = parsed.max_tokens;

        let created = self
            .storage
            .create_agent(agent)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let confirmation = SystemPayload::new(
            "create-agent-success",
            json!({
                "agentId": created.id,
                "name": created.name,
                "refreshAfterDismiss": true,
            }),
        );
        let _ = ctx
            .bus
            .publish(
                Channel::System,
                Some(ctx.chat_id.clone()),
                serde_json::to_value(&confirmation).unwrap_or_default(),
                serde_json::Value::Null,
            )
            .await;

        Ok(ToolCallContent::json(&json!({"agentId": created.id, "status": "ok"})))
    }
}
