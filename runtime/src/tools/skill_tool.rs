//! `load_skill`: fetch full skill instructions by `skillId`, wrapped in a
//! `<skill_context>` envelope (§4.4, §4.6).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::ToolError;
use crate::skills::SkillRegistry;

use super::{Tool, ToolCallContent, ToolCallContext, ToolSpec, TOOL_LOAD_SKILL};

#[derive(Deserialize)]
struct LoadSkillArgs {
    skill_id: String,
}

pub struct LoadSkillTool {
    registry: Arc<SkillRegistry>,
}

impl LoadSkillTool {
    pub fn new(registry: Arc<SkillRegistry>) -> Self {
        LoadSkillTool { registry }
    }
}

#[async_trait]
impl Tool for LoadSkillTool {
    fn name(&self) -> &str {
        TOOL_LOAD_SKILL
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_LOAD_SKILL.to_string(),
            description: Some("Fetch the full instructions for a skill by id.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "skill_id": {"type": "string"},
                },
                "required": ["skill_id"],
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, _ctx: &ToolCallContext) -> Result<ToolCallContent, ToolError> {
        let parsed: LoadSkillArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArgs { tool: TOOL_LOAD_SKILL.to_string(), message: e.to_string() })?;

        let content = self
            .registry
            .load_content(&parsed.skill_id)
            .await
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: TOOL_LOAD_SKILL.to_string(),
                message: format!("unknown skill: {}", parsed.skill_id),
            })?;

        Ok(ToolCallContent::text(content))
    }
}
