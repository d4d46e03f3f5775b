//! Built-in tool table exposed to every World's LLM input (§4.4).

mod context;
pub mod create_agent;
pub mod fs;
pub mod hitl;
pub mod registry;
pub mod shell;
pub mod skill_tool;

pub use context::ToolCallContext;
pub use registry::ToolRegistry;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Description + JSON schema the LLM sees for one tool (aligned with MCP
/// `tools/list`, matching the teacher's `ToolSpec`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Result returned to the LLM. `shell_cmd` intentionally returns a minimal result
/// (`{exitCode, status}`), never the full stdout/stderr transcript (§4.4 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallContent {
    pub text: String,
}

impl ToolCallContent {
    pub fn text(text: impl Into<String>) -> Self {
        ToolCallContent { text: text.into() }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        ToolCallContent {
            text: value.to_string(),
        }
    }
}

/// One tool the LLM may call (§4.4).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn spec(&self) -> ToolSpec;
    async fn call(
        &self,
        args: serde_json::Value,
        ctx: &ToolCallContext,
    ) -> Result<ToolCallContent, ToolError>;
}

pub const TOOL_SHELL_CMD: &str = "shell_cmd";
pub const TOOL_READ_FILE: &str = "read_file";
pub const TOOL_LIST_FILES: &str = "list_files";
pub const TOOL_GREP: &str = "grep";
pub const TOOL_GREP_SEARCH_ALIAS: &str = "grep_search";
pub const TOOL_LOAD_SKILL: &str = "load_skill";
pub const TOOL_HITL_REQUEST: &str = "hitl_request";
pub const TOOL_CREATE_AGENT: &str = "create_agent";

/// Tool names that require approval-gate evaluation before execution (§4.4 step 1).
/// All built-ins except pure filesystem-read tools and `hitl_request` (an
/// options-only question, not a mutation) require approval.
pub fn requires_approval(tool_name: &str) -> bool {
    matches!(tool_name, TOOL_SHELL_CMD | TOOL_CREATE_AGENT)
}

/// Populates `registry` with the full built-in table (§4.4): the process stands up
/// one shared registry at startup rather than one per world, since none of these
/// tools hold world-scoped state beyond what [`ToolCallContext`] already carries.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    shell_executions: Arc<crate::execution::ShellExecutionRegistry>,
    default_working_directory: Option<std::path::PathBuf>,
    skills: Arc<crate::skills::SkillRegistry>,
    storage: Arc<dyn crate::storage::Storage>,
    hitl: Arc<crate::hitl::HitlCoordinator>,
) {
    registry.register(Arc::new(fs::ReadFileTool));
    registry.register(Arc::new(fs::ListFilesTool));
    registry.register(Arc::new(fs::GrepTool::new(TOOL_GREP)));
    registry.register(Arc::new(fs::GrepTool::new(TOOL_GREP_SEARCH_ALIAS)));
    registry.register(Arc::new(shell::ShellCmdTool::new(shell_executions, default_working_directory)));
    registry.register(Arc::new(skill_tool::LoadSkillTool::new(skills)));
    registry.register(Arc::new(create_agent::CreateAgentTool::new(storage)));
    registry.register(Arc::new(hitl::HitlRequestTool::new(move |chat_id: &str, options: &[String]| {
        let hitl = hitl.clone();
        let chat_id = chat_id.to_string();
        let options = options.to_vec();
        Box::pin(async move { hitl.ask(&chat_id, options).await }) as futures::future::BoxFuture<'static, Option<String>>
    })));
}
