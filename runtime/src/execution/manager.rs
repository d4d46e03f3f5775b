//! Tool Execution Manager (§4.4): the generic wrapper every tool call passes
//! through — approval gating, dispatch, and lifecycle telemetry. `shell_cmd` owns
//! its own fine-grained telemetry (execution-record registration, state machine,
//! stdout/stderr streaming) since it needs an execution id before the approval
//! check even runs; this manager skips the generic start/result/error emission
//! for it to avoid duplicate `world`-channel events.

use std::sync::Arc;

use stream_event::payload::WorldPayload;
use stream_event::Channel;

use crate::approval::{ApprovalGate, ApprovalStatus};
use crate::error::WorldError;
use crate::model::ToolCall;
use crate::tools::{requires_approval, ToolCallContent, ToolCallContext, ToolRegistry, TOOL_SHELL_CMD};

/// What the orchestrator should do next after attempting a tool call.
pub enum ExecutionOutcome {
    /// The tool ran (successfully or not); `content` is what goes back to the LLM
    /// as the `tool`-role message.
    Completed(ToolCallContent),
    /// No approval on record; a synthetic `client.requestApproval` message must be
    /// injected and LLM processing halted (§4.4 step 1).
    RequiresApproval { request_arguments: serde_json::Value },
    /// Denied within the last 5 minutes; do not re-prompt (§4.5).
    RecentlyDenied,
}

pub struct ToolExecutionManager {
    tools: Arc<ToolRegistry>,
    approval: Arc<ApprovalGate>,
}

impl ToolExecutionManager {
    pub fn new(tools: Arc<ToolRegistry>, approval: Arc<ApprovalGate>) -> Self {
        ToolExecutionManager { tools, approval }
    }

    pub async fn execute(&self, tool_call: &ToolCall, ctx: ToolCallContext) -> Result<ExecutionOutcome, WorldError> {
        let requires = requires_approval(&tool_call.function_name);
        let status = self.approval.check(&ctx.chat_id, &tool_call.function_name, requires).await;

        match status {
            ApprovalStatus::RequiresApproval => {
                let request_arguments = ApprovalGate::build_request_arguments(
                    tool_call,
                    format!("Approval required to run `{}`.", tool_call.function_name),
                );
                return Ok(ExecutionOutcome::RequiresApproval { request_arguments });
            }
            ApprovalStatus::RecentlyDenied => return Ok(ExecutionOutcome::RecentlyDenied),
            ApprovalStatus::Allowed => {}
        }

        let is_shell = tool_call.function_name == TOOL_SHELL_CMD;
        if !is_shell {
            self.emit(&ctx, WorldPayload::ToolStart {
                chat_id: ctx.chat_id.clone(),
                execution_id: ctx.execution_id.clone(),
                tool_name: tool_call.function_name.clone(),
            })
            .await;
        }

        let result = self.tools.call(&tool_call.function_name, tool_call.arguments.clone(), &ctx).await;

        if !is_shell {
            match &result {
                Ok(_) => {
                    self.emit(&ctx, WorldPayload::ToolResult {
                        chat_id: ctx.chat_id.clone(),
                        execution_id: ctx.execution_id.clone(),
                        tool_name: tool_call.function_name.clone(),
                        exit_code: None,
                    })
                    .await;
                }
                Err(e) => {
                    self.emit(&ctx, WorldPayload::ToolError {
                        chat_id: ctx.chat_id.clone(),
                        execution_id: ctx.execution_id.clone(),
                        tool_name: tool_call.function_name.clone(),
                        message: e.to_string(),
                    })
                    .await;
                }
            }
        }

        let content = match result {
            Ok(content) => content,
            Err(e) => ToolCallContent::json(&serde_json::json!({"error": e.to_string()})),
        };
        Ok(ExecutionOutcome::Completed(content))
    }

    async fn emit(&self, ctx: &ToolCallContext, payload: WorldPayload) {
        let _ = ctx
            .bus
            .publish(
                Channel::World,
                Some(ctx.chat_id.clone()),
                serde_json::to_value(&payload).unwrap_or_default(),
                serde_json::Value::Null,
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::storage::tests_support::InMemoryStorage;
    use crate::tools::registry::ToolRegistry;

    fn ctx(bus: Arc<EventBus>) -> ToolCallContext {
        ToolCallContext {
            world_id: "w1".into(),
            chat_id: "c1".into(),
            agent_id: "a1".into(),
            message_id: "m1".into(),
            execution_id: "e1".into(),
            working_directory: None,
            bus,
            cancel: tokio_util::sync::CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn unapproved_mutating_tool_returns_requires_approval() {
        let bus = Arc::new(EventBus::new("w1", Arc::new(InMemoryStorage::default())));
        let manager = ToolExecutionManager::new(Arc::new(ToolRegistry::new()), Arc::new(ApprovalGate::new()));
        let call = ToolCall { id: "call1".into(), function_name: TOOL_SHELL_CMD.to_string(), arguments: serde_json::json!({}) };
        let outcome = manager.execute(&call, ctx(bus)).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::RequiresApproval { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_returns_completed_with_error_content() {
        let bus = Arc::new(EventBus::new("w1", Arc::new(InMemoryStorage::default())));
        let manager = ToolExecutionManager::new(Arc::new(ToolRegistry::new()), Arc::new(ApprovalGate::new()));
        let call = ToolCall { id: "call1".into(), function_name: "read_file".to_string(), arguments: serde_json::json!({}) };
        let outcome = manager.execute(&call, ctx(bus)).await.unwrap();
        match outcome {
            ExecutionOutcome::Completed(content) => assert!(content.text.contains("error")),
            _ => panic!("expected Completed"),
        }
    }
}
