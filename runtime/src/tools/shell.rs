//! `shell_cmd`: execute a subprocess, no shell expansion, streaming stdout/stderr,
//! minimal result to the LLM (§4.4).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::warn;

use crate::error::ToolError;
use crate::execution::ShellExecutionRegistry;
use crate::model::{ExecutionState, ShellExecutionRecord};

use super::{Tool, ToolCallContent, ToolCallContext, ToolSpec, TOOL_SHELL_CMD};
use stream_event::payload::{SseStreamKind, WorldPayload};

/// Any single stdout/stderr transcript kept for UI display is capped here; past this
/// the client-facing buffer is truncated with a warning (§4.4 step 2). The LLM never
/// sees this content regardless.
const UI_TRUNCATE_CHARS: usize = 50_000;

#[derive(Deserialize)]
struct ShellCmdArgs {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    directory: Option<String>,
}

pub struct ShellCmdTool {
    registry: Arc<ShellExecutionRegistry>,
    /// Process-wide fallback used only when the call carries no explicit `directory`
    /// and `ctx.working_directory` didn't resolve one from world variables (§4.4 step
    /// 2, last resort before erroring).
    default_working_directory: Option<PathBuf>,
}

impl ShellCmdTool {
    pub fn new(registry: Arc<ShellExecutionRegistry>, default_working_directory: Option<PathBuf>) -> Self {
        ShellCmdTool {
            registry,
            default_working_directory,
        }
    }
}

#[async_trait]
impl Tool for ShellCmdTool {
    fn name(&self) -> &str {
        TOOL_SHELL_CMD
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_SHELL_CMD.to_string(),
            description: Some("Execute a subprocess in a working directory. No shell expansion.".to_string()),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "args": {"type": "array", "items": {"type": "string"}},
                    "directory": {"type": "string"},
                },
                "required": ["command"],
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolCallContext) -> Result<ToolCallContent, ToolError> {
        let parsed: ShellCmdArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArgs { tool: TOOL_SHELL_CMD.to_string(), message: e.to_string() })?;

        let directory = parsed
            .directory
            .map(PathBuf::from)
            .or_else(|| ctx.working_directory.clone())
            .or_else(|| self.default_working_directory.clone())
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: TOOL_SHELL_CMD.to_string(),
                message: "no directory given and world has no working_directory variable".to_string(),
            })?;

        let mut record = ShellExecutionRecord::new(parsed.command.clone(), parsed.args.clone());
        record.world_id = Some(ctx.world_id.clone());
        record.chat_id = Some(ctx.chat_id.clone());
        record.execution_id = ctx.execution_id.clone();
        let cancel = self.registry.register(record).await;

        ctx.emit_world(WorldPayload::ToolStart {
            chat_id: ctx.chat_id.clone(),
            execution_id: ctx.execution_id.clone(),
            tool_name: TOOL_SHELL_CMD.to_string(),
        })
        .await;
        self.registry.transition(&ctx.execution_id, ExecutionState::Starting).await;

        let mut command = Command::new(&parsed.command);
        command
            .args(&parsed.args)
            .current_dir(&directory)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                self.registry.transition(&ctx.execution_id, ExecutionState::Failed).await;
                ctx.emit_world(WorldPayload::ToolError {
                    chat_id: ctx.chat_id.clone(),
                    execution_id: ctx.execution_id.clone(),
                    tool_name: TOOL_SHELL_CMD.to_string(),
                    message: e.to_string(),
                })
                .await;
                return Err(ToolError::ExecutionFailed(e.to_string()));
            }
        };
        self.registry.transition(&ctx.execution_id, ExecutionState::Running).await;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut total_emitted = 0usize;
        let mut truncated_warned = false;

        let stdout_task = spawn_stream_task(ctx, stdout, SseStreamKind::Stdout);
        let stderr_task = spawn_stream_task(ctx, stderr, SseStreamKind::Stderr);

        let exit_status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                self.registry.transition(&ctx.execution_id, ExecutionState::Canceled).await;
                ctx.emit_world(WorldPayload::ToolError {
                    chat_id: ctx.chat_id.clone(),
                    execution_id: ctx.execution_id.clone(),
                    tool_name: TOOL_SHELL_CMD.to_string(),
                    message: "canceled".to_string(),
                })
                .await;
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                return Ok(ToolCallContent::json(&serde_json::json!({"exitCode": null, "status": "canceled"})));
            }
            status = child.wait() => status,
        };

        let stdout_chars = stdout_task.await.unwrap_or(0);
        let stderr_chars = stderr_task.await.unwrap_or(0);
        total_emitted = stdout_chars + stderr_chars;
        if total_emitted > UI_TRUNCATE_CHARS && !truncated_warned {
            truncated_warned = true;
            warn!(execution_id = %ctx.execution_id, total_emitted, "shell output exceeded UI truncation threshold");
        }

        match exit_status {
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                self.registry.set_exit_code(&ctx.execution_id, code).await;
                if status.success() {
                    self.registry.transition(&ctx.execution_id, ExecutionState::Completed).await;
                    ctx.emit_world(WorldPayload::ToolResult {
                        chat_id: ctx.chat_id.clone(),
                        execution_id: ctx.execution_id.clone(),
                        tool_name: TOOL_SHELL_CMD.to_string(),
                        exit_code: Some(code),
                    })
                    .await;
                    Ok(ToolCallContent::json(&serde_json::json!({"exitCode": code, "status": "ok"})))
                } else {
                    self.registry.transition(&ctx.execution_id, ExecutionState::Failed).await;
                    ctx.emit_world(WorldPayload::ToolResult {
                        chat_id: ctx.chat_id.clone(),
                        execution_id: ctx.execution_id.clone(),
                        tool_name: TOOL_SHELL_CMD.to_string(),
                        exit_code: Some(code),
                    })
                    .await;
                    Ok(ToolCallContent::json(&serde_json::json!({"exitCode": code, "status": "failed"})))
                }
            }
            Err(e) => {
                self.registry.transition(&ctx.execution_id, ExecutionState::Failed).await;
                ctx.emit_world(WorldPayload::ToolError {
                    chat_id: ctx.chat_id.clone(),
                    execution_id: ctx.execution_id.clone(),
                    tool_name: TOOL_SHELL_CMD.to_string(),
                    message: e.to_string(),
                })
                .await;
                Err(ToolError::ExecutionFailed(e.to_string()))
            }
        }
    }
}

fn spawn_stream_task<R>(
    ctx: &ToolCallContext,
    pipe: Option<R>,
    stream_kind: SseStreamKind,
) -> tokio::task::JoinHandle<usize>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let ctx_chat_id = ctx.chat_id.clone();
    let ctx_message_id = ctx.message_id.clone();
    let ctx_execution_id = ctx.execution_id.clone();
    let bus = ctx.bus.clone();
    tokio::spawn(async move {
        let Some(pipe) = pipe else { return 0 };
        let mut reader = BufReader::new(pipe).lines();
        let mut total = 0usize;
        while let Ok(Some(line)) = reader.next_line().await {
            total += line.len();
            let payload = stream_event::payload::SsePayload::ToolStream {
                message_id: ctx_message_id.clone(),
                stream: stream_kind,
                content: line,
            };
            let _ = bus
                .publish(
                    stream_event::Channel::Sse,
                    Some(ctx_chat_id.clone()),
                    serde_json::to_value(&payload).unwrap_or_default(),
                    serde_json::Value::Null,
                )
                .await;
        }
        let _ = ctx_execution_id;
        total
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests_support::InMemoryStorage;
    use std::sync::Arc;

    fn ctx(bus: Arc<crate::bus::EventBus>) -> ToolCallContext {
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
    async fn missing_directory_and_no_default_errors() {
        let registry = Arc::new(ShellExecutionRegistry::new());
        let tool = ShellCmdTool::new(registry, None);
        let bus = Arc::new(crate::bus::EventBus::new("w1", Arc::new(InMemoryStorage::default())));
        let c = ctx(bus);
        let result = tool
            .call(serde_json::json!({"command": "echo", "args": ["hi"]}), &c)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn successful_command_returns_minimal_result() {
        let registry = Arc::new(ShellExecutionRegistry::new());
        let tool = ShellCmdTool::new(registry, Some(PathBuf::from("/tmp")));
        let bus = Arc::new(crate::bus::EventBus::new("w1", Arc::new(InMemoryStorage::default())));
        let c = ctx(bus);
        let result = tool
            .call(serde_json::json!({"command": "true", "args": []}), &c)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&result.text).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["exitCode"], 0);
    }
}
