//! The message-processing pipeline (§4.3): mention resolution, eligibility,
//! turn limiting, per-agent serialization, the LLM/tool loop, and the idle hook.

mod eligibility;
mod filter;
mod mentions;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use stream_event::payload::{MessagePayload, Role as WireRole, WorldPayload};
use stream_event::Channel;

use crate::approval::ApprovalGate;
use crate::error::WorldError;
use crate::execution::{ExecutionOutcome, ToolExecutionManager};
use crate::hitl::HitlCoordinator;
use crate::llm::{LlmClient, LlmMessage, LlmQueue, LlmRequest, StreamChunk, ToolChoiceMode};
use crate::model::{self, Agent, AgentMessage, Role, ToolCall, World};
use crate::registry::{WorldRegistry, WorldRuntime};
use crate::storage::Storage;
use crate::tools::{ToolCallContext, ToolRegistry};

use eligibility::agent_is_eligible;
use filter::{filter_for_llm, interpolate_variables};
use mentions::{apply_main_agent_routing, direct_mentions};

const TITLE_MAX_WORDS: usize = 6;

/// A tool call halted pending a human approval decision (§4.4 step 1). Kept so a
/// later natural-language reply in the same chat resumes exactly this call.
#[derive(Clone)]
struct PendingApproval {
    tool_call: ToolCall,
    agent_id: String,
    message_id: String,
    execution_id: String,
    working_directory: Option<PathBuf>,
}

/// Ties the pure mention/eligibility/filter helpers to live storage, the LLM
/// queue, and tool execution -- one instance serves every loaded world.
pub struct Orchestrator {
    storage: Arc<dyn Storage>,
    registry: Arc<WorldRegistry>,
    llm_queue: Arc<LlmQueue>,
    llm_clients: HashMap<String, Arc<dyn LlmClient>>,
    tools: Arc<ToolRegistry>,
    execution: Arc<ToolExecutionManager>,
    approval: Arc<ApprovalGate>,
    hitl: Arc<HitlCoordinator>,
    pending_approvals: Mutex<HashMap<(String, String), PendingApproval>>,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        registry: Arc<WorldRegistry>,
        llm_queue: Arc<LlmQueue>,
        llm_clients: HashMap<String, Arc<dyn LlmClient>>,
        tools: Arc<ToolRegistry>,
        execution: Arc<ToolExecutionManager>,
        approval: Arc<ApprovalGate>,
        hitl: Arc<HitlCoordinator>,
    ) -> Self {
        Orchestrator {
            storage,
            registry,
            llm_queue,
            llm_clients,
            tools,
            execution,
            approval,
            hitl,
            pending_approvals: Mutex::new(HashMap::new()),
        }
    }

    /// Entry point for one inbound message: a human chat submission, or an
    /// agent's own reply continuing a `@mention` chain (§4.3 steps 1-6).
    ///
    /// `cancel` is the token a message-queue `stop` control cancels; it is
    /// threaded down into the LLM queue and every tool call this message's
    /// processing spawns, so aborting it abandons in-flight work immediately.
    pub async fn handle_message(
        &self,
        world_id: &str,
        chat_id: &str,
        sender_id: &str,
        sender_is_human: bool,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<(), WorldError> {
        let runtime = self.registry.load(world_id, self.storage.clone()).await?;
        let world = self
            .storage
            .get_world(world_id)
            .await?
            .ok_or_else(|| WorldError::NotFound(format!("world {world_id}")))?;

        if self.hitl.try_resolve(chat_id, content).await {
            self.publish_message(&runtime, chat_id, sender_id, sender_is_human, content).await?;
            return Ok(());
        }

        let key = (world_id.to_string(), chat_id.to_string());
        if let Some(pending) = self.pending_approvals.lock().await.get(&key).cloned() {
            if self.approval.apply_natural_language(chat_id, &pending.tool_call.function_name, content).await {
                self.pending_approvals.lock().await.remove(&key);
                self.publish_message(&runtime, chat_id, sender_id, sender_is_human, content).await?;
                self.resume_pending(&world, &runtime, chat_id, pending, cancel).await?;
                return Ok(());
            }
        }

        let rewritten = apply_main_agent_routing(content, world.main_agent.as_deref(), sender_is_human);
        let mentions = direct_mentions(&rewritten);
        self.publish_message(&runtime, chat_id, sender_id, sender_is_human, &rewritten).await?;

        if runtime.turn_count(chat_id).await >= world.turn_limit {
            if runtime.mark_turn_limit_notified(chat_id).await {
                runtime
                    .bus
                    .publish(
                        Channel::System,
                        Some(chat_id.to_string()),
                        serde_json::to_value(stream_event::payload::SystemPayload::new(
                            "turn-limit-reached",
                            serde_json::json!({"chatId": chat_id, "turnLimit": world.turn_limit}),
                        ))
                        .unwrap_or_default(),
                        serde_json::Value::Null,
                    )
                    .await?;
            }
            return Ok(());
        }

        let agents = self.storage.list_agents(world_id).await?;
        let eligible: Vec<Agent> = agents
            .into_iter()
            .filter(|a| agent_is_eligible(&a.id, sender_id, sender_is_human, &mentions, !a.auto_reply))
            .collect();

        for agent in eligible {
            self.run_agent_turn(&world, &runtime, chat_id, agent, sender_id, &rewritten, cancel.clone()).await?;
        }

        runtime
            .bus
            .publish(
                Channel::World,
                Some(chat_id.to_string()),
                serde_json::to_value(WorldPayload::Idle { chat_id: chat_id.to_string() }).unwrap_or_default(),
                serde_json::Value::Null,
            )
            .await?;

        self.maybe_generate_title(&world, chat_id).await;
        Ok(())
    }

    async fn publish_message(
        &self,
        runtime: &WorldRuntime,
        chat_id: &str,
        sender_id: &str,
        sender_is_human: bool,
        content: &str,
    ) -> Result<(), WorldError> {
        let payload = MessagePayload {
            message_id: model::short_id(),
            chat_id: chat_id.to_string(),
            role: if sender_is_human { WireRole::User } else { WireRole::Assistant },
            content: content.to_string(),
            sender: Some(sender_id.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        };
        runtime
            .bus
            .publish(
                Channel::Message,
                Some(chat_id.to_string()),
                serde_json::to_value(&payload).unwrap_or_default(),
                serde_json::Value::Null,
            )
            .await?;
        Ok(())
    }

    /// Serializes one agent's response to an inbound message under its lock
    /// (§4.3 step 5), then drives the LLM/tool loop to completion or halt.
    async fn run_agent_turn(
        &self,
        world: &World,
        runtime: &WorldRuntime,
        chat_id: &str,
        agent: Agent,
        sender_id: &str,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<(), WorldError> {
        let lock = runtime.agent_lock(&agent.id).await;
        let _guard = lock.lock().await;

        if runtime.turn_count(chat_id).await >= world.turn_limit {
            return Ok(());
        }
        runtime.increment_turn(chat_id).await;

        let inbound = AgentMessage::new(Role::User, content)
            .with_chat(chat_id)
            .with_sender(sender_id);
        self.storage.append_agent_message(&world.id, &agent.id, inbound).await?;

        self.run_completion_loop(world, runtime, chat_id, &agent.id, cancel).await
    }

    /// Resumes processing for a tool call that was halted pending approval. The
    /// decision is already on record in [`ApprovalGate`]; re-executing re-evaluates it.
    async fn resume_pending(
        &self,
        world: &World,
        runtime: &WorldRuntime,
        chat_id: &str,
        pending: PendingApproval,
        cancel: CancellationToken,
    ) -> Result<(), WorldError> {
        let lock = runtime.agent_lock(&pending.agent_id).await;
        let _guard = lock.lock().await;
        self.dispatch_tool_call(
            world,
            runtime,
            chat_id,
            &pending.agent_id,
            pending.tool_call,
            pending.message_id,
            pending.execution_id,
            pending.working_directory,
            cancel.clone(),
        )
        .await?;
        self.run_completion_loop(world, runtime, chat_id, &pending.agent_id, cancel).await
    }

    /// Repeatedly submits `agent_id`'s memory to its configured LLM, dispatches any
    /// requested tool calls, and resubmits with their results until the model
    /// replies with no further tool calls, or a tool call halts on approval
    /// (§4.3 step 6).
    async fn run_completion_loop(
        &self,
        world: &World,
        runtime: &WorldRuntime,
        chat_id: &str,
        agent_id: &str,
        cancel: CancellationToken,
    ) -> Result<(), WorldError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let Some(agent) = self.storage.get_agent(&world.id, agent_id).await? else {
                return Ok(());
            };
            let client = self
                .llm_clients
                .get(&agent.llm_provider)
                .ok_or_else(|| WorldError::Llm(format!("no llm client configured for provider {}", agent.llm_provider)))?
                .clone();

            let memory = self.storage.load_agent_memory(&world.id, agent_id, Some(chat_id)).await?;
            let filtered = filter_for_llm(&memory);
            let system_prompt = interpolate_variables(&agent.system_prompt, &world.variable_map());

            let mut messages = Vec::with_capacity(filtered.len() + 1);
            if !system_prompt.is_empty() {
                messages.push(LlmMessage {
                    role: Role::System,
                    content: system_prompt,
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                });
            }
            for m in filtered {
                messages.push(LlmMessage {
                    role: m.role,
                    content: m.content.clone(),
                    tool_calls: m.tool_calls.clone().unwrap_or_default(),
                    tool_call_id: m.tool_call_id.clone(),
                });
            }

            let request = LlmRequest {
                provider: agent.llm_provider.clone(),
                model: agent.llm_model.clone(),
                messages,
                tools: self.tools.list(),
                tool_choice: ToolChoiceMode::Auto,
                temperature: agent.temperature,
                max_tokens: agent.max_tokens,
                stream: true,
            };

            let message_id = model::short_id();
            runtime
                .bus
                .publish(
                    Channel::World,
                    Some(chat_id.to_string()),
                    serde_json::to_value(WorldPayload::ResponseStart {
                        chat_id: chat_id.to_string(),
                        agent_id: agent_id.to_string(),
                        message_id: message_id.clone(),
                    })
                    .unwrap_or_default(),
                    serde_json::Value::Null,
                )
                .await?;

            let (content, tool_calls) = self
                .stream_completion(runtime, chat_id, &message_id, client, request, cancel.clone())
                .await?;

            runtime
                .bus
                .publish(
                    Channel::World,
                    Some(chat_id.to_string()),
                    serde_json::to_value(WorldPayload::ResponseEnd {
                        chat_id: chat_id.to_string(),
                        agent_id: agent_id.to_string(),
                        message_id: message_id.clone(),
                    })
                    .unwrap_or_default(),
                    serde_json::Value::Null,
                )
                .await?;

            let mut assistant_message = AgentMessage::new(Role::Assistant, content.clone()).with_chat(chat_id);
            assistant_message.message_id = message_id.clone();
            if !tool_calls.is_empty() {
                assistant_message.tool_calls = Some(tool_calls.clone());
            }
            self.storage
                .append_agent_message(&world.id, agent_id, assistant_message)
                .await?;

            self.publish_message(runtime, chat_id, agent_id, false, &content).await?;

            if tool_calls.is_empty() {
                for mentioned in direct_mentions(&content) {
                    if mentioned != agent_id {
                        Box::pin(self.handle_message(&world.id, chat_id, agent_id, false, &content, cancel.clone())).await?;
                    }
                }
                return Ok(());
            }

            let mut halted = false;
            for tool_call in tool_calls {
                let execution_id = model::short_id();
                let working_directory = world.variable_map().get("working_directory").map(PathBuf::from);
                let outcome = self
                    .dispatch_tool_call(
                        world,
                        runtime,
                        chat_id,
                        agent_id,
                        tool_call,
                        message_id.clone(),
                        execution_id,
                        working_directory,
                        cancel.clone(),
                    )
                    .await?;
                if outcome {
                    halted = true;
                }
            }
            if halted || cancel.is_cancelled() {
                return Ok(());
            }
        }
    }

    /// Runs one tool call through the execution manager, appends the outcome to
    /// memory, and records a [`PendingApproval`] if execution halted. Returns
    /// `true` if processing should stop for this agent this round.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_tool_call(
        &self,
        world: &World,
        runtime: &WorldRuntime,
        chat_id: &str,
        agent_id: &str,
        tool_call: ToolCall,
        message_id: String,
        execution_id: String,
        working_directory: Option<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<bool, WorldError> {
        let ctx = ToolCallContext {
            world_id: world.id.clone(),
            chat_id: chat_id.to_string(),
            agent_id: agent_id.to_string(),
            message_id,
            execution_id: execution_id.clone(),
            working_directory,
            bus: runtime.bus.clone(),
            cancel,
        };

        match self.execution.execute(&tool_call, ctx).await? {
            ExecutionOutcome::Completed(content) => {
                let tool_message = AgentMessage::new(Role::Tool, content.text)
                    .with_chat(chat_id)
                    .tap_tool_call_id(tool_call.id);
                self.storage.append_agent_message(&world.id, agent_id, tool_message).await?;
                Ok(false)
            }
            ExecutionOutcome::RequiresApproval { request_arguments } => {
                let approval_call = ToolCall {
                    id: format!("approval_{}", tool_call.id),
                    function_name: crate::approval::SYNTHETIC_TOOL_REQUEST_APPROVAL.to_string(),
                    arguments: request_arguments,
                };
                let mut synthetic = AgentMessage::new(Role::Assistant, "").with_chat(chat_id);
                synthetic.tool_calls = Some(vec![approval_call]);
                self.storage.append_agent_message(&world.id, agent_id, synthetic).await?;

                self.pending_approvals.lock().await.insert(
                    (world.id.clone(), chat_id.to_string()),
                    PendingApproval {
                        tool_call,
                        agent_id: agent_id.to_string(),
                        message_id: model::short_id(),
                        execution_id,
                        working_directory: world.variable_map().get("working_directory").map(PathBuf::from),
                    },
                );
                Ok(true)
            }
            ExecutionOutcome::RecentlyDenied => {
                let tool_message = AgentMessage::new(Role::Tool, r#"{"error":"recently denied"}"#)
                    .with_chat(chat_id)
                    .tap_tool_call_id(tool_call.id);
                self.storage.append_agent_message(&world.id, agent_id, tool_message).await?;
                Ok(false)
            }
        }
    }

    /// Pulls `StreamChunk`s off the queue, forwarding token deltas and tool-call
    /// fragments onto the `sse` channel, and returns the assembled content plus
    /// finalized tool calls once the stream ends (§4.2, §4.3 step 6b.iv).
    async fn stream_completion(
        &self,
        runtime: &WorldRuntime,
        chat_id: &str,
        message_id: &str,
        client: Arc<dyn LlmClient>,
        request: LlmRequest,
        cancel: CancellationToken,
    ) -> Result<(String, Vec<ToolCall>), WorldError> {
        use stream_event::payload::SsePayload;

        let mut rx = self.llm_queue.enqueue(client, request, cancel)?;
        let mut content = String::new();
        let mut deltas: HashMap<String, (String, String)> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::Start => {
                    runtime
                        .bus
                        .publish(
                            Channel::Sse,
                            Some(chat_id.to_string()),
                            serde_json::to_value(SsePayload::Start { message_id: message_id.to_string() }).unwrap_or_default(),
                            serde_json::Value::Null,
                        )
                        .await?;
                }
                StreamChunk::Chunk { content: delta, tool_call_delta } => {
                    if let Some(text) = &delta {
                        content.push_str(text);
                    }
                    if let Some(d) = tool_call_delta {
                        if !deltas.contains_key(&d.id) {
                            order.push(d.id.clone());
                        }
                        let entry = deltas.entry(d.id).or_insert_with(|| (d.name.clone(), String::new()));
                        entry.0 = if d.name.is_empty() { entry.0.clone() } else { d.name };
                        entry.1.push_str(&d.arguments_fragment);
                    }
                    runtime
                        .bus
                        .publish(
                            Channel::Sse,
                            Some(chat_id.to_string()),
                            serde_json::to_value(SsePayload::Chunk { message_id: message_id.to_string(), content: delta }).unwrap_or_default(),
                            serde_json::Value::Null,
                        )
                        .await?;
                }
                StreamChunk::End { usage } => {
                    let payload = SsePayload::End {
                        message_id: message_id.to_string(),
                        usage: usage.map(|u| stream_event::payload::UsagePayload {
                            prompt_tokens: u.prompt_tokens,
                            completion_tokens: u.completion_tokens,
                            total_tokens: u.total_tokens,
                        }),
                        cancelled: false,
                    };
                    runtime
                        .bus
                        .publish(Channel::Sse, Some(chat_id.to_string()), serde_json::to_value(payload).unwrap_or_default(), serde_json::Value::Null)
                        .await?;
                    break;
                }
                StreamChunk::Error { message } => {
                    runtime
                        .bus
                        .publish(
                            Channel::Sse,
                            Some(chat_id.to_string()),
                            serde_json::to_value(SsePayload::Error { message_id: message_id.to_string(), message: message.clone() }).unwrap_or_default(),
                            serde_json::Value::Null,
                        )
                        .await?;
                    return Err(WorldError::Llm(message));
                }
            }
        }

        let tool_calls = order
            .into_iter()
            .filter_map(|id| {
                let (name, args) = deltas.remove(&id)?;
                let arguments = serde_json::from_str(&args).unwrap_or(serde_json::Value::Object(Default::default()));
                Some(ToolCall { id, function_name: name, arguments })
            })
            .collect();

        Ok((content, tool_calls))
    }

    /// One-shot, non-streaming title-generation call for a chat still on its
    /// default title (§4.3 step 7). Failures are logged, never propagated --
    /// idle-hook summarization is best-effort.
    async fn maybe_generate_title(&self, world: &World, chat_id: &str) {
        let Ok(Some(chat)) = self.storage.get_chat(&world.id, chat_id).await else { return };
        if !chat.has_default_title() {
            return;
        }
        let Some(client) = self.llm_clients.values().next().cloned() else { return };

        let request = LlmRequest {
            provider: "title".to_string(),
            model: String::new(),
            messages: vec![LlmMessage {
                role: Role::User,
                content: format!("Summarize this conversation's topic in {TITLE_MAX_WORDS} words or fewer, no punctuation."),
                tool_calls: Vec::new(),
                tool_call_id: None,
            }],
            tools: Vec::new(),
            tool_choice: ToolChoiceMode::None,
            temperature: None,
            max_tokens: Some(32),
            stream: false,
        };

        match client.invoke(request).await {
            Ok(response) => {
                let title: String = response.content.split_whitespace().take(TITLE_MAX_WORDS).collect::<Vec<_>>().join(" ");
                if title.is_empty() {
                    return;
                }
                let mut updated = chat;
                updated.name = title.clone();
                if self.storage.update_chat(updated).await.is_ok() {
                    let runtime = self.registry.get(&world.id).await;
                    if let Some(runtime) = runtime {
                        let _ = runtime
                            .bus
                            .publish(
                                Channel::System,
                                Some(chat_id.to_string()),
                                serde_json::to_value(stream_event::payload::SystemPayload::new(
                                    "chat-title-updated",
                                    serde_json::json!({"chatId": chat_id, "title": title}),
                                ))
                                .unwrap_or_default(),
                                serde_json::Value::Null,
                            )
                            .await;
                    }
                }
            }
            Err(e) => warn!(chat_id, error = %e, "idle-hook title generation failed"),
        }
    }
}

#[async_trait::async_trait]
impl crate::queue::MessageDispatcher for Orchestrator {
    async fn dispatch(
        &self,
        world_id: &str,
        chat_id: &str,
        sender_id: &str,
        sender_is_human: bool,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<(), WorldError> {
        self.handle_message(world_id, chat_id, sender_id, sender_is_human, content, cancel).await
    }
}

trait TapToolCallId {
    fn tap_tool_call_id(self, id: String) -> Self;
}

impl TapToolCallId for AgentMessage {
    fn tap_tool_call_id(mut self, id: String) -> Self {
        self.tool_call_id = Some(id);
        self
    }
}
