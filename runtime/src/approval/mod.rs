//! Approval Gate (§4.5): per-world, per-chat cache of tool approval scopes plus a
//! short-lived denial cache, and the natural-language grammar (§6) that drives both.

mod grammar;

pub use grammar::{parse_approval_command, ApprovalDecision};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::model::ToolCall;

const DENIAL_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalScope {
    Once,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// No approval needed, or a prior grant covers this call.
    Allowed,
    /// No applicable grant on record; inject `client.requestApproval` (§4.4 step 1).
    RequiresApproval,
    /// Denied within the last 5 minutes (§4.5).
    RecentlyDenied,
}

#[derive(Eq, PartialEq, Hash, Clone)]
struct ChatTool {
    chat_id: String,
    tool_name: String,
}

/// Tool-call arguments for the synthetic `client.requestApproval` assistant
/// message the gate injects (§4.4 step 1).
pub const SYNTHETIC_TOOL_REQUEST_APPROVAL: &str = "client.requestApproval";

#[derive(Default)]
pub struct ApprovalGate {
    /// `(chatId, toolName) -> scope`, scoped per world via the caller keying one
    /// gate instance per world (§4.5: "per-world, per-session cache").
    grants: Mutex<HashMap<ChatTool, ApprovalScope>>,
    denials: Mutex<HashMap<ChatTool, Instant>>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates whether `tool_name` may execute in `chat_id` right now. Consumes an
    /// `Once` grant if one applies (§4.5: "approve_once is consumed by the next
    /// execution").
    pub async fn check(&self, chat_id: &str, tool_name: &str, requires_approval: bool) -> ApprovalStatus {
        if !requires_approval {
            return ApprovalStatus::Allowed;
        }

        let key = ChatTool {
            chat_id: chat_id.to_string(),
            tool_name: tool_name.to_string(),
        };

        {
            let mut denials = self.denials.lock().await;
            if let Some(at) = denials.get(&key) {
                if at.elapsed() < DENIAL_TTL {
                    return ApprovalStatus::RecentlyDenied;
                }
                denials.remove(&key);
            }
        }

        let mut grants = self.grants.lock().await;
        match grants.get(&key).copied() {
            Some(ApprovalScope::Session) => ApprovalStatus::Allowed,
            Some(ApprovalScope::Once) => {
                grants.remove(&key);
                ApprovalStatus::Allowed
            }
            None => ApprovalStatus::RequiresApproval,
        }
    }

    /// Parses `text` as a natural-language approval/denial for `tool_name` and
    /// records the decision. Returns `true` if `text` matched the grammar.
    pub async fn apply_natural_language(&self, chat_id: &str, tool_name: &str, text: &str) -> bool {
        let Some(decision) = parse_approval_command(text, tool_name) else {
            return false;
        };
        let key = ChatTool {
            chat_id: chat_id.to_string(),
            tool_name: tool_name.to_string(),
        };
        match decision {
            ApprovalDecision::ApproveOnce => {
                self.grants.lock().await.insert(key, ApprovalScope::Once);
            }
            ApprovalDecision::ApproveSession => {
                self.grants.lock().await.insert(key, ApprovalScope::Session);
            }
            ApprovalDecision::Deny => {
                self.denials.lock().await.insert(key, Instant::now());
            }
        }
        true
    }

    /// Builds the synthetic assistant tool-call arguments for a pending approval
    /// request (§4.4 step 1).
    pub fn build_request_arguments(original_tool_call: &ToolCall, message: impl Into<String>) -> serde_json::Value {
        serde_json::json!({
            "originalToolCall": {
                "id": original_tool_call.id,
                "name": original_tool_call.function_name,
                "arguments": original_tool_call.arguments,
            },
            "message": message.into(),
            "options": ["deny", "approve_once", "approve_session"],
        })
    }
}
