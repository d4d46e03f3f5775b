use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat-log role, matching the OpenAI-style roles the teacher's `llm` module speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in an agent's memory: the full OpenAI-style chat log visible to it (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
    /// Display name of the human or agent that authored this message, if not the
    /// agent itself (e.g. the sender of a `user` message).
    pub sender: Option<String>,
    pub chat_id: Option<String>,
    /// Stable 10-char id, unique within a world (§3 invariant).
    pub message_id: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Present on `tool`-role messages; matches a prior assistant `tool_calls[].id`.
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        AgentMessage {
            role,
            content: content.into(),
            sender: None,
            chat_id: None,
            message_id: super::short_id(),
            tool_calls: None,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// `true` if this message is a `client.*` assistant tool-call or an
    /// `approval_*`-tagged tool result — internal mechanics that must never reach the
    /// LLM (§4.3 step 6b, §8 invariant).
    pub fn is_internal_mechanic(&self) -> bool {
        if let Some(calls) = &self.tool_calls {
            if calls.iter().any(|c| c.function_name.starts_with("client.")) {
                return true;
            }
        }
        if let Some(id) = &self.tool_call_id {
            if id.starts_with("approval_") {
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function_name: String,
    pub arguments: serde_json::Value,
}

/// An LLM-backed participant with a system prompt, tool access, and per-chat memory
/// (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// kebab-case of `name`.
    pub id: String,
    pub world_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub llm_provider: String,
    pub llm_model: String,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub auto_reply: bool,
    pub memory: Vec<AgentMessage>,
}

impl Agent {
    pub fn new(world_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Agent {
            id: kebab_case(&name),
            world_id: world_id.into(),
            name,
            agent_type: "assistant".to_string(),
            llm_provider: "openai".to_string(),
            llm_model: String::new(),
            system_prompt: String::new(),
            temperature: None,
            max_tokens: None,
            auto_reply: true,
            memory: Vec::new(),
        }
    }

    /// Memory filtered to one chat, in order -- the view used when switching chats
    /// (§3) and when building LLM input (§4.3 step 6b.i).
    pub fn memory_for_chat<'a>(&'a self, chat_id: &str) -> Vec<&'a AgentMessage> {
        self.memory
            .iter()
            .filter(|m| m.chat_id.as_deref() == Some(chat_id))
            .collect()
    }
}

/// Converts an agent display name to a kebab-case id, e.g. `"Code Reviewer"` ->
/// `"code-reviewer"`.
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_dash = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash && !out.is_empty() {
            out.push('-');
            prev_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_case_converts_spaces_and_case() {
        assert_eq!(kebab_case("Code Reviewer"), "code-reviewer");
        assert_eq!(kebab_case("a1"), "a1");
        assert_eq!(kebab_case("  Weird__Name  "), "weird-name");
    }

    #[test]
    fn internal_mechanic_detects_client_tool_call() {
        let mut m = AgentMessage::new(Role::Assistant, "");
        m.tool_calls = Some(vec![ToolCall {
            id: "approval_1".into(),
            function_name: "client.requestApproval".into(),
            arguments: serde_json::json!({}),
        }]);
        assert!(m.is_internal_mechanic());
    }

    #[test]
    fn internal_mechanic_detects_approval_tool_result() {
        let mut m = AgentMessage::new(Role::Tool, "approved");
        m.tool_call_id = Some("approval_42".into());
        assert!(m.is_internal_mechanic());
    }

    #[test]
    fn ordinary_message_is_not_internal_mechanic() {
        let m = AgentMessage::new(Role::User, "hello");
        assert!(!m.is_internal_mechanic());
    }

    #[test]
    fn memory_for_chat_filters_by_chat_id() {
        let mut agent = Agent::new("w1", "Bot");
        agent.memory.push(AgentMessage::new(Role::User, "a").with_chat("c1"));
        agent.memory.push(AgentMessage::new(Role::User, "b").with_chat("c2"));
        agent.memory.push(AgentMessage::new(Role::User, "c").with_chat("c1"));
        let filtered = agent.memory_for_chat("c1");
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].content, "a");
        assert_eq!(filtered[1].content, "c");
    }
}
