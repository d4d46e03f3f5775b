//! Transport-agnostic command/RPC surface (§6) and the responses/events framed
//! over it. One [`ClientCommand`] per inbound WebSocket text frame; one
//! [`ServerMessage`] per outbound frame -- either a direct reply to a command or
//! a live [`stream_event::WireEvent`] forwarded from a subscription.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use runtime::model::{Agent, Chat, World};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ClientCommand {
    // -- World --
    ListWorlds,
    CreateWorld {
        name: String,
        #[serde(default)]
        description: String,
    },
    GetWorld {
        world_id: String,
    },
    UpdateWorld {
        world_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        turn_limit: Option<u32>,
        #[serde(default)]
        main_agent: Option<Option<String>>,
        #[serde(default)]
        variables: Option<String>,
    },
    DeleteWorld {
        world_id: String,
    },
    ExportWorld {
        world_id: String,
    },

    // -- Agent --
    ListAgents {
        world_id: String,
    },
    CreateAgent {
        world_id: String,
        name: String,
        #[serde(default)]
        system_prompt: String,
        #[serde(default)]
        llm_provider: Option<String>,
        #[serde(default)]
        llm_model: Option<String>,
    },
    UpdateAgent {
        world_id: String,
        agent_id: String,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        llm_provider: Option<String>,
        #[serde(default)]
        llm_model: Option<String>,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        auto_reply: Option<bool>,
    },
    DeleteAgent {
        world_id: String,
        agent_id: String,
    },

    // -- Chat --
    ListChats {
        world_id: String,
    },
    NewChat {
        world_id: String,
    },
    DeleteChat {
        world_id: String,
        chat_id: String,
    },
    BranchChat {
        world_id: String,
        chat_id: String,
        from_message_id: String,
    },

    // -- Message --
    SendMessage {
        world_id: String,
        chat_id: String,
        content: String,
        sender: String,
    },
    EditMessage {
        world_id: String,
        message_id: String,
        new_content: String,
    },
    DeleteMessage {
        world_id: String,
        message_id: String,
    },
    Stop {
        world_id: String,
        chat_id: String,
    },

    // -- Subscription --
    Subscribe {
        world_id: String,
        #[serde(default)]
        chat_id: Option<String>,
        #[serde(default)]
        since_seq: u64,
    },
    Unsubscribe {
        subscription_id: String,
    },

    Ping,
}

/// Which command a response answers; mirrors [`ClientCommand`]'s tag so clients
/// can correlate without threading request ids through every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseKind {
    ListWorlds,
    CreateWorld,
    GetWorld,
    UpdateWorld,
    DeleteWorld,
    ExportWorld,
    ListAgents,
    CreateAgent,
    UpdateAgent,
    DeleteAgent,
    ListChats,
    NewChat,
    DeleteChat,
    BranchChat,
    SendMessage,
    EditMessage,
    DeleteMessage,
    Stop,
    Subscribe,
    Unsubscribe,
    Pong,
}

/// One error kind surfaced to a client (§7's table, client-facing subset).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    ProcessingBusy,
    Persistence,
    Fatal,
}

impl From<&runtime::WorldError> for ErrorKind {
    fn from(err: &runtime::WorldError) -> Self {
        use runtime::WorldError::*;
        match err {
            Validation(_) => ErrorKind::Validation,
            NotFound(_) => ErrorKind::NotFound,
            ProcessingBusy(_) => ErrorKind::ProcessingBusy,
            Persistence(_) => ErrorKind::Persistence,
            Cancelled => ErrorKind::Validation,
            Llm(_) | Tool(_) | Approval(_) | Fatal(_) => ErrorKind::Fatal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    pub fn from_world_error(err: &runtime::WorldError) -> Self {
        ErrorBody {
            kind: ErrorKind::from(err),
            message: err.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ErrorBody { kind: ErrorKind::Validation, message: message.into() }
    }
}

/// One outbound WebSocket frame: a reply to a command, or a forwarded subscription
/// event (§6's four event channels, framed by [`stream_event::WireEvent`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Result {
        command: ResponseKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Error {
        command: Option<ResponseKind>,
        error: ErrorBody,
    },
    Event {
        subscription_id: String,
        event: stream_event::WireEvent,
    },
}

impl ServerMessage {
    pub fn ok(command: ResponseKind, data: impl Serialize) -> Self {
        ServerMessage::Result {
            command,
            data: serde_json::to_value(data).ok(),
        }
    }

    pub fn ok_empty(command: ResponseKind) -> Self {
        ServerMessage::Result { command, data: None }
    }

    pub fn err(command: Option<ResponseKind>, error: ErrorBody) -> Self {
        ServerMessage::Error { command, error }
    }
}

/// Response payload for `create-world` / `get-world` / `update-world`.
#[derive(Debug, Clone, Serialize)]
pub struct WorldView(pub World);

/// Response payload for `create-agent` / `update-agent`, excluding `memory` --
/// clients load memory via a subscription replay, not a CRUD response.
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
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
}

impl From<Agent> for AgentView {
    fn from(a: Agent) -> Self {
        AgentView {
            id: a.id,
            world_id: a.world_id,
            name: a.name,
            agent_type: a.agent_type,
            llm_provider: a.llm_provider,
            llm_model: a.llm_model,
            system_prompt: a.system_prompt,
            temperature: a.temperature,
            max_tokens: a.max_tokens,
            auto_reply: a.auto_reply,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatView(pub Chat);

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeAck {
    pub subscription_id: String,
}
