//! Message commands: `send-message`, `edit-message`, `delete-message`, `stop`
//! (§6).
//!
//! `message_id` is unique within a world (§3), so `edit-message` and
//! `delete-message` locate the target by scanning every agent's memory rather than
//! requiring the client to also name a chat or agent.

use chrono::{DateTime, Utc};
use runtime::model::Role;
use runtime::WorldError;

use crate::protocol::{ClientCommand, ErrorBody, ResponseKind, ServerMessage};
use crate::state::ServerState;

pub async fn send_message(state: &ServerState, world_id: &str, chat_id: &str, content: String, sender: String) -> ServerMessage {
    if content.trim().is_empty() {
        return ServerMessage::err(Some(ResponseKind::SendMessage), ErrorBody::validation("message content must not be empty"));
    }
    if state.storage.get_world(world_id).await.ok().flatten().is_none() {
        return err(ResponseKind::SendMessage, &WorldError::NotFound(format!("world {world_id}")));
    }
    if state.storage.get_chat(world_id, chat_id).await.ok().flatten().is_none() {
        return err(ResponseKind::SendMessage, &WorldError::NotFound(format!("chat {chat_id}")));
    }

    let queue = state.queue_manager.get_or_create(world_id, chat_id, state.dispatcher.clone()).await;
    let item_id = queue.enqueue(sender, true, content).await;
    ServerMessage::ok(ResponseKind::SendMessage, serde_json::json!({ "queuedItemId": item_id }))
}

struct FoundMessage {
    chat_id: String,
    created_at: DateTime<Utc>,
    role: Role,
    sender: Option<String>,
}

async fn find_message(state: &ServerState, world_id: &str, message_id: &str) -> Result<(Vec<runtime::model::Agent>, FoundMessage), WorldError> {
    let agents = state.storage.list_agents(world_id).await?;
    let found = agents.iter().flat_map(|a| a.memory.iter()).find(|m| m.message_id == message_id).map(|m| FoundMessage {
        chat_id: m.chat_id.clone().unwrap_or_default(),
        created_at: m.created_at,
        role: m.role,
        sender: m.sender.clone(),
    });
    match found {
        Some(f) => Ok((agents, f)),
        None => Err(WorldError::NotFound(format!("message {message_id}"))),
    }
}

/// Truncates every agent's memory for `found.chat_id` at `found.created_at`
/// (inclusive), i.e. drops the target message and everything sent after it in
/// that chat. Messages belonging to other chats are untouched.
async fn truncate_from(state: &ServerState, world_id: &str, agents: &[runtime::model::Agent], found: &FoundMessage) -> Result<(), WorldError> {
    for agent in agents {
        let retained: Vec<_> = agent
            .memory
            .iter()
            .cloned()
            .filter(|m| !(m.chat_id.as_deref() == Some(found.chat_id.as_str()) && m.created_at >= found.created_at))
            .collect();
        state.storage.rewrite_agent_memory(world_id, &agent.id, retained).await?;
    }
    Ok(())
}

/// Removes `message_id` and every later message in its chat from all agent
/// memory, then resubmits `new_content` as a fresh queue item from the original
/// sender (§6: "removes the message and all later messages from every agent's
/// memory, then resubmits").
pub async fn edit_message(state: &ServerState, world_id: &str, message_id: &str, new_content: String) -> ServerMessage {
    let (agents, found) = match find_message(state, world_id, message_id).await {
        Ok(v) => v,
        Err(e) => return err(ResponseKind::EditMessage, &e),
    };
    if let Err(e) = truncate_from(state, world_id, &agents, &found).await {
        return err(ResponseKind::EditMessage, &e);
    }

    let sender_is_human = matches!(found.role, Role::User);
    let sender = found.sender.unwrap_or_else(|| "human".to_string());
    let queue = state.queue_manager.get_or_create(world_id, &found.chat_id, state.dispatcher.clone()).await;
    let item_id = queue.enqueue(sender, sender_is_human, new_content).await;
    ServerMessage::ok(ResponseKind::EditMessage, serde_json::json!({ "queuedItemId": item_id }))
}

/// Removes `message_id` and every later message in its chat from all agent
/// memory, without resubmitting anything. A later message in the same chat is
/// dropped too because it was generated in response to context that no longer
/// exists once the target message is gone.
pub async fn delete_message(state: &ServerState, world_id: &str, message_id: &str) -> ServerMessage {
    let (agents, found) = match find_message(state, world_id, message_id).await {
        Ok(v) => v,
        Err(e) => return err(ResponseKind::DeleteMessage, &e),
    };
    match truncate_from(state, world_id, &agents, &found).await {
        Ok(()) => ServerMessage::ok_empty(ResponseKind::DeleteMessage),
        Err(e) => err(ResponseKind::DeleteMessage, &e),
    }
}

/// Cancels the in-flight dispatch for `chat_id`, discards anything queued behind
/// it, and cancels any shell executions the in-flight turn started (§5
/// "Cancellation", §8 scenario 4).
pub async fn stop(state: &ServerState, world_id: &str, chat_id: &str) -> ServerMessage {
    if let Some(queue) = state.queue_manager.get(world_id, chat_id).await {
        queue.stop().await;
    }
    state.shell_executions.cancel_for_chat(chat_id).await;
    ServerMessage::ok_empty(ResponseKind::Stop)
}

fn err(kind: ResponseKind, e: &WorldError) -> ServerMessage {
    ServerMessage::err(Some(kind), ErrorBody::from_world_error(e))
}

pub async fn try_handle(state: &ServerState, command: &ClientCommand) -> Option<ServerMessage> {
    Some(match command {
        ClientCommand::SendMessage { world_id, chat_id, content, sender } => {
            send_message(state, world_id, chat_id, content.clone(), sender.clone()).await
        }
        ClientCommand::EditMessage { world_id, message_id, new_content } => edit_message(state, world_id, message_id, new_content.clone()).await,
        ClientCommand::DeleteMessage { world_id, message_id } => delete_message(state, world_id, message_id).await,
        ClientCommand::Stop { world_id, chat_id } => stop(state, world_id, chat_id).await,
        _ => return None,
    })
}
