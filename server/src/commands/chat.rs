//! Chat commands: `list-chats`, `new-chat`, `delete-chat`, `branch-chat` (§6).
//!
//! `branch-chat` is scenario 6 of §8: the new chat's message list equals the
//! source chat's messages up to and including `from_message_id`; anything sent to
//! the source chat afterward does not appear in the branch.

use runtime::model::Chat;
use runtime::{model, WorldError};

use crate::protocol::{ChatView, ClientCommand, ErrorBody, ResponseKind, ServerMessage};
use crate::state::ServerState;

pub async fn list_chats(state: &ServerState, world_id: &str) -> ServerMessage {
    match state.storage.list_chats(world_id).await {
        Ok(chats) => ServerMessage::ok(ResponseKind::ListChats, chats.into_iter().map(ChatView).collect::<Vec<_>>()),
        Err(e) => err(ResponseKind::ListChats, &e),
    }
}

pub async fn new_chat(state: &ServerState, world_id: &str) -> ServerMessage {
    let Ok(Some(mut world)) = state.storage.get_world(world_id).await else {
        return err(ResponseKind::NewChat, &WorldError::NotFound(format!("world {world_id}")));
    };
    let chat = Chat::new(model::short_id(), world_id);
    let chat = match state.storage.create_chat(chat).await {
        Ok(c) => c,
        Err(e) => return err(ResponseKind::NewChat, &e),
    };

    world.current_chat_id = Some(chat.id.clone());
    world.updated_at = chrono::Utc::now();
    if let Err(e) = state.storage.update_world(world).await {
        return err(ResponseKind::NewChat, &e);
    }

    ServerMessage::ok(ResponseKind::NewChat, ChatView(chat))
}

pub async fn delete_chat(state: &ServerState, world_id: &str, chat_id: &str) -> ServerMessage {
    let agents = match state.storage.list_agents(world_id).await {
        Ok(a) => a,
        Err(e) => return err(ResponseKind::DeleteChat, &e),
    };
    for agent in &agents {
        if let Err(e) = state.storage.delete_agent_messages_for_chat(world_id, &agent.id, chat_id).await {
            return err(ResponseKind::DeleteChat, &e);
        }
    }
    if let Err(e) = state.storage.delete_chat(world_id, chat_id).await {
        return err(ResponseKind::DeleteChat, &e);
    }

    if let Some(runtime) = state.world_registry.get(world_id).await {
        runtime.reset_turns(chat_id).await;
    }

    if let Ok(Some(mut world)) = state.storage.get_world(world_id).await {
        if world.current_chat_id.as_deref() == Some(chat_id) {
            world.current_chat_id = state.storage.list_chats(world_id).await.ok().and_then(|mut cs| cs.pop()).map(|c| c.id);
            world.updated_at = chrono::Utc::now();
            let _ = state.storage.update_world(world).await;
        }
    }

    ServerMessage::ok_empty(ResponseKind::DeleteChat)
}

pub async fn branch_chat(state: &ServerState, world_id: &str, chat_id: &str, from_message_id: &str) -> ServerMessage {
    let Ok(Some(mut world)) = state.storage.get_world(world_id).await else {
        return err(ResponseKind::BranchChat, &WorldError::NotFound(format!("world {world_id}")));
    };
    let agents = match state.storage.list_agents(world_id).await {
        Ok(a) => a,
        Err(e) => return err(ResponseKind::BranchChat, &e),
    };

    let cutoff = agents
        .iter()
        .flat_map(|a| a.memory.iter())
        .find(|m| m.message_id == from_message_id && m.chat_id.as_deref() == Some(chat_id))
        .map(|m| m.created_at);
    let Some(cutoff) = cutoff else {
        return err(ResponseKind::BranchChat, &WorldError::NotFound(format!("message {from_message_id}")));
    };

    let new_chat = Chat::new(model::short_id(), world_id);
    let new_chat = match state.storage.create_chat(new_chat).await {
        Ok(c) => c,
        Err(e) => return err(ResponseKind::BranchChat, &e),
    };

    for agent in agents {
        let branched: Vec<_> = agent
            .memory
            .iter()
            .filter(|m| m.chat_id.as_deref() == Some(chat_id) && m.created_at <= cutoff)
            .cloned()
            .map(|mut m| {
                m.chat_id = Some(new_chat.id.clone());
                m
            })
            .collect();
        for message in branched {
            if let Err(e) = state.storage.append_agent_message(world_id, &agent.id, message).await {
                return err(ResponseKind::BranchChat, &e);
            }
        }
    }

    world.current_chat_id = Some(new_chat.id.clone());
    world.updated_at = chrono::Utc::now();
    if let Err(e) = state.storage.update_world(world).await {
        return err(ResponseKind::BranchChat, &e);
    }

    ServerMessage::ok(ResponseKind::BranchChat, ChatView(new_chat))
}

fn err(kind: ResponseKind, e: &WorldError) -> ServerMessage {
    ServerMessage::err(Some(kind), ErrorBody::from_world_error(e))
}

pub async fn try_handle(state: &ServerState, command: &ClientCommand) -> Option<ServerMessage> {
    Some(match command {
        ClientCommand::ListChats { world_id } => list_chats(state, world_id).await,
        ClientCommand::NewChat { world_id } => new_chat(state, world_id).await,
        ClientCommand::DeleteChat { world_id, chat_id } => delete_chat(state, world_id, chat_id).await,
        ClientCommand::BranchChat { world_id, chat_id, from_message_id } => branch_chat(state, world_id, chat_id, from_message_id).await,
        _ => return None,
    })
}
