//! World commands: `list-worlds`, `create-world`, `get-world`, `update-world`,
//! `delete-world`, `export-world` (§6).

use runtime::model::World;
use runtime::{Storage, WorldError};

use crate::protocol::{ClientCommand, ErrorBody, ResponseKind, ServerMessage, WorldView};
use crate::state::ServerState;

pub async fn list_worlds(state: &ServerState) -> ServerMessage {
    match state.storage.list_worlds().await {
        Ok(worlds) => ServerMessage::ok(ResponseKind::ListWorlds, worlds.into_iter().map(WorldView).collect::<Vec<_>>()),
        Err(e) => err(ResponseKind::ListWorlds, &e),
    }
}

pub async fn create_world(state: &ServerState, name: String, description: String) -> ServerMessage {
    if name.trim().is_empty() {
        return ServerMessage::err(Some(ResponseKind::CreateWorld), ErrorBody::validation("world name must not be empty"));
    }
    let mut world = World::new(runtime::model::kebab_case(&name), name);
    world.description = description;
    match state.storage.create_world(world).await {
        Ok(w) => ServerMessage::ok(ResponseKind::CreateWorld, WorldView(w)),
        Err(e) => err(ResponseKind::CreateWorld, &e),
    }
}

pub async fn get_world(state: &ServerState, world_id: &str) -> ServerMessage {
    match state.storage.get_world(world_id).await {
        Ok(Some(w)) => ServerMessage::ok(ResponseKind::GetWorld, WorldView(w)),
        Ok(None) => err(ResponseKind::GetWorld, &WorldError::NotFound(format!("world {world_id}"))),
        Err(e) => err(ResponseKind::GetWorld, &e),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn update_world(
    state: &ServerState,
    world_id: &str,
    name: Option<String>,
    description: Option<String>,
    turn_limit: Option<u32>,
    main_agent: Option<Option<String>>,
    variables: Option<String>,
) -> ServerMessage {
    let Ok(Some(mut world)) = state.storage.get_world(world_id).await else {
        return err(ResponseKind::UpdateWorld, &WorldError::NotFound(format!("world {world_id}")));
    };
    if let Some(name) = name {
        world.name = name;
    }
    if let Some(description) = description {
        world.description = description;
    }
    if let Some(turn_limit) = turn_limit {
        world.turn_limit = turn_limit;
    }
    if let Some(main_agent) = main_agent {
        world.main_agent = main_agent;
    }
    if let Some(variables) = variables {
        world.variables = variables;
    }
    world.updated_at = chrono::Utc::now();

    match state.storage.update_world(world).await {
        Ok(w) => ServerMessage::ok(ResponseKind::UpdateWorld, WorldView(w)),
        Err(e) => err(ResponseKind::UpdateWorld, &e),
    }
}

pub async fn delete_world(state: &ServerState, world_id: &str) -> ServerMessage {
    match state.storage.delete_world(world_id).await {
        Ok(()) => ServerMessage::ok_empty(ResponseKind::DeleteWorld),
        Err(e) => err(ResponseKind::DeleteWorld, &e),
    }
}

/// `export-world`: a JSON snapshot of a world plus every agent and chat it owns
/// (not each chat's full event log -- clients reconstruct that via `subscribe`
/// with `sinceSeq = 0`).
pub async fn export_world(state: &ServerState, world_id: &str) -> ServerMessage {
    let world = match state.storage.get_world(world_id).await {
        Ok(Some(w)) => w,
        Ok(None) => return err(ResponseKind::ExportWorld, &WorldError::NotFound(format!("world {world_id}"))),
        Err(e) => return err(ResponseKind::ExportWorld, &e),
    };
    let agents = match state.storage.list_agents(world_id).await {
        Ok(a) => a,
        Err(e) => return err(ResponseKind::ExportWorld, &e),
    };
    let chats = match state.storage.list_chats(world_id).await {
        Ok(c) => c,
        Err(e) => return err(ResponseKind::ExportWorld, &e),
    };

    ServerMessage::ok(
        ResponseKind::ExportWorld,
        serde_json::json!({
            "world": world,
            "agents": agents,
            "chats": chats,
        }),
    )
}

fn err(kind: ResponseKind, e: &WorldError) -> ServerMessage {
    ServerMessage::err(Some(kind), ErrorBody::from_world_error(e))
}

/// Extracts the `World`-scoped branch of [`ClientCommand`] and runs it; returns
/// `None` for commands outside this module's scope.
pub async fn try_handle(state: &ServerState, command: &ClientCommand) -> Option<ServerMessage> {
    Some(match command {
        ClientCommand::ListWorlds => list_worlds(state).await,
        ClientCommand::CreateWorld { name, description } => create_world(state, name.clone(), description.clone()).await,
        ClientCommand::GetWorld { world_id } => get_world(state, world_id).await,
        ClientCommand::UpdateWorld { world_id, name, description, turn_limit, main_agent, variables } => {
            update_world(state, world_id, name.clone(), description.clone(), *turn_limit, main_agent.clone(), variables.clone()).await
        }
        ClientCommand::DeleteWorld { world_id } => delete_world(state, world_id).await,
        ClientCommand::ExportWorld { world_id } => export_world(state, world_id).await,
        _ => return None,
    })
}
