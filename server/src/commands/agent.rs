//! Agent commands: `list-agents`, `create-agent`, `update-agent`, `delete-agent`
//! (§6).

use runtime::model::Agent;
use runtime::WorldError;

use crate::protocol::{AgentView, ClientCommand, ErrorBody, ResponseKind, ServerMessage};
use crate::state::ServerState;

pub async fn list_agents(state: &ServerState, world_id: &str) -> ServerMessage {
    match state.storage.list_agents(world_id).await {
        Ok(agents) => ServerMessage::ok(ResponseKind::ListAgents, agents.into_iter().map(AgentView::from).collect::<Vec<_>>()),
        Err(e) => err(ResponseKind::ListAgents, &e),
    }
}

pub async fn create_agent(
    state: &ServerState,
    world_id: &str,
    name: String,
    system_prompt: String,
    llm_provider: Option<String>,
    llm_model: Option<String>,
) -> ServerMessage {
    if name.trim().is_empty() {
        return ServerMessage::err(Some(ResponseKind::CreateAgent), ErrorBody::validation("agent name must not be empty"));
    }
    let mut agent = Agent::new(world_id, name);
    agent.system_prompt = system_prompt;
    if let Some(provider) = llm_provider {
        agent.llm_provider = provider;
    }
    if let Some(model) = llm_model {
        agent.llm_model = model;
    }
    match state.storage.create_agent(agent).await {
        Ok(a) => ServerMessage::ok(ResponseKind::CreateAgent, AgentView::from(a)),
        Err(e) => err(ResponseKind::CreateAgent, &e),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn update_agent(
    state: &ServerState,
    world_id: &str,
    agent_id: &str,
    system_prompt: Option<String>,
    llm_provider: Option<String>,
    llm_model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    auto_reply: Option<bool>,
) -> ServerMessage {
    let Ok(Some(mut agent)) = state.storage.get_agent(world_id, agent_id).await else {
        return err(ResponseKind::UpdateAgent, &WorldError::NotFound(format!("agent {agent_id}")));
    };
    if let Some(system_prompt) = system_prompt {
        agent.system_prompt = system_prompt;
    }
    if let Some(provider) = llm_provider {
        agent.llm_provider = provider;
    }
    if let Some(model) = llm_model {
        agent.llm_model = model;
    }
    if let Some(temperature) = temperature {
        agent.temperature = Some(temperature);
    }
    if let Some(max_tokens) = max_tokens {
        agent.max_tokens = Some(max_tokens);
    }
    if let Some(auto_reply) = auto_reply {
        agent.auto_reply = auto_reply;
    }

    match state.storage.update_agent(agent).await {
        Ok(a) => ServerMessage::ok(ResponseKind::UpdateAgent, AgentView::from(a)),
        Err(e) => err(ResponseKind::UpdateAgent, &e),
    }
}

pub async fn delete_agent(state: &ServerState, world_id: &str, agent_id: &str) -> ServerMessage {
    match state.storage.delete_agent(world_id, agent_id).await {
        Ok(()) => ServerMessage::ok_empty(ResponseKind::DeleteAgent),
        Err(e) => err(ResponseKind::DeleteAgent, &e),
    }
}

fn err(kind: ResponseKind, e: &WorldError) -> ServerMessage {
    ServerMessage::err(Some(kind), ErrorBody::from_world_error(e))
}

pub async fn try_handle(state: &ServerState, command: &ClientCommand) -> Option<ServerMessage> {
    Some(match command {
        ClientCommand::ListAgents { world_id } => list_agents(state, world_id).await,
        ClientCommand::CreateAgent { world_id, name, system_prompt, llm_provider, llm_model } => {
            create_agent(state, world_id, name.clone(), system_prompt.clone(), llm_provider.clone(), llm_model.clone()).await
        }
        ClientCommand::UpdateAgent { world_id, agent_id, system_prompt, llm_provider, llm_model, temperature, max_tokens, auto_reply } => {
            update_agent(
                state,
                world_id,
                agent_id,
                system_prompt.clone(),
                llm_provider.clone(),
                llm_model.clone(),
                *temperature,
                *max_tokens,
                *auto_reply,
            )
            .await
        }
        ClientCommand::DeleteAgent { world_id, agent_id } => delete_agent(state, world_id, agent_id).await,
        _ => return None,
    })
}
