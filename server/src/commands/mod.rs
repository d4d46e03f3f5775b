//! The §6 command/RPC surface, split by resource the way the teacher split its
//! one-shot `run` request into `request`/`stream`/`delivery`. Each submodule owns
//! one resource's handlers and a `try_handle` that returns `None` for commands
//! outside its scope, so [`dispatch`] can chain them instead of matching every
//! variant in one place.

pub mod agent;
pub mod chat;
pub mod message;
pub mod subscription;
pub mod world;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::protocol::{ClientCommand, ResponseKind, ServerMessage};
use crate::state::ServerState;

/// Outcome of dispatching one [`ClientCommand`]. `Subscribed` carries the spawned
/// forwarding task alongside its reply so the connection loop can track it for
/// later abort -- every other command produces a plain reply.
pub enum Dispatched {
    Reply(ServerMessage),
    Subscribed(ServerMessage, Option<(String, JoinHandle<()>)>),
}

/// Routes one inbound command to its handler. `outbox` is only used by
/// `subscribe`, to give its forwarding task somewhere to push live events.
pub async fn dispatch(state: &ServerState, command: ClientCommand, outbox: UnboundedSender<ServerMessage>) -> Dispatched {
    match command {
        ClientCommand::Ping => Dispatched::Reply(ServerMessage::ok_empty(ResponseKind::Pong)),
        ClientCommand::Subscribe { world_id, chat_id, since_seq } => {
            let (reply, handle) = subscription::subscribe(state, world_id, chat_id, since_seq, outbox).await;
            Dispatched::Subscribed(reply, handle)
        }
        ClientCommand::Unsubscribe { subscription_id } => Dispatched::Reply(subscription::unsubscribe(state, &subscription_id).await),
        other => {
            if let Some(reply) = world::try_handle(state, &other).await {
                return Dispatched::Reply(reply);
            }
            if let Some(reply) = agent::try_handle(state, &other).await {
                return Dispatched::Reply(reply);
            }
            if let Some(reply) = chat::try_handle(state, &other).await {
                return Dispatched::Reply(reply);
            }
            if let Some(reply) = message::try_handle(state, &other).await {
                return Dispatched::Reply(reply);
            }
            unreachable!("ClientCommand variant not routed to any command module: {other:?}")
        }
    }
}
