//! Subscription commands: `subscribe`, `unsubscribe` (§6).
//!
//! Unlike the other command modules, these two need a handle into the owning
//! connection: `subscribe` spawns a task that forwards live [`stream_event::WireEvent`]s
//! into the connection's outbox, and `unsubscribe` must stop that task. The
//! connection loop (`connection.rs`) owns the map of running forwarder tasks;
//! this module only starts and stops them.

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::protocol::{ErrorBody, ResponseKind, ServerMessage};
use crate::state::ServerState;

/// Starts a subscription and its forwarding task. On success, the caller must
/// retain the returned `JoinHandle` keyed by the subscription id so it can be
/// aborted on `unsubscribe` or disconnect.
pub async fn subscribe(
    state: &ServerState,
    world_id: String,
    chat_id: Option<String>,
    since_seq: u64,
    outbox: UnboundedSender<ServerMessage>,
) -> (ServerMessage, Option<(String, JoinHandle<()>)>) {
    match state.subscriptions.subscribe(&world_id, chat_id, since_seq).await {
        Ok((token, mut rx)) => {
            let forward_token = token.clone();
            let handle = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if outbox.send(ServerMessage::Event { subscription_id: forward_token.clone(), event }).is_err() {
                        break;
                    }
                }
            });
            let ack = ServerMessage::ok(ResponseKind::Subscribe, serde_json::json!({ "subscriptionId": token }));
            (ack, Some((token, handle)))
        }
        Err(e) => (ServerMessage::err(Some(ResponseKind::Subscribe), ErrorBody::from_world_error(&e)), None),
    }
}

/// Detaches `subscription_id`. The caller is responsible for aborting (and
/// removing) the associated forwarding task once this returns, regardless of
/// outcome -- an unknown token still means the connection should forget about it.
pub async fn unsubscribe(state: &ServerState, subscription_id: &str) -> ServerMessage {
    match state.subscriptions.unsubscribe(subscription_id).await {
        Ok(()) => ServerMessage::ok_empty(ResponseKind::Unsubscribe),
        Err(e) => ServerMessage::err(Some(ResponseKind::Unsubscribe), ErrorBody::from_world_error(&e)),
    }
}
