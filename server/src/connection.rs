//! WebSocket connection lifecycle: recv loop, command dispatch, and event
//! forwarding, multiplexed with `tokio::select!` (§6: a connection both submits
//! commands and receives live events from whatever it has subscribed to).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::commands::{self, Dispatched};
use crate::protocol::{ClientCommand, ErrorBody, ServerMessage};
use crate::response::send_response;
use crate::state::ServerState;

pub(crate) async fn handle_socket(mut socket: WebSocket, shutdown_tx: Option<oneshot::Sender<()>>, state: Arc<ServerState>) {
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut subscriptions: HashMap<String, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(res) = incoming else { break };
                let msg = match res {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!("read error (client closed?): {}", e);
                        break;
                    }
                };
                let text = match &msg {
                    Message::Text(t) => t.clone(),
                    Message::Binary(b) => String::from_utf8_lossy(b).into_owned(),
                    Message::Close(_) => break,
                    _ => continue,
                };
                if let Err(e) = handle_text(&text, &mut socket, &state, &outbox_tx, &mut subscriptions).await {
                    tracing::warn!("send error: {}", e);
                    break;
                }
            }
            Some(event) = outbox_rx.recv() => {
                if send_response(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    for (_, handle) in subscriptions.drain() {
        handle.abort();
    }
    let _ = socket.close().await;
    if let Some(tx) = shutdown_tx {
        let _ = tx.send(());
    }
}

async fn handle_text(
    text: &str,
    socket: &mut WebSocket,
    state: &Arc<ServerState>,
    outbox: &mpsc::UnboundedSender<ServerMessage>,
    subscriptions: &mut HashMap<String, JoinHandle<()>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(e) => {
            send_response(socket, &ServerMessage::err(None, ErrorBody::validation(format!("parse error: {e}")))).await?;
            return Ok(());
        }
    };

    // `dispatch` consumes `command`; grab what `unsubscribe` needs to clean up the
    // connection-local task map before that happens.
    let unsubscribing = match &command {
        ClientCommand::Unsubscribe { subscription_id } => Some(subscription_id.clone()),
        _ => None,
    };

    match commands::dispatch(state, command, outbox.clone()).await {
        Dispatched::Reply(reply) => {
            send_response(socket, &reply).await?;
            if let Some(token) = unsubscribing {
                if let Some(handle) = subscriptions.remove(&token) {
                    handle.abort();
                }
            }
        }
        Dispatched::Subscribed(reply, handle) => {
            send_response(socket, &reply).await?;
            if let Some((token, handle)) = handle {
                subscriptions.insert(token, handle);
            }
        }
    }
    Ok(())
}
