//! Send a single `ServerMessage` as JSON over the WebSocket.

use axum::extract::ws::{Message, WebSocket};

use crate::protocol::{ErrorBody, ServerMessage};

pub(crate) async fn send_response(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let json = serde_json::to_string(message).unwrap_or_else(|_| {
        serde_json::to_string(&ServerMessage::err(None, ErrorBody::validation("serialization error"))).expect("ServerMessage::Error always serializes")
    });
    socket.send(Message::Text(json)).await?;
    Ok(())
}
