//! One WebSocket connection per invocation: send a single [`ClientCommand`],
//! wait for the matching `Result`/`Error` frame, print and exit. `subscribe`
//! is the one long-lived exception, streaming `Event` frames until the
//! connection closes.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use server::protocol::{ClientCommand, ErrorKind, ServerMessage};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const CONNECT_TIMEOUT_SECS: u64 = 10;
/// A command can sit behind a busy world lock; give it room before giving up.
const READ_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("could not connect to {0}: timed out")]
    ConnectTimeout(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("timed out waiting for a response")]
    ReadTimeout,
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    #[error("malformed server frame: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{kind:?}: {message}")]
    Server { kind: ErrorKind, message: String },
}

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect(url: &str) -> Result<WsStream, CliError> {
    let (ws, _) = timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), connect_async(url))
        .await
        .map_err(|_| CliError::ConnectTimeout(url.to_string()))??;
    Ok(ws)
}

/// Sends one command and returns the first `Result`/`Error` frame. A bare command
/// never triggers an `Event` frame, but a connection left over from a prior
/// `subscribe` could in principle share this socket, so stray events are skipped.
pub async fn request(ws: &mut WsStream, command: ClientCommand) -> Result<serde_json::Value, CliError> {
    let json = serde_json::to_string(&command)?;
    ws.send(Message::Text(json)).await?;

    loop {
        let next = timeout(Duration::from_secs(READ_TIMEOUT_SECS), ws.next()).await;
        let msg = match next {
            Ok(Some(m)) => m?,
            Ok(None) => return Err(CliError::ConnectionClosed),
            Err(_) => return Err(CliError::ReadTimeout),
        };
        if !msg.is_text() {
            continue;
        }
        match serde_json::from_str(msg.to_text().unwrap_or_default())? {
            ServerMessage::Result { data, .. } => return Ok(data.unwrap_or(serde_json::Value::Null)),
            ServerMessage::Error { error, .. } => {
                return Err(CliError::Server { kind: error.kind, message: error.message })
            }
            ServerMessage::Event { .. } => continue,
        }
    }
}

/// Subscribes to a world's event stream and prints one JSON line per event to
/// stdout until the server closes the connection (e.g. process interrupted).
pub async fn stream_subscription(
    ws: &mut WsStream,
    world_id: String,
    chat_id: Option<String>,
    since_seq: u64,
) -> Result<(), CliError> {
    let ack = request(ws, ClientCommand::Subscribe { world_id, chat_id, since_seq }).await?;
    let subscription_id = ack.get("subscriptionId").and_then(|v| v.as_str()).unwrap_or_default();
    eprintln!("subscribed: {}", subscription_id);

    loop {
        let msg = match ws.next().await {
            Some(m) => m?,
            None => return Ok(()),
        };
        if !msg.is_text() {
            continue;
        }
        match serde_json::from_str(msg.to_text().unwrap_or_default())? {
            ServerMessage::Event { event, .. } => println!("{}", serde_json::to_string(&event)?),
            ServerMessage::Error { error, .. } => eprintln!("error: {:?}: {}", error.kind, error.message),
            ServerMessage::Result { .. } => {}
        }
    }
}
