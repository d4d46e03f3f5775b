use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use server::protocol::ServerMessage;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::common;

#[tokio::test]
async fn e2e_invalid_json_yields_error_frame_without_closing_connection() {
    let (url, _state, server_handle, _dir) = common::spawn_server_once().await;

    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    write.send(Message::Text("not json".to_string())).await.unwrap();
    let msg = timeout(Duration::from_secs(5), read.next()).await.unwrap().unwrap().unwrap();
    let text = msg.to_text().unwrap();
    let parsed: ServerMessage = serde_json::from_str(text).unwrap();
    match parsed {
        ServerMessage::Error { command: None, .. } => {}
        other => panic!("expected a commandless error frame, got {other:?}"),
    }

    // The connection survives a bad frame -- a follow-up ping still gets a pong.
    let (resp, _) = common::send_and_recv(&mut write, &mut read, &server::protocol::ClientCommand::Ping).await.unwrap();
    assert!(matches!(resp, ServerMessage::Result { .. }));

    drop(write);
    drop(read);
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}
