use std::time::Duration;

use futures_util::StreamExt;
use server::protocol::{ClientCommand, ServerMessage};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;

use super::common;

#[tokio::test]
async fn e2e_ping() {
    let (url, _state, server_handle, _dir) = common::spawn_server_once().await;

    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    let (resp, received) = common::send_and_recv(&mut write, &mut read, &ClientCommand::Ping).await.unwrap();

    assert!(received.contains("\"type\":\"result\"") && received.contains("\"command\":\"pong\""), "expected pong result, received: {received}");
    match resp {
        ServerMessage::Result { command: server::protocol::ResponseKind::Pong, .. } => {}
        other => panic!("expected Pong result, got {other:?}"),
    }

    drop(write);
    drop(read);
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}
