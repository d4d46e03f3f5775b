use std::time::Duration;

use futures_util::StreamExt;
use runtime::model::World;
use server::protocol::{ClientCommand, ServerMessage};
use stream_event::Channel;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;

use super::common;

/// §8 scenario: a client that subscribes with `sinceSeq = 0` after events already
/// exist sees the backlog replayed in order, then stays live for anything
/// published afterward -- all as `Event` frames tagged with its subscription id.
#[tokio::test]
async fn e2e_subscribe_replays_backlog_then_goes_live() {
    let (url, state, server_handle, _dir) = common::spawn_server_once().await;

    state.storage.create_world(World::new("w1", "Test World")).await.unwrap();
    let runtime = state.world_registry.load("w1", state.storage.clone()).await.unwrap();
    runtime.bus.publish(Channel::Message, None, serde_json::json!({"n": 1}), serde_json::json!({})).await.unwrap();
    runtime.bus.publish(Channel::Message, None, serde_json::json!({"n": 2}), serde_json::json!({})).await.unwrap();

    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    let (resp, _) = common::send_and_recv(&mut write, &mut read, &ClientCommand::Subscribe { world_id: "w1".to_string(), chat_id: None, since_seq: 0 })
        .await
        .unwrap();
    let subscription_id = match resp {
        ServerMessage::Result { data: Some(data), .. } => data["subscriptionId"].as_str().unwrap().to_string(),
        other => panic!("expected a subscribe ack, got {other:?}"),
    };

    let first = read_event(&mut read).await;
    let second = read_event(&mut read).await;
    assert_eq!(first.0, subscription_id);
    assert_eq!(first.1.envelope.seq, 1);
    assert_eq!(second.1.envelope.seq, 2);

    runtime.bus.publish(Channel::Message, None, serde_json::json!({"n": 3}), serde_json::json!({})).await.unwrap();
    let third = read_event(&mut read).await;
    assert_eq!(third.1.envelope.seq, 3);

    let (resp, _) = common::send_and_recv(&mut write, &mut read, &ClientCommand::Unsubscribe { subscription_id }).await.unwrap();
    assert!(matches!(resp, ServerMessage::Result { .. }));

    drop(write);
    drop(read);
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}

async fn read_event<R>(read: &mut R) -> (String, stream_event::WireEvent)
where
    R: StreamExt<Item = Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let msg = timeout(Duration::from_secs(5), read.next()).await.unwrap().unwrap().unwrap();
    let text = msg.to_text().unwrap();
    match serde_json::from_str::<ServerMessage>(text).unwrap() {
        ServerMessage::Event { subscription_id, event } => (subscription_id, event),
        other => panic!("expected an event frame, got {other:?}"),
    }
}
