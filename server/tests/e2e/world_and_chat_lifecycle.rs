use std::time::Duration;

use futures_util::StreamExt;
use server::protocol::{ClientCommand, ResponseKind, ServerMessage};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;

use super::common;

fn expect_ok(resp: ServerMessage, expected: ResponseKind) -> serde_json::Value {
    match resp {
        ServerMessage::Result { command, data } if command == expected => data.unwrap_or(serde_json::Value::Null),
        other => panic!("expected a {expected:?} result, got {other:?}"),
    }
}

#[tokio::test]
async fn e2e_world_agent_chat_crud() {
    let (url, _state, server_handle, _dir) = common::spawn_server_once().await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    let (resp, _) = common::send_and_recv(
        &mut write,
        &mut read,
        &ClientCommand::CreateWorld { name: "Research Crew".to_string(), description: "".to_string() },
    )
    .await
    .unwrap();
    let world = expect_ok(resp, ResponseKind::CreateWorld);
    let world_id = world["id"].as_str().unwrap().to_string();

    let (resp, _) = common::send_and_recv(&mut write, &mut read, &ClientCommand::GetWorld { world_id: world_id.clone() }).await.unwrap();
    expect_ok(resp, ResponseKind::GetWorld);

    let (resp, _) = common::send_and_recv(
        &mut write,
        &mut read,
        &ClientCommand::UpdateWorld {
            world_id: world_id.clone(),
            name: Some("Renamed Crew".to_string()),
            description: None,
            turn_limit: Some(3),
            main_agent: None,
            variables: None,
        },
    )
    .await
    .unwrap();
    let updated = expect_ok(resp, ResponseKind::UpdateWorld);
    assert_eq!(updated["name"], "Renamed Crew");
    assert_eq!(updated["turn_limit"], 3);

    let (resp, _) = common::send_and_recv(
        &mut write,
        &mut read,
        &ClientCommand::CreateAgent {
            world_id: world_id.clone(),
            name: "Reviewer".to_string(),
            system_prompt: "You review code.".to_string(),
            llm_provider: None,
            llm_model: None,
        },
    )
    .await
    .unwrap();
    let agent = expect_ok(resp, ResponseKind::CreateAgent);
    assert_eq!(agent["id"], "reviewer");

    let (resp, _) = common::send_and_recv(&mut write, &mut read, &ClientCommand::ListAgents { world_id: world_id.clone() }).await.unwrap();
    let agents = expect_ok(resp, ResponseKind::ListAgents);
    assert_eq!(agents.as_array().unwrap().len(), 1);

    let (resp, _) = common::send_and_recv(&mut write, &mut read, &ClientCommand::NewChat { world_id: world_id.clone() }).await.unwrap();
    let chat = expect_ok(resp, ResponseKind::NewChat);
    let chat_id = chat["id"].as_str().unwrap().to_string();

    let (resp, _) = common::send_and_recv(&mut write, &mut read, &ClientCommand::ListChats { world_id: world_id.clone() }).await.unwrap();
    let chats = expect_ok(resp, ResponseKind::ListChats);
    assert_eq!(chats.as_array().unwrap().len(), 1);

    let (resp, _) = common::send_and_recv(&mut write, &mut read, &ClientCommand::DeleteChat { world_id: world_id.clone(), chat_id }).await.unwrap();
    expect_ok(resp, ResponseKind::DeleteChat);

    let (resp, _) = common::send_and_recv(&mut write, &mut read, &ClientCommand::DeleteWorld { world_id }).await.unwrap();
    expect_ok(resp, ResponseKind::DeleteWorld);

    drop(write);
    drop(read);
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}

#[tokio::test]
async fn e2e_get_world_for_unknown_id_is_not_found() {
    let (url, _state, server_handle, _dir) = common::spawn_server_once().await;
    let (ws, _) = connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    let (resp, _) = common::send_and_recv(&mut write, &mut read, &ClientCommand::GetWorld { world_id: "missing".to_string() }).await.unwrap();
    match resp {
        ServerMessage::Error { error, .. } => assert!(matches!(error.kind, server::protocol::ErrorKind::NotFound)),
        other => panic!("expected a not-found error, got {other:?}"),
    }

    drop(write);
    drop(read);
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}
