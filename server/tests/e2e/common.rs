//! Shared helpers for e2e tests. Received frames are logged with `[e2e] received:
//! ...`; run with `--nocapture` to see them.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use server::protocol::{ClientCommand, ServerMessage};
use server::state::{ServerConfig, ServerState};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// Builds a [`ServerState`] backed by a SQLite file under a fresh temp dir, with
/// no LLM provider credentials -- enough for every command except one that
/// actually needs to call out to a model.
async fn test_state() -> (std::sync::Arc<ServerState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ServerConfig {
        storage_path: dir.path().join("agent-world.sqlite3"),
        workspace_path: Some(PathBuf::from(dir.path())),
        skill_roots: Vec::new(),
        openai_api_key: None,
        anthropic_api_key: None,
        google_api_key: None,
    };
    let state = ServerState::build(cfg).await.expect("build server state");
    (state, dir)
}

/// Binds to a random port and spawns the server in once mode. Returns the ws
/// url, the shared state (so a test can reach into storage directly for setup
/// that isn't reachable through the wire protocol alone), the server's join
/// handle, and the temp dir backing its storage (kept alive for the duration of
/// the test).
pub async fn spawn_server_once() -> (
    String,
    std::sync::Arc<ServerState>,
    tokio::task::JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>,
    tempfile::TempDir,
) {
    let (state, dir) = test_state().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("ws://{}", addr);
    let server_handle = tokio::spawn(server::run_server_on_listener(listener, state.clone(), true));
    (url, state, server_handle, dir)
}

pub async fn send_and_recv<W, R>(
    write: &mut W,
    read: &mut R,
    command: &ClientCommand,
) -> Result<(ServerMessage, String), Box<dyn std::error::Error + Send + Sync>>
where
    W: SinkExt<Message> + Unpin,
    W::Error: std::error::Error + Send + Sync + 'static,
    R: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let json = serde_json::to_string(command)?;
    write.send(Message::Text(json)).await?;
    let opt = timeout(Duration::from_secs(10), read.next())
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout waiting for response"))?;
    let msg = opt.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no message"))??;
    let text = msg.to_text().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let received = text.to_string();
    eprintln!("[e2e] received: {}", received);
    let parsed: ServerMessage = serde_json::from_str(text)?;
    Ok((parsed, received))
}
