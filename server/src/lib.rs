//! WebSocket server for Agent World (axum + ws).
//!
//! Listens on ws://127.0.0.1:8080 by default. One connection speaks the full §6
//! command surface: world/agent/chat/message CRUD, `subscribe`/`unsubscribe` for
//! live events, and `stop` for cancellation.
//!
//! **Public API**: [`run_server`], [`run_server_on_listener`].

mod app;
mod commands;
mod connection;
mod response;
pub mod protocol;
pub mod state;

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use app::{router, AppState};
use state::{ServerConfig, ServerState};

const DEFAULT_WS_ADDR: &str = "127.0.0.1:8080";

/// Runs the WebSocket server on an existing listener, against an already-built
/// [`ServerState`]. Used by tests (bind to 127.0.0.1:0, build in-memory state,
/// then pass both in). When `once` is true, accepts one connection, handles it,
/// then returns.
pub async fn run_server_on_listener(
    listener: TcpListener,
    server_state: Arc<ServerState>,
    once: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("WebSocket server listening on ws://{}", addr);
    if once {
        info!("will exit after first connection is done (once mode, used by tests)");
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let state = Arc::new(AppState {
        shutdown_tx: Arc::new(std::sync::Mutex::new(if once { Some(shutdown_tx) } else { None })),
        server_state,
    });

    let app = router(state);

    if once {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await?;
        info!("connection done, exiting (once mode)");
    } else {
        axum::serve(listener, app).await?;
    }
    Ok(())
}

/// Builds a [`ServerState`] from the process environment (§6 "Environment &
/// configuration") and runs the WebSocket server. Listens on `addr` (default
/// 127.0.0.1:8080). When `once` is true, accepts one connection, handles it,
/// then returns (process exits).
pub async fn run_server(addr: Option<&str>, once: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_WS_ADDR);
    let listener = TcpListener::bind(addr).await?;
    let server_state = ServerState::build(ServerConfig::from_env()).await?;
    run_server_on_listener(listener, server_state, once).await
}
