//! Auto-starts the server when a remote connection is refused.

use std::process::Stdio;
use std::time::Duration;

const POLL_INTERVAL_MS: u64 = 200;
const MAX_WAIT_MS: u64 = 15000;

/// Spawns `agent-world serve --keep-alive` in the background so the server stays up
/// for this and future invocations; returns once the process is started.
fn spawn_serve() -> Result<std::process::Child, std::io::Error> {
    let exe = std::env::current_exe()?;
    std::process::Command::new(exe)
        .arg("serve")
        .arg("--keep-alive")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
}

/// Polls the WebSocket URL until it accepts connections or timeout.
async fn wait_for_server(url: &str) -> bool {
    let start = std::time::Instant::now();
    let max_wait = Duration::from_millis(MAX_WAIT_MS);
    let interval = Duration::from_millis(POLL_INTERVAL_MS);

    while start.elapsed() < max_wait {
        if tokio_tungstenite::connect_async(url).await.is_ok() {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Tries to connect to `url`. On connection refused, spawns `serve` and retries.
pub async fn ensure_server_or_spawn(url: &str) -> Result<(), String> {
    match tokio_tungstenite::connect_async(url).await {
        Ok(_) => return Ok(()),
        Err(e) => {
            let msg = e.to_string();
            if !msg.contains("refused") && !msg.contains("Connection refused") {
                return Err(msg);
            }
        }
    }

    eprintln!("agent-world: server not running, starting it...");
    spawn_serve().map_err(|e| e.to_string())?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    if wait_for_server(url).await {
        Ok(())
    } else {
        Err("server failed to become ready".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_server_times_out_quickly_when_nothing_listens() {
        let start = std::time::Instant::now();
        let ok = tokio::time::timeout(Duration::from_millis(600), wait_for_server("ws://127.0.0.1:1"))
            .await
            .unwrap_or(false);
        assert!(!ok);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
