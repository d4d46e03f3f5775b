//! Spawns the `agent-world` binary itself for black-box CLI tests: one child
//! process runs `serve`, further child processes run commands against it.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};

pub struct SpawnedServer {
    pub url: String,
    child: Child,
    _dir: tempfile::TempDir,
}

impl Drop for SpawnedServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Spawns `agent-world serve --keep-alive` on an ephemeral port in a fresh temp
/// storage/workspace dir, and blocks until its bound address appears on stderr.
pub fn spawn_server() -> SpawnedServer {
    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_agent-world"))
        .args(["serve", "--addr", "127.0.0.1:0", "--keep-alive"])
        .env("AGENT_WORLD_STORAGE_DIR", dir.path())
        .env("AGENT_WORLD_WORKSPACE", dir.path())
        .env("RUST_LOG", "info")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn agent-world serve");

    let mut reader = BufReader::new(child.stderr.take().unwrap());
    let mut line = String::new();
    let url = loop {
        line.clear();
        let n = reader.read_line(&mut line).unwrap_or(0);
        if n == 0 {
            panic!("server process exited before logging its listen address");
        }
        if let Some(idx) = line.find("ws://") {
            let addr = line[idx..].trim().split_whitespace().next().unwrap();
            break addr.to_string();
        }
    };

    // Drain the rest of stderr in the background so the child never blocks on a full pipe.
    std::thread::spawn(move || {
        let mut l = String::new();
        while reader.read_line(&mut l).unwrap_or(0) != 0 {
            l.clear();
        }
    });

    SpawnedServer { url, child, _dir: dir }
}

/// Runs `agent-world --remote <url> --no-auto-start <args>` and parses stdout as JSON.
pub fn run_cli(server: &SpawnedServer, args: &[&str]) -> serde_json::Value {
    let out = Command::new(env!("CARGO_BIN_EXE_agent-world"))
        .arg("--remote")
        .arg(&server.url)
        .arg("--no-auto-start")
        .args(args)
        .output()
        .expect("failed to run agent-world binary");
    assert!(out.status.success(), "agent-world {:?} failed: {}", args, String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap_or(serde_json::Value::Null)
}
