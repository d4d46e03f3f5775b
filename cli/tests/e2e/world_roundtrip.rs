use super::common::{run_cli, spawn_server};

#[test]
fn ping_roundtrip() {
    let server = spawn_server();
    let resp = run_cli(&server, &["ping"]);
    assert!(resp.is_null());
}

#[test]
fn world_agent_chat_lifecycle_roundtrip() {
    let server = spawn_server();

    let world = run_cli(&server, &["world", "create", "Research Crew", "--description", "demo"]);
    let world_id = world["id"].as_str().unwrap().to_string();

    let fetched = run_cli(&server, &["world", "get", &world_id]);
    assert_eq!(fetched["name"], "Research Crew");

    let updated = run_cli(&server, &["world", "update", &world_id, "--turn-limit", "3"]);
    assert_eq!(updated["turn_limit"], 3);

    let agent = run_cli(&server, &["agent", "create", &world_id, "Reviewer", "--system-prompt", "You review code."]);
    assert_eq!(agent["id"], "reviewer");

    let agents = run_cli(&server, &["agent", "list", &world_id]);
    assert_eq!(agents.as_array().unwrap().len(), 1);

    let chat = run_cli(&server, &["chat", "new", &world_id]);
    let chat_id = chat["id"].as_str().unwrap().to_string();

    let chats = run_cli(&server, &["chat", "list", &world_id]);
    assert_eq!(chats.as_array().unwrap().len(), 1);

    run_cli(&server, &["chat", "delete", &world_id, &chat_id]);
    run_cli(&server, &["agent", "delete", &world_id, "reviewer"]);
    run_cli(&server, &["world", "delete", &world_id]);
}

#[test]
fn get_world_for_unknown_id_fails_with_nonzero_exit() {
    let server = spawn_server();
    let out = std::process::Command::new(env!("CARGO_BIN_EXE_agent-world"))
        .args(["--remote", &server.url, "--no-auto-start", "world", "get", "missing"])
        .output()
        .expect("run agent-world");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("NotFound") || stderr.contains("not-found"), "stderr: {stderr}");
}
