use std::process::Command;

#[test]
fn cli_help_lists_subcommands() {
    let out = Command::new(env!("CARGO_BIN_EXE_agent-world")).arg("--help").output().expect("run --help");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("world"));
    assert!(stdout.contains("subscribe"));
    assert!(stdout.contains("serve"));
}
