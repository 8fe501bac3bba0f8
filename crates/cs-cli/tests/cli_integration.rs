//! CLI integration tests
//!
//! Tests the cs CLI using assert_cmd. Nothing here reaches the network:
//! every failing invocation is rejected during argument validation.

use assert_cmd::Command;
use predicates::prelude::*;

fn cs() -> Command {
    let mut cmd = Command::cargo_bin("cs")
        .expect("Failed to locate cs binary - ensure it's built before running tests");
    // Anything that slips past validation fails fast instead of calling out
    cmd.env("CS_API_URL", "http://127.0.0.1:9")
        .env_remove("GITHUB_TOKEN");
    cmd
}

#[test]
fn test_cli_help() {
    cs().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Connect to codespaces over SSH tunnels"));
}

#[test]
fn test_cli_version() {
    cs().arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cs"));
}

#[test]
fn test_cli_ssh_help() {
    cs().args(["ssh", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--stdio"))
        .stdout(predicate::str::contains("--server-port"));
}

#[test]
fn test_cli_ports_forward_help() {
    cs().args(["ports", "forward", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<remote>:<local>"));
}

#[test]
fn test_cp_requires_remote_operand() {
    cs().args(["cp", "-c", "monalisa-x", "a.txt", "b.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("'remote:' prefix"));
}

#[test]
fn test_cp_requires_two_operands() {
    cs().args(["cp", "-c", "monalisa-x", "remote:a.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("source and destination"));
}

#[test]
fn test_stdio_requires_codespace() {
    cs().args(["ssh", "--stdio"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires explicit `--codespace`"));
}

#[test]
fn test_stdio_rejects_server_port() {
    cs().args(["ssh", "--stdio", "-c", "monalisa-x", "--server-port", "2222"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot use `--stdio` with `--server-port`"));
}

#[test]
fn test_ports_forward_rejects_bad_pair() {
    cs().args(["ports", "forward", "-c", "monalisa-x", "80:http"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid port pair"));
}

#[test]
fn test_debug_file_is_announced() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("ssh.log");

    cs().args(["ssh", "--stdio", "--debug-file"])
        .arg(&log)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Debug file located at:"));
    assert!(log.exists());
}

#[test]
fn test_list_unreachable_api_fails() {
    cs().arg("list").assert().failure();
}
