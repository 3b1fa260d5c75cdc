#![allow(clippy::unwrap_used)]
// End-to-end tests for the `stargaze` binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

/// Binary isolated from the user's config and registry.
fn stargaze(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("stargaze").unwrap();
    cmd.env("STARGAZE_CONFIG", dir.path().join("config.toml"))
        .env("STARGAZE_REGISTRY", dir.path().join("agents.json"))
        .env_remove("STARGAZE_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    stargaze(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("hub"))
        .stdout(predicate::str::contains("agent"))
        .stdout(predicate::str::contains("agents"));
}

#[test]
fn test_agents_list_on_missing_registry_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    stargaze(&dir)
        .args(["agents", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
fn test_agents_list_on_corrupt_registry_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("agents.json"), "{ definitely not json").unwrap();
    stargaze(&dir)
        .args(["agents", "list", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_agents_list_hides_credentials() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("agents.json"),
        r#"{"agents":[{"id":"edge-1","endpoint":"http://127.0.0.1:1","credential":"top-secret","label":"Edge"}]}"#,
    )
    .unwrap();
    stargaze(&dir)
        .args(["agents", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"edge-1\""))
        .stdout(predicate::str::contains("\"offline\""))
        .stdout(predicate::str::contains("top-secret").not());
}

#[test]
fn test_removing_unknown_agent_exits_not_found() {
    let dir = tempfile::tempdir().unwrap();
    stargaze(&dir)
        .args(["agents", "remove", "ghost"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_adding_unreachable_agent_exits_connection() {
    let dir = tempfile::tempdir().unwrap();
    stargaze(&dir)
        .args(["agents", "add", "http://127.0.0.1:1"])
        .assert()
        .code(7);
    assert!(!dir.path().join("agents.json").exists());
}

#[test]
fn test_invalid_window_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    stargaze(&dir)
        .args(["hub", "--window", "2m", "--count", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("hub.window"));
}

#[test]
fn test_hub_detail_from_local_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("events.ndjson");
    let mut file = std::fs::File::create(&input).unwrap();
    let now = chrono::Utc::now().timestamp_millis();
    for (ip, port) in [("10.1.0.1", 443), ("10.1.0.1", 443), ("10.1.9.9", 22)] {
        writeln!(
            file,
            r#"{{"sourceIp":"{ip}","destPort":{port},"protocol":"TCP","timestamp":{now},"bytes":100}}"#
        )
        .unwrap();
    }
    drop(file);

    stargaze(&dir)
        .args(["hub", "-o", "json", "--detail", "10.1.0.0/16", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"totalPackets\": 3"))
        .stdout(predicate::str::contains("\"label\": \"HTTPS\""));
}

#[test]
fn test_hub_streams_snapshots_as_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    stargaze(&dir)
        .args(["hub", "-o", "json", "--count", "1"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"totalPackets\":0"))
        .stdout(predicate::str::contains("\"window\":\"5m\""));
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    stargaze(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join("config.toml").exists());
    stargaze(&dir).args(["config", "init"]).assert().code(6);
    stargaze(&dir)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_completions_generate() {
    let dir = tempfile::tempdir().unwrap();
    stargaze(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stargaze"));
}
