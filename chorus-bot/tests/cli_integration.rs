//! Integration tests for the chorus binary
//!
//! Every run points CHORUS_CONFIG at a temporary file and keeps its history
//! and state inside the same temporary directory. Nothing here uses --live
//! with a configured network, so no request leaves the machine.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Write a config with a mastodon section and a content file
fn setup_test_env(content: &str) -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("bot.toml");
    let source_path = temp_dir.path().join("posts.txt");

    let config_content = format!(
        r#"
[bot]
state_dir = "{}"
interval = "1s"

[mastodon]
instance = "mastodon.invalid"
access_token = "not-a-real-token"
"#,
        temp_dir.path().display().to_string().replace('\\', "/")
    );
    fs::write(&config_path, config_content).unwrap();
    fs::write(&source_path, content).unwrap();

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        source_path.to_str().unwrap().to_string(),
    )
}

fn chorus(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("chorus").unwrap();
    cmd.env("CHORUS_CONFIG", config_path)
        .env_remove("CHORUS_LOG_FORMAT")
        .env_remove("CHORUS_LOG_LEVEL");
    cmd
}

#[test]
fn test_help_lists_flags() {
    Command::cargo_bin("chorus")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--live"))
        .stdout(predicate::str::contains("--source"));
}

#[test]
fn test_dry_run_once_reports_json() {
    let (temp_dir, config_path, source_path) = setup_test_env("The only post\n");

    let output = chorus(&config_path)
        .args(["--name", "testbot", "--source", &source_path, "--once"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["outcome"], "posted");
    assert!(report["results"]["mastodon"].is_null());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Dry run"));

    let history = temp_dir.path().join("testbot.history.json");
    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(history).unwrap()).unwrap();
    assert_eq!(raw["entries"][0]["content"], "The only post");
    assert!(temp_dir.path().join("testbot.state.json").exists());
}

#[test]
fn test_history_survives_restart() {
    let (_temp_dir, config_path, source_path) = setup_test_env("Say it once\n");

    chorus(&config_path)
        .args(["--name", "testbot", "--source", &source_path, "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"posted\""));

    chorus(&config_path)
        .args(["--name", "testbot", "--source", &source_path, "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"duplicate\""));
}

#[test]
fn test_empty_source_has_no_content() {
    let (_temp_dir, config_path, source_path) = setup_test_env("\n\n");

    chorus(&config_path)
        .args(["--source", &source_path, "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no_content"));
}

#[test]
fn test_missing_source_is_error() {
    let (_temp_dir, config_path, _source_path) = setup_test_env("x\n");

    chorus(&config_path)
        .arg("--once")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--source"));
}

#[test]
fn test_live_without_networks_refuses_to_start() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("empty.toml");
    fs::write(
        &config_path,
        format!(
            "[bot]\nstate_dir = \"{}\"\n",
            temp_dir.path().display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();

    chorus(config_path.to_str().unwrap())
        .args(["--live", "--once"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No networks configured"));
}

#[test]
fn test_malformed_config_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("bad.toml");
    fs::write(&config_path, "[mastodon\ninstance =").unwrap();

    chorus(config_path.to_str().unwrap())
        .arg("--once")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}
