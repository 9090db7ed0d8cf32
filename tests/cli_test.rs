//! CLI tests for the quota-relay binary

use assert_cmd::Command;
use predicates::prelude::*;
use quota_relay::config::Config;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(temp_dir: &TempDir) -> PathBuf {
    let path = temp_dir.path().join("config.toml");
    Config::for_test(temp_dir.path()).save(&path).unwrap();
    path
}

fn relay(config: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("quota-relay").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("quota-relay")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("quota"));
}

#[test]
fn test_quota_credit_show_reset() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    relay(&config)
        .args(["quota", "show", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No quota records for alice"));

    relay(&config)
        .args(["quota", "credit", "alice", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice now has 3 request(s)"));

    relay(&config)
        .args(["quota", "credit", "alice", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice now has 5 request(s)"));

    relay(&config)
        .args(["quota", "show", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("5 (today)"));

    relay(&config)
        .args(["quota", "reset", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 record(s) for alice"));
}

#[test]
fn test_config_init_and_show() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sub/config.toml");

    relay(&path)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    assert!(path.exists());

    relay(&path)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    relay(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_chunk_size = 500"));
}

#[test]
fn test_invalid_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "max_chunk_size = 0\n").unwrap();

    relay(&path)
        .args(["quota", "show", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_chunk_size"));
}

#[test]
fn test_serve_with_closed_stdin_exits_cleanly() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    relay(&config)
        .args(["serve", "--no-self-test"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
