//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

/// Command with an isolated config directory
fn transcript(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("transcript").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let tmp = TempDir::new().unwrap();
    transcript(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("chat"));
}

#[test]
fn test_upload_help() {
    let tmp = TempDir::new().unwrap();
    transcript(&tmp)
        .args(["upload", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Upload an audio file"));
}

#[test]
fn test_ask_help_offers_polling() {
    let tmp = TempDir::new().unwrap();
    transcript(&tmp)
        .args(["ask", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--poll"));
}

#[test]
fn test_health_against_unreachable_server_fails() {
    let tmp = TempDir::new().unwrap();
    transcript(&tmp)
        .args(["--url", "http://127.0.0.1:9", "health"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreachable"));
}

#[test]
fn test_invalid_url_is_rejected() {
    let tmp = TempDir::new().unwrap();
    transcript(&tmp)
        .args(["--url", "not a url", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid server URL"));
}

#[test]
fn test_clear_requires_confirmation() {
    let tmp = TempDir::new().unwrap();
    transcript(&tmp)
        .arg("clear")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn test_upload_missing_file() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("missing.wav");
    transcript(&tmp)
        .arg("upload")
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_upload_empty_file() {
    let tmp = TempDir::new().unwrap();
    let empty = tmp.path().join("empty.wav");
    std::fs::write(&empty, b"").unwrap();
    transcript(&tmp)
        .arg("upload")
        .arg(&empty)
        .assert()
        .failure()
        .stderr(predicate::str::contains("is empty"));
}

#[test]
fn test_ask_rejects_blank_question() {
    let tmp = TempDir::new().unwrap();
    transcript(&tmp)
        .args(["--url", "http://127.0.0.1:9", "ask", "c1", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Question is empty"));
}

#[test]
fn test_chat_refuses_unreachable_server() {
    let tmp = TempDir::new().unwrap();
    transcript(&tmp)
        .args(["--url", "http://127.0.0.1:9", "chat"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Cannot reach server"));
}
