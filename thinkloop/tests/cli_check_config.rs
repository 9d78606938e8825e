//! CLI tests for `thinkloop check-config`.
//!
//! Spawns the binary and verifies exit codes for valid and invalid setups.
//! No network access is needed: `check-config` never contacts a service.

use std::fs;
use std::process::Command;

use thinkloop::exit_codes;

const VALID: &str = r#"
missions = ["Audience analysis", "Growth"]

[store]
owner = "acme"
repo = "memory"

[limits]
daily_token_budget = 5000
"#;

fn check_config(dir: &std::path::Path, config: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_thinkloop"));
    cmd.current_dir(dir)
        .args(["check-config", "--config", config])
        .env("GITHUB_TOKEN", "test-github-token")
        .env("GROQ_API_KEY", "test-groq-key")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn valid_config_prints_effective_values() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("thinkloop.toml"), VALID).expect("write config");

    let output = check_config(temp.path(), "thinkloop.toml")
        .output()
        .expect("thinkloop check-config");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("daily_token_budget = 5000"));
    assert!(stdout.contains("Audience analysis"));
    assert!(!stdout.contains("test-github-token"));
    assert!(!stdout.contains("test-groq-key"));
}

#[test]
fn missing_secret_is_a_configuration_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("thinkloop.toml"), VALID).expect("write config");

    let output = check_config(temp.path(), "thinkloop.toml")
        .env_remove("GROQ_API_KEY")
        .output()
        .expect("thinkloop check-config");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("GROQ_API_KEY"));
}

#[test]
fn invalid_limits_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let invalid = format!("{VALID}confidence_floor = 9\nself_modify_floor = 8\n");
    fs::write(temp.path().join("bad.toml"), invalid).expect("write config");

    let status = check_config(temp.path(), "bad.toml")
        .status()
        .expect("thinkloop check-config");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn missing_config_without_store_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = check_config(temp.path(), "absent.toml")
        .output()
        .expect("thinkloop check-config");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("store.owner"));
}
