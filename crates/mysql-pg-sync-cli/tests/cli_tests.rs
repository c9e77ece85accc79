//! CLI integration tests for mysql-pg-sync.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for configuration errors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mysql-pg-sync binary.
fn cmd() -> Command {
    Command::cargo_bin("mysql-pg-sync").unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--tables"))
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mysql-pg-sync"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Exit Code Tests - Config Errors
// =============================================================================

#[test]
fn test_missing_config_fails() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nonexistent_config_file.yaml"));
}

#[test]
fn test_invalid_yaml_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .failure();
}

#[test]
fn test_empty_config_fails() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .failure();
}

#[test]
fn test_missing_required_fields_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  type: mysql").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .failure();
}

#[test]
fn test_wrong_source_type_fails_validation() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        concat!(
            "source:\n",
            "  type: oracle\n",
            "  host: localhost\n",
            "  database: app\n",
            "  user: sync\n",
            "  password: secret\n",
            "target:\n",
            "  type: postgres\n",
            "  host: localhost\n",
            "  database: warehouse\n",
            "  user: loader\n",
            "  password: secret\n",
        )
    )
    .unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mysql"));
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test database connections"));
}

#[test]
fn test_validate_command_exists() {
    cmd()
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Compare row counts"));
}

#[test]
fn test_status_command_exists() {
    cmd()
        .args(["status", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sync state"));
}

// =============================================================================
// Config Path Tests
// =============================================================================

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd().args(["-c", "some_config.yaml", "--help"]).assert().success();
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
