//! CLI integration tests for catalog-codegen.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that occur before any connection.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the catalog-codegen binary.
fn cmd() -> Command {
    Command::cargo_bin("catalog-codegen").unwrap()
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
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
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("introspect"))
        .stdout(predicate::str::contains("tables"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_generate_subcommand_help() {
    cmd()
        .args(["generate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--schema"))
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("--sequential"))
        .stdout(predicate::str::contains("--force"))
        .stdout(predicate::str::contains("--incremental"))
        .stdout(predicate::str::contains("--template-dir"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("catalog-codegen"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_and_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--shutdown-timeout"))
        .stdout(predicate::str::contains("[default: 30]"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: codegen.yaml]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_1() {
    // Missing file is an IO error, not a configuration error
    cmd()
        .args(["--config", "nonexistent_codegen.yaml", "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let file = config_file("invalid: yaml: content: [\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_connection_string_exits_with_code_2() {
    let file = config_file("source:\n  schema: public\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "generate"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("connection_string"));
}

#[test]
fn test_invalid_toggle_exits_with_code_2() {
    let file = config_file(
        "source:\n  connection_string: \"postgres://app@localhost/shop\"\ngeneration:\n  cache_capacity: 0\n",
    );

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "generate"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_unknown_mock_provider_exits_with_code_2() {
    let file = config_file("source:\n  connection_string: \"postgres://app@localhost/shop\"\n");

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "generate",
            "--mock-provider",
            "nope",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown mock provider"));
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
        .stdout(predicate::str::contains("Test the catalog connection"));
}

#[test]
fn test_introspect_command_exists() {
    cmd()
        .args(["introspect", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("normalized schema"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_codegen.yaml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
