//! CLI Integration Tests
//!
//! These run the `eqiva` binary against a throwaway config file. None of
//! them need a Bluetooth adapter: every command here fails or finishes
//! before a scan would start.
//!
//! ```text
//! cargo test --package eqiva-cli --test cli_integration
//! ```

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const ADDR: &str = "00:1A:22:0A:0B:0C";

/// Run eqiva with `config` as its config file
fn run_eqiva(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_eqiva"))
        .args(args)
        .env("EQIVA_CONFIG", config)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run eqiva binary")
}

fn config_dir() -> (TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    (dir, path)
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_lists_operations() {
    let (_dir, config) = config_dir();
    let output = run_eqiva(&config, &["--help"]);
    assert!(output.status.success(), "Help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--temp",
        "--boost",
        "--vacation",
        "--program",
        "--dump",
        "--commands",
        "--scan",
        "--alias-set",
    ] {
        assert!(stdout.contains(flag), "Help should list {}", flag);
    }
}

#[test]
fn test_version() {
    let (_dir, config) = config_dir();
    let output = run_eqiva(&config, &["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_arguments_prints_help() {
    let (_dir, config) = config_dir();
    let output = run_eqiva(&config, &[]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
}

// =============================================================================
// Alias Tests
// =============================================================================

#[test]
fn test_alias_lifecycle() {
    let (_dir, config) = config_dir();

    let output = run_eqiva(&config, &["--alias-set", "office", ADDR]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Added alias 'office'"));
    assert!(std::fs::read_to_string(&config).unwrap().contains(ADDR));

    let output = run_eqiva(&config, &["--aliases"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("office"));
    assert!(stdout.contains(ADDR));

    let output = run_eqiva(&config, &["--aliases", "--json"]);
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["office"], ADDR);

    let output = run_eqiva(&config, &["--alias-remove", "office"]);
    assert!(output.status.success());
    let output = run_eqiva(&config, &["--alias-remove", "office"]);
    assert!(!output.status.success(), "Removing twice should fail");
}

#[test]
fn test_alias_name_must_not_be_an_address() {
    let (_dir, config) = config_dir();
    let output = run_eqiva(&config, &["--alias-set", ADDR, ADDR]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("looks like a device address"));
}

// =============================================================================
// Argument Validation Tests
// =============================================================================

#[test]
fn test_out_of_range_temperature_rejected() {
    let (_dir, config) = config_dir();
    let output = run_eqiva(&config, &[ADDR, "--temp", "31"]);
    assert!(!output.status.success());
}

#[test]
fn test_malformed_program_rejected() {
    let (_dir, config) = config_dir();
    let output = run_eqiva(&config, &[ADDR, "--program", "mon", "17", "06:00"]);
    assert!(!output.status.success());
}

#[test]
fn test_operation_without_device_fails() {
    let (_dir, config) = config_dir();
    let output = run_eqiva(&config, &["--boost", "on"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No device"));
}

#[test]
fn test_unknown_alias_reported_in_json() {
    let (_dir, config) = config_dir();
    let output = run_eqiva(&config, &["attic", "--status", "--json"]);
    assert!(!output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["count"], 1);
    assert_eq!(value["devices"][0]["target"], "attic");
    assert_eq!(value["devices"][0]["ok"], false);
}

#[test]
fn test_json_and_commands_conflict() {
    let (_dir, config) = config_dir();
    let output = run_eqiva(&config, &[ADDR, "--json", "--commands"]);
    assert!(!output.status.success());
}
