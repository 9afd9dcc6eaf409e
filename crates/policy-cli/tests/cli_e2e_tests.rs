//! Integration tests for the policy CLI binary.
//!
//! These tests exercise the actual compiled binary using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Get a Command for the policy binary
fn policy_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("policy"));
    cmd.env_remove("POLICY_CONFIG").env_remove("RUST_LOG");
    cmd
}

const MANIFEST: &str = r#"
[core]
state_dir = "state"

[[objects]]
kind = "network"
name = "lan"
attributes = { value = "10.0.0.0/24" }

[[objects]]
kind = "access_rule"
name = "allow-lan"
position = { section = "mandatory", insert_after = 3 }
attributes = { action = "ALLOW" }
"#;

fn write_manifest(dir: &Path, content: &str) {
    fs::write(dir.join("policy.toml"), content).unwrap();
}

/// A ledger as a previous apply would have left it
fn write_ledger(dir: &Path) {
    fs::create_dir_all(dir.join("state")).unwrap();
    fs::write(
        dir.join("state/networks.ledger.toml"),
        r#"version = "1.0"
collection = "networks"

[[entries]]
name = "lan"
remote_id = "005056A1-0001"
applied_at = "2026-01-05T10:00:00Z"

[entries.last_applied]
value = "10.0.0.0/24"

[[entries]]
name = "old"
remote_id = "005056A1-0002"
applied_at = "2026-01-05T10:00:00Z"

[entries.last_applied]
value = "10.9.0.0/24"
"#,
    )
    .unwrap();
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_output() {
    policy_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("ledger"));
}

#[test]
fn test_version_output() {
    policy_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("policy"));
}

#[test]
fn test_no_command_shows_hint() {
    policy_cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("policy --help"));
}

// ============================================================================
// Validate
// ============================================================================

#[test]
fn test_validate_good_manifest() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), MANIFEST);

    policy_cmd()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("access_rules"));
}

#[test]
fn test_validate_rejects_ambiguous_position() {
    let dir = tempdir().unwrap();
    write_manifest(
        dir.path(),
        r#"
[[objects]]
kind = "access_rule"
name = "r1"
position = { insert_before = 1, insert_after = 2 }
"#,
    );

    policy_cmd()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn test_validate_rejects_duplicate_names() {
    let dir = tempdir().unwrap();
    write_manifest(
        dir.path(),
        r#"
[[objects]]
kind = "host"
name = "web"

[[objects]]
kind = "host"
name = "web"
"#,
    );

    policy_cmd()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_manifest_fails() {
    let dir = tempdir().unwrap();

    policy_cmd()
        .current_dir(dir.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("policy.toml"));
}

// ============================================================================
// Plan
// ============================================================================

#[test]
fn test_plan_fresh_manifest() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), MANIFEST);

    policy_cmd()
        .current_dir(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("lan"))
        .stdout(predicate::str::contains("?section=mandatory&insertAfter=3"))
        .stdout(predicate::str::contains("2 to create"));

    // Planning writes nothing
    assert!(!dir.path().join("state").exists());
}

#[test]
fn test_plan_against_existing_ledger() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), MANIFEST);
    write_ledger(dir.path());

    let output = policy_cmd()
        .current_dir(dir.path())
        .args(["plan", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["has_changes"], true);
    assert_eq!(value["summary"]["creates"], 1);
    assert_eq!(value["summary"]["deletes"], 1);
    assert_eq!(value["summary"]["unchanged"], 1);

    let networks = &value["collections"][0];
    assert_eq!(networks["collection"], "networks");
    assert_eq!(networks["deletes"][0]["remote_id"], "005056A1-0002");
}

#[test]
fn test_plan_with_config_flag() {
    let dir = tempdir().unwrap();
    let site = dir.path().join("site");
    fs::create_dir_all(&site).unwrap();
    write_manifest(&site, MANIFEST);

    policy_cmd()
        .current_dir(dir.path())
        .args(["plan", "--config", "site/policy.toml", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"has_changes\": true"));
}

// ============================================================================
// Ledger
// ============================================================================

#[test]
fn test_ledger_list() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), MANIFEST);
    write_ledger(dir.path());

    policy_cmd()
        .current_dir(dir.path())
        .args(["ledger", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("networks"))
        .stdout(predicate::str::contains("005056A1-0001"));
}

#[test]
fn test_ledger_list_empty() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), MANIFEST);

    policy_cmd()
        .current_dir(dir.path())
        .args(["ledger", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No ledger entries"));
}

#[test]
fn test_ledger_forget_then_plan_recreates() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), MANIFEST);
    write_ledger(dir.path());

    policy_cmd()
        .current_dir(dir.path())
        .args(["ledger", "forget", "networks", "lan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no longer owned"));

    let ledger = fs::read_to_string(dir.path().join("state/networks.ledger.toml")).unwrap();
    assert!(!ledger.contains("005056A1-0001"));
    assert!(ledger.contains("005056A1-0002"));
}

#[test]
fn test_ledger_forget_unknown_entry() {
    let dir = tempdir().unwrap();
    write_manifest(dir.path(), MANIFEST);
    write_ledger(dir.path());

    policy_cmd()
        .current_dir(dir.path())
        .args(["ledger", "forget", "networks", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}
