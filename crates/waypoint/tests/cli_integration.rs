//! CLI integration tests for the waypoint command-line interface.
//!
//! Every test runs in an empty temp directory with an empty user config
//! directory so no real configuration leaks in.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn workflows_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("workflows")
}

fn workflow(name: &str) -> String {
    workflows_dir().join(name).display().to_string()
}

/// A waypoint command isolated from user and project config.
fn waypoint(sandbox: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("waypoint").unwrap();
    cmd.current_dir(sandbox.path())
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(sandbox.path());
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let sandbox = TempDir::new().unwrap();
    waypoint(&sandbox)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let sandbox = TempDir::new().unwrap();
    waypoint(&sandbox)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("waypoint"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let sandbox = TempDir::new().unwrap();
    waypoint(&sandbox)
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Validate
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_validate_demo_workflow() {
    let sandbox = TempDir::new().unwrap();
    waypoint(&sandbox)
        .args(["validate", &workflow("document-intake.json")])
        .assert()
        .success()
        .stdout(predicate::str::contains("document-intake"))
        .stdout(predicate::str::contains("States: 11"));
}

#[test]
fn test_validate_toml_workflow_json_output() {
    let sandbox = TempDir::new().unwrap();
    waypoint(&sandbox)
        .args(["--json", "validate", &workflow("document-intake.toml")])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""valid": true"#))
        .stdout(predicate::str::contains(r#""workflow": "document-intake-lite""#))
        .stdout(predicate::str::contains(r#""terminal": ["#));
}

#[test]
fn test_validate_lists_terminal_states() {
    let sandbox = TempDir::new().unwrap();
    let path = sandbox.path().join("ends.json");
    std::fs::write(
        &path,
        r#"{"start": "Check", "states": {
            "Check": {"type": "branch", "choices": [{"condition": "ok", "next": "Done"}], "default": "Reject"},
            "Reject": {"type": "fail", "error": "Rejected"},
            "Done": {"type": "succeed"}
        }}"#,
    )
    .unwrap();

    waypoint(&sandbox)
        .args(["validate", &path.display().to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ends:"))
        .stdout(predicate::str::contains("Reject, Done"));

    waypoint(&sandbox)
        .args(["--json", "validate", &path.display().to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""Reject""#))
        .stdout(predicate::str::contains(r#""Done""#));
}

#[test]
fn test_validate_rejects_dangling_reference() {
    let sandbox = TempDir::new().unwrap();
    let path = sandbox.path().join("broken.json");
    std::fs::write(
        &path,
        r#"{"start": "A", "states": {"A": {"type": "transform", "expression": "1", "next": "Nowhere"}}}"#,
    )
    .unwrap();

    waypoint(&sandbox)
        .args(["validate", &path.display().to_string()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid"))
        .stdout(predicate::str::contains("Nowhere"));
}

#[test]
fn test_validate_rejects_cycles_when_configured() {
    let sandbox = TempDir::new().unwrap();
    std::fs::write(
        sandbox.path().join("config.toml"),
        "[engine]\nallow_cycles = false\n",
    )
    .unwrap();
    let path = sandbox.path().join("loop.json");
    std::fs::write(
        &path,
        r#"{"start": "Poll", "states": {
            "Poll": {"type": "branch", "choices": [{"condition": "ready", "next": "Done"}], "default": "Poll"},
            "Done": {"type": "succeed"}
        }}"#,
    )
    .unwrap();

    waypoint(&sandbox)
        .args(["--json", "validate", &path.display().to_string()])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""valid": false"#))
        .stdout(predicate::str::contains("cycle"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_run_invoice_succeeds() {
    let sandbox = TempDir::new().unwrap();
    waypoint(&sandbox)
        .args([
            "--json",
            "run",
            &workflow("document-intake.json"),
            "--input",
            r#"{"document": {"id": "d1"}}"#,
            "--fixtures",
            &workflow("document-intake.fixtures.json"),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "succeeded""#))
        .stdout(predicate::str::contains(r#""actionType": "processPayment""#))
        .stdout(predicate::str::contains(r#""invoiceNumber": "INV-2024-0042""#));
}

#[test]
fn test_run_low_confidence_exits_nonzero() {
    let sandbox = TempDir::new().unwrap();
    waypoint(&sandbox)
        .args([
            "--json",
            "run",
            &workflow("document-intake.json"),
            "--input",
            r#"{"document": {"id": "d1"}}"#,
            "--fixtures",
            &workflow("low-confidence.fixtures.json"),
            "--history",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""status": "failed""#))
        .stdout(predicate::str::contains(r#""category": "NeedsReview""#))
        .stdout(predicate::str::contains("RequestManualReview"))
        .stdout(predicate::str::contains("PrepareExtraction").not());
}

#[test]
fn test_run_input_from_file_with_history() {
    let sandbox = TempDir::new().unwrap();
    let input = sandbox.path().join("input.json");
    std::fs::write(&input, r#"{"document": {"id": "d7"}}"#).unwrap();

    waypoint(&sandbox)
        .args([
            "run",
            &workflow("document-intake.json"),
            "--input",
            &format!("@{}", input.display()),
            "--fixtures",
            &workflow("document-intake.fixtures.json"),
            "--history",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("succeeded"))
        .stdout(predicate::str::contains("ExtractData (attempts: 2"))
        .stdout(predicate::str::contains("\"d7\""));
}

#[test]
fn test_run_missing_fixture_is_an_error() {
    let sandbox = TempDir::new().unwrap();
    waypoint(&sandbox)
        .args(["run", &workflow("document-intake.json")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unregistered units"));
}

#[test]
fn test_run_rejects_invalid_input() {
    let sandbox = TempDir::new().unwrap();
    waypoint(&sandbox)
        .args([
            "run",
            &workflow("document-intake.toml"),
            "--input",
            "{not json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_shows_layers() {
    let sandbox = TempDir::new().unwrap();
    std::fs::write(
        sandbox.path().join("config.toml"),
        "[engine]\nmax_steps = 40\n",
    )
    .unwrap();
    std::fs::write(
        sandbox.path().join("waypoint.toml"),
        "[environment]\nregion = \"eu-west-1\"\n",
    )
    .unwrap();

    waypoint(&sandbox)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_steps = 40"))
        .stdout(predicate::str::contains("region = \"eu-west-1\""))
        .stdout(predicate::str::contains("waypoint.toml"));
}

#[test]
fn test_config_malformed_layer_is_skipped() {
    let sandbox = TempDir::new().unwrap();
    std::fs::write(sandbox.path().join("waypoint.toml"), "not toml {{{{").unwrap();

    waypoint(&sandbox)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("no config files loaded"))
        .stdout(predicate::str::contains("warning"));
}

#[test]
fn test_config_path_uses_override() {
    let sandbox = TempDir::new().unwrap();
    waypoint(&sandbox)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}
