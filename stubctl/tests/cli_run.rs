//! CLI tests for `stubctl`.
//!
//! Spawns the binary and checks stdout reports and exit codes.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const SCENARIO: &str = r#"{
  "name": "cli",
  "behaviors": [{ "steps": [
    { "op": "yields", "args": [null, "test file"] },
    { "op": "set_before_callback_hook", "inject": [{ "pos": 1, "value": "hook invoked" }] }
  ]}],
  "calls": [{ "args": [{ "$callback": "done" }] }]
}"#;

fn stubctl(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stubctl"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn stubctl")
}

#[test]
fn run_prints_json_lines_report() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("scenario.json"), SCENARIO).expect("write scenario");

    let output = stubctl(temp.path(), &["run", "scenario.json"]);
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["kind"], "callback");
    assert_eq!(lines[0]["args"], serde_json::json!([null, "hook invoked"]));
    assert_eq!(lines[2]["kind"], "summary");
}

#[test]
fn run_exits_with_unhandled_code_on_rejected_hook() {
    let temp = tempfile::tempdir().expect("tempdir");
    let scenario = r#"{
      "name": "rejected",
      "behaviors": [{ "steps": [
        { "op": "yields", "args": ["error"] },
        { "op": "set_before_callback_hook", "promise": { "reject": "denied" } }
      ]}],
      "calls": [{ "args": [{ "$callback": "done" }] }]
    }"#;
    fs::write(temp.path().join("scenario.json"), scenario).expect("write scenario");

    let output = stubctl(temp.path(), &["run", "scenario.json"]);
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("\"kind\":\"unhandled\""));
}

#[test]
fn validate_rejects_bad_scenarios() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("bad.json"),
        r#"{
            "name": "bad",
            "behaviors": [{ "steps": [{ "op": "returns_arg", "index": -1 }] }],
            "calls": [{}]
        }"#,
    )
    .expect("write scenario");

    let output = stubctl(temp.path(), &["validate", "bad.json"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("utf8");
    assert!(stderr.contains("behaviors[0].steps[0]"), "{stderr}");
}

#[test]
fn config_prints_defaults_and_writes_when_asked() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = stubctl(temp.path(), &["config"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("double_name = \"stub\""), "{stdout}");
    assert!(!temp.path().join("stub-behavior.toml").exists());

    let output = stubctl(temp.path(), &["config", "--write"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(temp.path().join("stub-behavior.toml").exists());
}

#[test]
fn run_uses_config_double_name_in_failures() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("stub-behavior.toml"), "double_name = \"fs.readFile\"\n")
        .expect("write config");
    let scenario = r#"{
      "name": "missing-callback",
      "behaviors": [{ "steps": [{ "op": "yields" }] }],
      "calls": [{ "args": ["fake_path"] }]
    }"#;
    fs::write(temp.path().join("scenario.json"), scenario).expect("write scenario");

    let output = stubctl(temp.path(), &["run", "scenario.json"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("fs.readFile expected to yield"), "{stdout}");
}
