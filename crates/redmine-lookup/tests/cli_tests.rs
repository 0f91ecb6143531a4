//! End-to-end tests of the binary in `--demo` mode.

mod common;

use serde_json::Value;
use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run(args: &[&str]) -> Output {
    Command::new(common::binary())
        .args(args)
        .env_remove("REDMINE_URL")
        .env_remove("REDMINE_API_KEY")
        .env_remove("REDMINE_ADMIN_API_KEY")
        .env_remove("REDMINE_PROJECT")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute redmine-lookup binary")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_demo_lookup_with_details() {
    let output = run(&["--demo", "lookup", "8.8.8.8", "--details"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json = stdout_json(&output);
    assert_eq!(json[0]["entity"]["type"], "IPv4");
    assert_eq!(json[0]["data"]["total_count"], 2);
    assert_eq!(json[0]["details"]["issues"].as_array().unwrap().len(), 2);
    assert!(json[0]["details"]["statuses"].is_array());
}

#[test]
fn test_validate_reports_trailing_slash() {
    let output = run(&["--url", "https://redmine.example.com/", "validate"]);
    assert!(!output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json[0]["key"], "url");
}

#[test]
fn test_validate_accepts_good_url() {
    let output = run(&["--url", "https://redmine.example.com", "validate"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), serde_json::json!([]));
}

#[test]
fn test_dispatch_from_stdin() {
    let mut child = Command::new(common::binary())
        .args(["--demo", "dispatch", "-"])
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn redmine-lookup binary");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"{"action": "UPDATE_STATUS", "id": 101, "newStatus": {"id": 2, "name": "In Progress"}}"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_json(&output)["status"]["name"], "In Progress");
}

#[test]
fn test_dispatch_rejected_transition_prints_error() {
    let output = run(&[
        "--demo",
        "dispatch",
        r#"{"action": "UPDATE_STATUS", "id": 101, "newStatus": {"id": 5, "name": "Closed"}, "oldStatus": {"id": 1, "name": "New"}}"#,
    ]);
    assert!(!output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["error"]["kind"]["type"], "semantic_mismatch");
    assert_eq!(json["error"]["severity"], "warning");
}

#[test]
fn test_dispatch_unknown_action() {
    let output = run(&["--demo", "dispatch", r#"{"action": "EXPLODE"}"#]);
    assert!(!output.status.success());
    assert_eq!(stdout_json(&output)["error"]["detail"], "Invalid Action passed to onMessage");
}
