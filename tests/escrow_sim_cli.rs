//! Integration tests for the escrow-sim CLI
//!
//! Runs the simulator binary per scenario and checks the JSON-lines stream and
//! the closing summary.

use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;

fn escrow_sim_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_escrow-sim"))
}

fn run_scenario(scenario: &str) -> Vec<Value> {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(escrow_sim_binary())
        .current_dir(dir.path())
        .env_remove("ESCROW_SCENARIO")
        .env_remove("ESCROW_CONFIG_PATH")
        .env("RUST_LOG", "warn")
        .args(["--scenario", scenario])
        .output()
        .expect("Failed to execute escrow-sim");

    assert!(
        output.status.success(),
        "escrow-sim {} failed: {}",
        scenario,
        String::from_utf8_lossy(&output.stderr)
    );

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line is not JSON"))
        .collect()
}

fn events(lines: &[Value]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line["event"].as_str().map(str::to_string))
        .collect()
}

fn summary(lines: &[Value]) -> &Value {
    &lines.last().expect("no output")["summary"]
}

#[test]
fn test_maker_wins_cli() {
    let lines = run_scenario("maker-wins");
    assert_eq!(
        events(&lines),
        vec!["created", "taken", "request_submitted", "settled"]
    );
    let summary = summary(&lines);
    assert_eq!(summary["state"], "closed");
    assert_eq!(summary["maker_balance"], "1012500000000000000");
    assert_eq!(summary["taker_balance"], "980000000000000000");
    assert_eq!(summary["oracle_balance"], "7500000000000000");
    assert_eq!(summary["escrow_total"], "0");
    assert_eq!(summary["registry"]["symbol"], "BTCF");
    assert_eq!(summary["audit_violations"].as_array().unwrap().len(), 0);
}

#[test]
fn test_taker_wins_cli() {
    let lines = run_scenario("taker-wins");
    let settled = &lines[3];
    assert_eq!(settled["event"], "settled");
    assert_eq!(settled["winner"], "taker");
    assert_eq!(summary(&lines)["taker_balance"], "1002500000000000000");
}

#[test]
fn test_rejected_cli() {
    let lines = run_scenario("rejected");
    assert_eq!(
        events(&lines),
        vec!["created", "taken", "request_submitted", "settlement_failed"]
    );
    assert_eq!(lines[3]["handle"], -252);
    let summary = summary(&lines);
    assert_eq!(summary["maker_balance"], "1000000000000000000");
    assert_eq!(summary["taker_balance"], "992500000000000000");
}

#[test]
fn test_failed_callback_cli() {
    let lines = run_scenario("failed-callback");
    assert_eq!(lines[3]["event"], "settlement_failed");
    assert_eq!(lines[3]["status"], -1);
    assert!(lines[2]["handle"].as_i64().unwrap() > 0);
}

#[test]
fn test_cancel_cli() {
    let lines = run_scenario("cancel");
    assert_eq!(events(&lines), vec!["created", "canceled"]);
    assert_eq!(summary(&lines)["maker_balance"], "1000000000000000000");
    assert_eq!(summary(&lines)["registry"]["total_supply"], 1);
}
