//! Integration tests for the wfdebug binary against fixture directories

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use wfdebug::test_utils::HistoryBuilder;
use wfdebug::WorkflowFixture;

fn write_fixture(root: &Path, namespace: &str, fixture: &WorkflowFixture) -> Result<()> {
    let dir = root.join(namespace);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(
        dir.join(format!(
            "{}.json",
            fixture.description.info.execution.workflow_id
        )),
        serde_json::to_string_pretty(fixture)?,
    )?;
    Ok(())
}

/// orders/order-1 fails because its child payment-1 failed an activity
fn create_history_dir() -> Result<TempDir> {
    let dir = TempDir::new()?;
    write_fixture(
        dir.path(),
        "orders",
        &HistoryBuilder::new("order-1", "run-o1", "OrderWorkflow")
            .activity("ReserveInventoryActivity")
            .failing_child("payment-1", "run-p1", "PaymentWorkflow", "child workflow failed")
            .failed("child workflow execution failed")
            .into_fixture(),
    )?;
    write_fixture(
        dir.path(),
        "orders",
        &HistoryBuilder::new("payment-1", "run-p1", "PaymentWorkflow")
            .failing_activity(
                "ChargeCardActivity",
                "activity error (type: ChargeCardActivity, scheduledEventID: 5, startedEventID: 6, identity: worker@1): card declined",
            )
            .failed("activity error")
            .into_fixture(),
    )?;
    write_fixture(
        dir.path(),
        "orders",
        &HistoryBuilder::new("order-2", "run-o2", "OrderWorkflow")
            .pending_activity("ShipActivity", 3)
            .timer("cooldown")
            .into_fixture(),
    )?;
    Ok(dir)
}

/// A command isolated from the developer's configuration
fn wfdebug(workdir: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("wfdebug")?;
    cmd.current_dir(workdir)
        .env("HOME", workdir)
        .env_remove("RUST_LOG")
        .env_remove("WFDEBUG_NAMESPACE")
        .env_remove("WFDEBUG_FOLLOW_NAMESPACES")
        .env_remove("WFDEBUG_HISTORY_DIR")
        .env_remove("WFDEBUG_MAX_DEPTH")
        .env_remove("WFDEBUG_FAILURES_SINCE");
    Ok(cmd)
}

#[test]
fn test_trace_reports_root_cause() -> Result<()> {
    let dir = create_history_dir()?;
    let output = wfdebug(dir.path())?
        .args(["trace", "order-1", "-n", "orders", "--history-dir"])
        .arg(dir.path())
        .output()?;

    assert!(
        output.status.success(),
        "trace should succeed: stderr = {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let trace: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(trace["depth"], 1);
    assert_eq!(trace["chain"][1]["workflow_id"], "payment-1");
    assert_eq!(trace["root_cause"]["type"], "ActivityFailed");
    assert_eq!(trace["root_cause"]["activity"], "ChargeCardActivity");
    Ok(())
}

#[test]
fn test_trace_mermaid_output() -> Result<()> {
    let dir = create_history_dir()?;
    wfdebug(dir.path())?
        .args(["trace", "order-1", "-n", "orders", "--format", "mermaid", "--history-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("graph TD"))
        .stdout(predicate::str::contains("root cause"));
    Ok(())
}

#[test]
fn test_history_dir_from_config_file() -> Result<()> {
    let dir = create_history_dir()?;
    std::fs::write(
        dir.path().join("wfdebug.yaml"),
        format!(
            "namespace: orders\nhistory_dir: \"{}\"\n",
            dir.path().display()
        ),
    )?;

    wfdebug(dir.path())?
        .args(["state", "order-2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"is_running\": true"))
        .stdout(predicate::str::contains("ShipActivity"));
    Ok(())
}

#[test]
fn test_failures_grouped_as_pie_chart() -> Result<()> {
    let dir = create_history_dir()?;
    wfdebug(dir.path())?
        .args([
            "failures",
            "-n",
            "orders",
            "--since",
            "1d",
            "--group-by",
            "type",
            "--format",
            "mermaid",
            "--history-dir",
        ])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("pie title Failures by type"));
    Ok(())
}

#[test]
fn test_failures_compact_listing() -> Result<()> {
    let dir = create_history_dir()?;
    let output = wfdebug(dir.path())?
        .args(["failures", "-n", "orders", "--compact-errors", "--history-dir"])
        .arg(dir.path())
        .output()?;

    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout)?;
    let failures = result["failures"].as_array().cloned().unwrap_or_default();
    let order = failures
        .iter()
        .find(|f| f["root_workflow"]["workflow_id"] == "order-1")
        .expect("order-1 should be listed");
    assert_eq!(order["root_cause"], "card declined");
    Ok(())
}

#[test]
fn test_timeline_filters_by_category() -> Result<()> {
    let dir = create_history_dir()?;
    let output = wfdebug(dir.path())?
        .args([
            "timeline",
            "order-1",
            "-n",
            "orders",
            "--event-types",
            "child_workflow",
            "--history-dir",
        ])
        .arg(dir.path())
        .output()?;

    assert!(output.status.success());
    let timeline: Value = serde_json::from_slice(&output.stdout)?;
    let events = timeline["events"].as_array().cloned().unwrap_or_default();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e["category"] == "child_workflow"));
    Ok(())
}

#[test]
fn test_missing_workflow_exits_with_warning_code() -> Result<()> {
    let dir = create_history_dir()?;
    wfdebug(dir.path())?
        .args(["trace", "does-not-exist", "-n", "orders", "--history-dir"])
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to describe workflow"));
    Ok(())
}

#[test]
fn test_missing_history_dir_exits_with_error_code() -> Result<()> {
    let dir = TempDir::new()?;
    wfdebug(dir.path())?
        .args(["trace", "order-1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no history directory"));
    Ok(())
}

#[test]
fn test_invalid_status_exits_with_error_code() -> Result<()> {
    let dir = create_history_dir()?;
    wfdebug(dir.path())?
        .args(["failures", "-n", "orders", "--status", "Exploded", "--history-dir"])
        .arg(dir.path())
        .assert()
        .code(2);
    Ok(())
}

#[test]
fn test_tool_spec_formats() -> Result<()> {
    let dir = TempDir::new()?;
    let output = wfdebug(dir.path())?
        .args(["tool-spec", "--format", "langchain"])
        .output()?;

    assert!(output.status.success());
    let specs: Vec<Value> = serde_json::from_slice(&output.stdout)?;
    let names: Vec<&str> = specs.iter().filter_map(|s| s["name"].as_str()).collect();
    assert_eq!(
        names,
        vec![
            "find_recent_failures",
            "get_workflow_state",
            "get_workflow_timeline",
            "trace_workflow_chain"
        ]
    );
    assert!(specs.iter().all(|s| s["args_schema"].is_object()));
    Ok(())
}

#[test]
fn test_compact_error_from_stdin() -> Result<()> {
    let dir = TempDir::new()?;
    wfdebug(dir.path())?
        .arg("compact-error")
        .write_stdin("ActivityFailed: ChargeCardActivity - card declined\n")
        .assert()
        .success()
        .stdout("card declined\n");
    Ok(())
}

#[test]
fn test_no_subcommand_prints_help() -> Result<()> {
    let dir = TempDir::new()?;
    wfdebug(dir.path())?
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
    Ok(())
}
