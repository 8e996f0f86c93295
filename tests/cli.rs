//! Runs the `depmetric` binary the way a user would.

use serde_json::Value;
use std::process::{Command, Output};
use tempfile::TempDir;

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("pkg")).unwrap();
    std::fs::write(
        temp.path().join("pkg/a.py"),
        "class A:\n    def run(self):\n        pass\n",
    )
    .unwrap();
    temp
}

fn depmetric(temp: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_depmetric"))
        .current_dir(temp.path())
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_json_to_stdout_is_not_mixed_with_progress() {
    let temp = project();
    let output = depmetric(&temp, &[".", "-r", "summary-json=-"]);

    assert_eq!(output.status.code(), Some(0));
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["project"]["node-count"]["noc"], 1.0);

    let progress = String::from_utf8_lossy(&output.stderr);
    assert!(progress.contains("1 files parsed"));
}

#[test]
fn test_missing_report_exits_with_failure() {
    let temp = project();
    let output = depmetric(&temp, &["."]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No output specified."));
    assert!(output.stdout.is_empty());
}
