// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::Command;

use super::*;

#[tokio::test]
async fn run_with_timeout_captures_output() {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("echo done");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "sh").await.unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "done");
}

#[tokio::test]
async fn run_with_timeout_times_out() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let err = run_with_timeout(cmd, Duration::from_millis(100), "sleep")
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { .. }));
}

#[tokio::test]
async fn stream_command_forwards_lines_in_order() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let on_output = move |line: &str| sink.lock().push(line.to_string());
    let on_output: &OutputFn = &on_output;

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("echo one; echo two");
    let result = stream_command(cmd, None, "sh", Some(on_output)).await.unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.output, "one\ntwo\n");
    assert_eq!(*seen.lock(), vec!["one".to_string(), "two".to_string()]);
}

#[tokio::test]
async fn stream_command_merges_stderr() {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("echo out; echo err >&2; exit 3");
    let result = stream_command(cmd, None, "sh", None).await.unwrap();

    assert_eq!(result.exit_code, 3);
    assert!(result.output.contains("out\n"));
    assert!(result.output.contains("err\n"));
    assert!(!result.success());
}

#[tokio::test]
async fn stream_command_times_out() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let err = stream_command(cmd, Some(Duration::from_millis(100)), "sleep", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { .. }));
}
