// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use super::*;

#[test]
fn port_in_use_names_the_host() {
    let err = LazyError::PortInUse {
        port: 8786,
        host: Some("host-1".into()),
    };
    assert_eq!(err.to_string(), "port 8786 is already in use on host host-1");
}

#[test]
fn port_in_use_without_host() {
    let err = LazyError::PortInUse {
        port: 8786,
        host: None,
    };
    assert_eq!(err.to_string(), "port 8786 is already in use");
}

#[test]
fn task_execution_points_at_the_log_file() {
    let err = LazyError::TaskExecution {
        step_index: 2,
        task_name: "deploy".into(),
        host: "host-1".into(),
        log_file: PathBuf::from("/tmp/deploy_20260101000000.log"),
        output: "boom".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("step 2"));
    assert!(msg.contains("host-1"));
    assert!(msg.contains("/tmp/deploy_20260101000000.log"));
    assert!(msg.contains("boom"));
}

#[test]
fn no_runtimes_detected_keeps_the_cause() {
    let err = LazyError::NoRuntimesDetected {
        cause: Some("empty group".into()),
    };
    assert!(err.to_string().contains("caused by: empty group"));
}

#[test]
fn other_with_cause_chains_messages() {
    let err = LazyError::other_with_cause("probe failed", "timeout");
    assert_eq!(err.to_string(), "probe failed, caused by: timeout");
}
