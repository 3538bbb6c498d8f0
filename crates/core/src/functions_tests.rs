// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

#[test]
fn register_and_invoke() {
    register("double", |kwargs| {
        let n = kwargs["n"].as_i64().ok_or("missing n")?;
        Ok(json!(n * 2))
    });
    assert!(is_registered("double"));
    assert_eq!(invoke("double", json!({"n": 21})).unwrap(), json!(42));
}

#[test]
fn invoke_unknown_function_fails() {
    let err = invoke("nope", json!({})).unwrap_err();
    assert!(err.contains("not registered"));
}

#[test]
fn artifact_names_are_unique_and_related() {
    let first = artifact_names("probe");
    let second = artifact_names("probe");
    assert_ne!(first.remote, second.remote);
    assert_eq!(first.local, format!("local_{}", first.remote));
    assert_eq!(first.local_return, format!("return_{}", first.remote));
    assert_eq!(first.remote_return, format!("remote_{}", first.local_return));
}

#[test]
fn run_payload_round_trip() {
    register("add", |kwargs| {
        let a = kwargs["a"].as_i64().ok_or("missing a")?;
        let b = kwargs["b"].as_i64().ok_or("missing b")?;
        Ok(json!(a + b))
    });

    let dir = tempfile::tempdir().unwrap();
    let payload_path = dir.path().join("payload.json");
    let return_path = dir.path().join("return.json");
    let payload = FunctionPayload {
        function: "add".into(),
        kwargs: json!({"a": 40, "b": 2}),
    };
    std::fs::write(&payload_path, serde_json::to_string(&payload).unwrap()).unwrap();

    run_payload(
        payload_path.to_str().unwrap(),
        return_path.to_str().unwrap(),
    )
    .unwrap();

    let blob = std::fs::read_to_string(&return_path).unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(&blob).unwrap(), json!(42));
}

#[test]
fn run_payload_reports_missing_file() {
    let err = run_payload("/nonexistent/payload.json", "/tmp/out.json").unwrap_err();
    assert!(err.contains("cannot read payload"));
}
