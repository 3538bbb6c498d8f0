// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;
use yare::parameterized;

use lc_transport::LocalConnection;

use super::*;

fn exec_opts(log_root: &Path, working_dir: Option<&str>) -> ExecuteOptions {
    ExecuteOptions {
        debug: false,
        log_root: log_root.to_path_buf(),
        working_dir: working_dir.map(str::to_string),
    }
}

#[test]
fn composition_appends_steps_in_order() {
    let task = Task::new("compose");
    task.run_command("echo one")
        .unwrap()
        .send_file("/tmp/in.txt", None)
        .unwrap()
        .get_file("out.txt", None)
        .unwrap();
    let steps = task.steps();
    assert_eq!(steps.len(), 3);
    assert!(matches!(steps[0], TaskStep::RunCommand { .. }));
    assert!(matches!(steps[1], TaskStep::SendFile { .. }));
    assert!(matches!(steps[2], TaskStep::GetFile { .. }));
}

#[parameterized(
    empty_command = { "command" },
    empty_local = { "local" },
    empty_remote = { "remote" },
)]
fn composition_rejects_empty_inputs(kind: &str) {
    let task = Task::new("invalid");
    let result = match kind {
        "command" => task.run_command("").map(|_| ()),
        "local" => task.send_file("", None).map(|_| ()),
        _ => task.get_file("", None).map(|_| ()),
    };
    assert!(matches!(result, Err(LazyError::InvalidArgument(_))));
}

#[test]
fn run_function_requires_registration() {
    let task = Task::new("unregistered");
    let err = task.run_function("never-registered", json!({})).unwrap_err();
    assert!(matches!(err, LazyError::InvalidArgument(_)));
}

#[test]
fn run_function_expands_into_six_sub_steps() {
    lc_core::functions::register("expand-six", |_| Ok(json!(null)));
    let task = Task::new("fn-steps");
    task.run_function("expand-six", json!({"x": 1})).unwrap();

    let steps = task.steps();
    assert_eq!(steps.len(), 1);
    let TaskStep::RunFunction { function, steps, .. } = &steps[0] else {
        panic!("expected a function step");
    };
    assert_eq!(function, "expand-six");
    assert_eq!(steps.len(), 6);
    assert!(matches!(&steps[0], TaskStep::SendFile { .. }));
    assert!(matches!(&steps[1], TaskStep::RunCommand { command } if command.contains("test -x")));
    assert!(
        matches!(&steps[2], TaskStep::RunCommand { command } if command.contains("LAZYCLUSTER_RUN_PAYLOAD"))
    );
    assert!(matches!(&steps[3], TaskStep::RunCommand { command } if command.starts_with("rm ")));
    assert!(matches!(&steps[4], TaskStep::GetFile { .. }));
    assert!(matches!(&steps[5], TaskStep::RunCommand { command } if command.starts_with("rm ")));

    assert_eq!(task.return_artifact_paths().len(), 1);
    assert!(task.has_function_steps());
}

#[test]
fn run_function_writes_the_payload_file() {
    lc_core::functions::register("payload-probe", |_| Ok(json!(null)));
    let task = Task::new("fn-payload");
    task.run_function("payload-probe", json!({"n": 3})).unwrap();

    let steps = task.steps();
    let TaskStep::RunFunction { steps, .. } = &steps[0] else {
        panic!("expected a function step");
    };
    let TaskStep::SendFile { local_path, .. } = &steps[0] else {
        panic!("expected the payload send step first");
    };
    let payload: lc_core::FunctionPayload =
        serde_json::from_str(&std::fs::read_to_string(local_path).unwrap()).unwrap();
    assert_eq!(payload.function, "payload-probe");
    assert_eq!(payload.kwargs, json!({"n": 3}));
}

#[test]
fn deep_copy_renames_and_regenerates_function_artifacts() {
    lc_core::functions::register("copy-me", |_| Ok(json!(null)));
    let task = Task::new("original");
    task.run_command("echo hi").unwrap();
    task.run_function("copy-me", json!({})).unwrap();

    let first = task.deep_copy().unwrap();
    let second = task.deep_copy().unwrap();
    assert_eq!(first.name(), "original-1");
    assert_eq!(second.name(), "original-2");

    // Elementary steps are reused, function artifacts are fresh.
    assert_eq!(first.steps().len(), 2);
    assert_ne!(
        task.return_artifact_paths()[0],
        first.return_artifact_paths()[0]
    );
    assert_ne!(
        first.return_artifact_paths()[0],
        second.return_artifact_paths()[0]
    );
}

#[test]
fn deep_copy_carries_env_and_join_flag_but_not_state() {
    let task = Task::new("original");
    task.run_command("echo hi").unwrap();
    task.set_env_variables(std::collections::HashMap::from([(
        "KEY".to_string(),
        "value".to_string(),
    )]));
    task.set_omit_on_join(true);

    let copy = task.deep_copy().unwrap();
    assert_eq!(copy.env_variables()["KEY"], "value");
    assert!(copy.omit_on_join());
    assert!(copy.execution_log().is_empty());
    assert!(copy.execution_log_file_path().is_none());
    assert!(!copy.has_handle());
}

#[tokio::test]
async fn execute_captures_output_per_step() {
    let tmp = tempfile::tempdir().unwrap();
    let task = Task::new("echo-round-trip");
    task.run_command("echo Hello").unwrap();

    let conn = LocalConnection::new();
    task.execute(&conn, &exec_opts(tmp.path(), Some(&tmp.path().display().to_string())))
        .await
        .unwrap();

    assert_eq!(task.execution_log(), vec!["Hello".to_string()]);
    let log_path = task.execution_log_file_path().unwrap();
    assert!(log_path.exists());
    assert_eq!(std::fs::read_to_string(log_path).unwrap(), "Hello\n");
}

#[tokio::test]
async fn execute_fails_with_step_index_and_log_path() {
    let tmp = tempfile::tempdir().unwrap();
    let task = Task::new("failing");
    task.run_command("echo before").unwrap();
    task.run_command("echo boom; exit 3").unwrap();

    let conn = LocalConnection::new();
    let err = task
        .execute(&conn, &exec_opts(tmp.path(), Some(&tmp.path().display().to_string())))
        .await
        .unwrap_err();

    let LazyError::TaskExecution {
        step_index,
        task_name,
        host,
        log_file,
        output,
    } = err
    else {
        panic!("expected a task execution error");
    };
    assert_eq!(step_index, 1);
    assert_eq!(task_name, "failing");
    assert_eq!(host, "localhost");
    assert_eq!(output, "boom");
    let contents = std::fs::read_to_string(log_file).unwrap();
    assert!(contents.contains("before"));
    assert!(contents.contains("boom"));
}

#[tokio::test]
async fn execute_resolves_transfer_paths_against_the_working_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    let source = tmp.path().join("in.txt");
    std::fs::write(&source, "data").unwrap();

    let task = Task::new("transfer");
    task.send_file(&source, None).unwrap();
    task.get_file("./in.txt", Some(tmp.path().join("back.txt"))).unwrap();

    let conn = LocalConnection::new();
    task.execute(
        &conn,
        &exec_opts(tmp.path(), Some(&work.display().to_string())),
    )
    .await
    .unwrap();

    assert!(work.join("in.txt").exists());
    assert_eq!(std::fs::read_to_string(tmp.path().join("back.txt")).unwrap(), "data");

    // Resolved paths are written back for observability.
    let steps = task.steps();
    let TaskStep::SendFile { remote_path, .. } = &steps[0] else {
        panic!("expected a send step");
    };
    assert_eq!(remote_path, &format!("{}/in.txt", work.display()));
    // Transfers contribute empty log entries, one per elementary step.
    assert_eq!(task.execution_log(), vec![String::new(), String::new()]);
}

#[tokio::test]
async fn function_returns_yield_in_registration_order() {
    lc_core::functions::register("first-value", |_| Ok(json!(1)));
    lc_core::functions::register("second-value", |_| Ok(json!(2)));

    let task = Task::new("ordered");
    task.run_function("first-value", json!({})).unwrap();
    task.run_function("second-value", json!({})).unwrap();

    // Simulate the remote side by writing the return blobs directly.
    let paths = task.return_artifact_paths();
    std::fs::write(&paths[0], "1").unwrap();
    std::fs::write(&paths[1], "2").unwrap();

    let returns: Vec<_> = task.function_returns().await.unwrap().collect();
    assert_eq!(returns, vec![Some(json!(1)), Some(json!(2))]);
}

#[tokio::test]
async fn missing_return_artifact_yields_none() {
    lc_core::functions::register("missing-return", |_| Ok(json!(null)));
    let task = Task::new("missing");
    task.run_function("missing-return", json!({})).unwrap();

    let returns: Vec<_> = task.function_returns().await.unwrap().collect();
    assert_eq!(returns, vec![None]);
}

#[test]
fn cleanup_removes_the_temp_directory() {
    lc_core::functions::register("cleanup-probe", |_| Ok(json!(null)));
    let task = Task::new("cleanup");
    task.run_function("cleanup-probe", json!({})).unwrap();

    let payload_dir = task.return_artifact_paths()[0].parent().unwrap().to_path_buf();
    assert!(payload_dir.exists());
    task.cleanup();
    assert!(!payload_dir.exists());
}

#[test]
fn resolve_get_path_rules() {
    assert_eq!(resolve_get_path("./sub/file", "/work"), "/work/sub/file");
    assert_eq!(resolve_get_path("file.txt", "/work"), "/work/file.txt");
    assert_eq!(resolve_get_path("nested/file.txt", "/work"), "/work/file.txt");
    assert_eq!(resolve_get_path("/abs/file.txt", "/work"), "/abs/file.txt");
}

#[test]
fn resolve_send_path_rules() {
    let local = Path::new("/local/dir/in.txt");
    assert_eq!(resolve_send_path("", local, "/work"), "/work/in.txt");
    assert_eq!(resolve_send_path("./sub/out.txt", local, "/work"), "/work/sub/out.txt");
    assert_eq!(resolve_send_path("/abs/out.txt", local, "/work"), "/abs/out.txt");
}
