// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use yare::parameterized;

use super::*;

fn local_runtime(tmp: &tempfile::TempDir) -> Runtime {
    Runtime::unvalidated(LOCALHOST, Environment::new(tmp.path().join("main")))
}

async fn with_working_dir(tmp: &tempfile::TempDir) -> Runtime {
    let runtime = local_runtime(tmp);
    let work = tmp.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    runtime
        .set_working_dir(&work.display().to_string())
        .await
        .unwrap();
    runtime
}

#[parameterized(
    py36 = { "Python 3.6.8", true },
    py310 = { "Python 3.10.12 extra", true },
    py4 = { "Python 4.0.0", true },
    py35 = { "Python 3.5.9", false },
    py27 = { "Python 2.7.18", false },
    garbage = { "command not found", false },
    empty = { "", false },
)]
fn python_version_gate(stdout: &str, expected: bool) {
    assert_eq!(python_version_supported(stdout), expected);
}

#[tokio::test]
async fn sync_execution_records_task_and_log() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;

    let task = Task::new("echo-task");
    task.run_command("echo Hello").unwrap();
    runtime
        .execute_task(
            &task,
            TaskDispatch {
                execute_async: false,
                ..TaskDispatch::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(task.execution_log(), vec!["Hello".to_string()]);
    assert!(task.execution_log_file_path().unwrap().exists());
    assert_eq!(runtime.tasks().len(), 1);
    // Synchronous execution registers no process.
    assert!(runtime.get_processes(false).is_empty());
}

#[tokio::test]
async fn async_execution_registers_the_task_process() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;

    let task = Task::new("async-task");
    task.run_command("echo async").unwrap();
    runtime
        .execute_task(&task, TaskDispatch::default())
        .await
        .unwrap();

    let key = lc_core::proc_key::task_key(LOCALHOST, "async-task");
    assert!(runtime.get_process(&key).is_ok());
    task.join().await.unwrap();
    assert_eq!(task.execution_log(), vec!["async".to_string()]);
    assert_eq!(runtime.alive_task_process_count(), 0);
}

#[tokio::test]
async fn env_variables_are_stamped_onto_the_task() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;
    runtime.add_env_variables(std::collections::HashMap::from([(
        "GREETING".to_string(),
        "hello".to_string(),
    )]));

    let task = Task::new("env-task");
    task.run_command("echo \"$GREETING\"").unwrap();
    runtime
        .execute_task(
            &task,
            TaskDispatch {
                execute_async: false,
                ..TaskDispatch::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(task.execution_log(), vec!["hello".to_string()]);
    assert!(task.env_variables().contains_key(WORKING_DIR_ENV_VAR));
}

#[tokio::test]
async fn working_dir_env_invariant_survives_replacement() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;
    let dir = runtime.working_dir().await.unwrap();

    runtime.set_env_variables(std::collections::HashMap::from([(
        "OTHER".to_string(),
        "x".to_string(),
    )]));
    let env = runtime.env_variables();
    assert_eq!(env[WORKING_DIR_ENV_VAR], dir);
    assert_eq!(env["OTHER"], "x");
}

#[tokio::test]
async fn working_dir_is_created_once() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = local_runtime(&tmp);

    let first = runtime.working_dir().await.unwrap();
    let second = runtime.working_dir().await.unwrap();
    assert_eq!(first, second);
    assert!(std::path::Path::new(&first).exists());

    runtime.cleanup().await;
    assert!(!std::path::Path::new(&first).exists());
}

#[tokio::test]
async fn user_working_dir_survives_cleanup() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;
    let dir = runtime.working_dir().await.unwrap();

    runtime.cleanup().await;
    assert!(std::path::Path::new(&dir).exists());
}

#[tokio::test]
async fn send_file_sugar_lands_in_the_working_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;
    let source = tmp.path().join("payload.txt");
    std::fs::write(&source, "data").unwrap();

    let task = runtime.send_file(&source, None, false).await.unwrap();
    assert!(task.name().starts_with("send-file-payload.txt-to-"));

    let work = runtime.working_dir().await.unwrap();
    assert_eq!(
        std::fs::read_to_string(std::path::Path::new(&work).join("payload.txt")).unwrap(),
        "data"
    );
}

#[tokio::test]
async fn check_filter_evaluates_commands_and_executables() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;

    let passing = RuntimeFilter {
        installed_executables: vec!["sh".to_string()],
        filter_commands: vec!["echo TRUE".to_string()],
        ..RuntimeFilter::default()
    };
    assert!(runtime.check_filter(&passing).await.unwrap());

    let failing = RuntimeFilter {
        installed_executables: vec!["definitely-not-an-executable-xyz".to_string()],
        ..RuntimeFilter::default()
    };
    assert!(!runtime.check_filter(&failing).await.unwrap());

    let failing_command = RuntimeFilter {
        filter_commands: vec!["echo false".to_string()],
        ..RuntimeFilter::default()
    };
    assert!(!runtime.check_filter(&failing_command).await.unwrap());
}

#[tokio::test]
async fn execution_log_lookup_by_task_name() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;

    let task = Task::new("lookup");
    task.run_command("echo found").unwrap();
    runtime
        .execute_task(
            &task,
            TaskDispatch {
                execute_async: false,
                ..TaskDispatch::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(runtime.execution_log("lookup").unwrap(), vec!["found".to_string()]);
    assert!(matches!(
        runtime.execution_log("unknown"),
        Err(LazyError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn clear_tasks_keeps_tunnel_keys() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;

    let task = Task::new("clearable");
    task.run_command("echo x").unwrap();
    runtime
        .execute_task(&task, TaskDispatch::default())
        .await
        .unwrap();
    task.join().await.unwrap();

    assert_eq!(runtime.tasks().len(), 1);
    runtime.clear_tasks();
    assert!(runtime.tasks().is_empty());
    assert!(runtime.get_processes(false).is_empty());
}

#[test]
fn stop_process_rejects_unknown_keys() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = local_runtime(&tmp);
    assert!(matches!(
        runtime.stop_process("nope::task::x"),
        Err(LazyError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn failing_sync_task_surfaces_the_execution_error() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;

    let task = Task::new("exit-3");
    task.run_command("exit 3").unwrap();
    let err = runtime
        .execute_task(
            &task,
            TaskDispatch {
                execute_async: false,
                ..TaskDispatch::default()
            },
        )
        .await
        .unwrap_err();

    let LazyError::TaskExecution {
        step_index, host, ..
    } = err
    else {
        panic!("expected a task execution error");
    };
    assert_eq!(step_index, 0);
    assert_eq!(host, LOCALHOST);
}

#[tokio::test]
async fn failing_async_task_surfaces_on_join() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;

    let task = Task::new("async-exit-3");
    task.run_command("exit 3").unwrap();
    runtime
        .execute_task(&task, TaskDispatch::default())
        .await
        .unwrap();

    let err = task.join().await.unwrap_err();
    assert!(matches!(err, LazyError::TaskExecution { step_index: 0, .. }));
}

#[tokio::test]
async fn echo_round_trips_through_the_runtime() {
    let tmp = tempfile::tempdir().unwrap();
    let runtime = with_working_dir(&tmp).await;
    assert_eq!(runtime.echo("ping").await.unwrap().trim(), "ping");
}
