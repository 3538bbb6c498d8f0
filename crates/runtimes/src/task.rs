// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task composition and execution.
//!
//! A task is an append-only list of steps built programmatically and
//! shipped over one connection. Function steps are pre-expanded at
//! composition time into the elementary steps that move the payload
//! over, invoke the agent and fetch the return blob back; the
//! manager-local artifact paths they embed are unique per task
//! instance, which is why [`Task::deep_copy`] re-registers functions
//! on the clone instead of copying those sub-steps literally.
//!
//! The task value itself is a shared handle: the spawned execution
//! and the caller observe the same state, so partial execution logs
//! are visible before a join.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use lc_core::functions::{self, FunctionPayload, AGENT_RELATIVE_PATH, PAYLOAD_ENV_VAR, RETURN_ENV_VAR};
use lc_core::{short_id, ExecutionLogFile, LazyError};
use lc_transport::{Connection, OutputFn, RunOptions};

/// One step of a task.
#[derive(Debug, Clone)]
pub enum TaskStep {
    /// Run a shell command on the host.
    RunCommand { command: String },
    /// Copy a manager-local file to the host. An empty `remote_path`
    /// resolves to the working directory under the same basename; a
    /// leading `./` resolves relative to the working directory. The
    /// resolved path is written back after execution.
    SendFile {
        local_path: PathBuf,
        remote_path: String,
    },
    /// Copy a file from the host to the manager. Same relativization
    /// rules as `SendFile`; a missing `local_path` lands the file in
    /// the manager's current directory under the remote basename.
    GetFile {
        remote_path: String,
        local_path: Option<PathBuf>,
    },
    /// A registered function invocation, pre-expanded into the
    /// elementary steps that implement it.
    RunFunction {
        function: String,
        kwargs: Value,
        steps: Vec<TaskStep>,
    },
}

/// Options for one execution of a task.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Stream remote output to the manager's stdout instead of the
    /// execution log file.
    pub debug: bool,
    /// The `execution_log` directory of the manager's main directory.
    pub log_root: PathBuf,
    /// Directory steps run relative to. When absent (standalone
    /// execution) the connection's current directory is queried once.
    pub working_dir: Option<String>,
}

struct TaskState {
    name: String,
    steps: Mutex<Vec<TaskStep>>,
    execution_log: Mutex<Vec<String>>,
    execution_log_file_path: Mutex<Option<PathBuf>>,
    return_artifact_paths: Mutex<Vec<PathBuf>>,
    env_variables: Mutex<HashMap<String, String>>,
    omit_on_join: AtomicBool,
    copy_index: AtomicUsize,
    temp_dir: Mutex<Option<TempDir>>,
    handle: Mutex<Option<JoinHandle<Result<(), LazyError>>>>,
}

/// A shared handle on one task. Cloning is shallow; use
/// [`deep_copy`](Task::deep_copy) to create an independent task.
#[derive(Clone)]
pub struct Task {
    state: Arc<TaskState>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.state.name)
            .field("steps", &self.state.steps.lock().len())
            .finish()
    }
}

impl Task {
    /// Create an empty task with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::debug!(task = %name, "task initialized");
        Self {
            state: Arc::new(TaskState {
                name,
                steps: Mutex::new(Vec::new()),
                execution_log: Mutex::new(Vec::new()),
                execution_log_file_path: Mutex::new(None),
                return_artifact_paths: Mutex::new(Vec::new()),
                env_variables: Mutex::new(HashMap::new()),
                omit_on_join: AtomicBool::new(false),
                copy_index: AtomicUsize::new(0),
                temp_dir: Mutex::new(None),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Create an empty task with a generated name.
    pub fn unnamed() -> Self {
        Self::new(format!("task-{}", short_id()))
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Append a step running a shell command.
    pub fn run_command(&self, command: impl Into<String>) -> Result<&Self, LazyError> {
        let command = command.into();
        if command.is_empty() {
            return Err(LazyError::InvalidArgument(
                "command must not be empty".to_string(),
            ));
        }
        tracing::debug!(task = %self.state.name, %command, "added run-command step");
        self.state.steps.lock().push(TaskStep::RunCommand { command });
        Ok(self)
    }

    /// Append a step sending a file or folder to the host.
    pub fn send_file(
        &self,
        local_path: impl Into<PathBuf>,
        remote_path: Option<&str>,
    ) -> Result<&Self, LazyError> {
        let local_path = local_path.into();
        if local_path.as_os_str().is_empty() {
            return Err(LazyError::InvalidArgument(
                "local path must not be empty".to_string(),
            ));
        }
        tracing::debug!(
            task = %self.state.name,
            local = %local_path.display(),
            "added send-file step"
        );
        self.state.steps.lock().push(TaskStep::SendFile {
            local_path,
            remote_path: remote_path.unwrap_or_default().to_string(),
        });
        Ok(self)
    }

    /// Append a step retrieving a file or folder from the host.
    pub fn get_file(
        &self,
        remote_path: impl Into<String>,
        local_path: Option<PathBuf>,
    ) -> Result<&Self, LazyError> {
        let remote_path = remote_path.into();
        if remote_path.is_empty() {
            return Err(LazyError::InvalidArgument(
                "remote path must not be empty".to_string(),
            ));
        }
        tracing::debug!(
            task = %self.state.name,
            remote = %remote_path,
            "added get-file step"
        );
        self.state.steps.lock().push(TaskStep::GetFile {
            remote_path,
            local_path,
        });
        Ok(self)
    }

    /// Append a step executing the registered function `function` on
    /// the host, passing `kwargs`.
    ///
    /// The return value can later be read through
    /// [`function_returns`](Task::function_returns). The function must
    /// have been registered via `lc_core::functions::register` so
    /// that the agent on the runtime resolves the same name.
    pub fn run_function(
        &self,
        function: impl Into<String>,
        kwargs: Value,
    ) -> Result<&Self, LazyError> {
        let function = function.into();
        if function.is_empty() {
            return Err(LazyError::InvalidArgument(
                "function name must not be empty".to_string(),
            ));
        }
        if !functions::is_registered(&function) {
            return Err(LazyError::InvalidArgument(format!(
                "function `{}` is not registered",
                function
            )));
        }

        // The payload file lives in a manager-local temp dir shared by
        // all function registrations of this task.
        let mut temp_dir = self.state.temp_dir.lock();
        if temp_dir.is_none() {
            let dir = tempfile::tempdir().map_err(|e| {
                LazyError::other_with_cause("cannot create task temp directory", e)
            })?;
            tracing::debug!(
                task = %self.state.name,
                dir = %dir.path().display(),
                "task temp directory created"
            );
            *temp_dir = Some(dir);
        }
        let temp_path = match temp_dir.as_ref() {
            Some(dir) => dir.path().to_path_buf(),
            None => return Err(LazyError::other("task temp directory missing")),
        };
        drop(temp_dir);

        let names = functions::artifact_names(&function);
        let local_payload = temp_path.join(&names.local);
        let remote_payload = format!("./{}", names.remote);
        let local_return = temp_path.join(&names.local_return);
        let remote_return = format!("./{}", names.remote_return);

        let payload = FunctionPayload {
            function: function.clone(),
            kwargs: kwargs.clone(),
        };
        let encoded = serde_json::to_string(&payload)
            .map_err(|e| LazyError::other_with_cause("cannot serialize function payload", e))?;
        std::fs::write(&local_payload, encoded).map_err(|e| {
            LazyError::other_with_cause(
                format!("cannot write payload `{}`", local_payload.display()),
                e,
            )
        })?;

        let steps = vec![
            TaskStep::SendFile {
                local_path: local_payload,
                remote_path: remote_payload.clone(),
            },
            TaskStep::RunCommand {
                command: format!(
                    "test -x ./{} || {{ echo 'lazycluster function agent is not deployed in the working directory'; exit 1; }}",
                    AGENT_RELATIVE_PATH
                ),
            },
            TaskStep::RunCommand {
                command: format!(
                    "{}={} {}={} ./{}",
                    PAYLOAD_ENV_VAR, remote_payload, RETURN_ENV_VAR, remote_return, AGENT_RELATIVE_PATH
                ),
            },
            TaskStep::RunCommand {
                command: format!("rm {}", remote_payload),
            },
            TaskStep::GetFile {
                remote_path: remote_return.clone(),
                local_path: Some(local_return.clone()),
            },
            TaskStep::RunCommand {
                command: format!("rm {}", remote_return),
            },
        ];

        self.state.return_artifact_paths.lock().push(local_return);
        self.state.steps.lock().push(TaskStep::RunFunction {
            function: function.clone(),
            kwargs,
            steps,
        });
        tracing::debug!(task = %self.state.name, %function, "added run-function step");
        Ok(self)
    }

    /// Execute the step list over `connection`.
    ///
    /// Steps run in insertion order, each relative to the working
    /// directory. Output of every run-command step is teed into the
    /// per-execution log file (or the manager's stdout in debug mode)
    /// while the command runs, and captured into the execution log.
    pub async fn execute(
        &self,
        connection: &dyn Connection,
        opts: &ExecuteOptions,
    ) -> Result<(), LazyError> {
        let host = connection.host();
        let log_file = ExecutionLogFile::new(&opts.log_root, host, &self.state.name);
        *self.state.execution_log_file_path.lock() = Some(log_file.path().to_path_buf());
        self.state.execution_log.lock().clear();

        let working_dir = match &opts.working_dir {
            Some(dir) => dir.clone(),
            None => query_working_dir(connection).await?,
        };

        tracing::info!(task = %self.state.name, %host, "start executing task");

        let step_count = self.state.steps.lock().len();
        for index in 0..step_count {
            let step = self.state.steps.lock()[index].clone();
            match step {
                TaskStep::RunFunction { function, steps, .. } => {
                    tracing::debug!(
                        task = %self.state.name,
                        %function,
                        "executing generated function steps"
                    );
                    for (sub_index, sub_step) in steps.into_iter().enumerate() {
                        let updated = self
                            .execute_elementary(
                                sub_step,
                                index,
                                connection,
                                &working_dir,
                                opts,
                                &log_file,
                            )
                            .await?;
                        if let TaskStep::RunFunction { steps, .. } =
                            &mut self.state.steps.lock()[index]
                        {
                            steps[sub_index] = updated;
                        }
                    }
                }
                elementary => {
                    let updated = self
                        .execute_elementary(
                            elementary,
                            index,
                            connection,
                            &working_dir,
                            opts,
                            &log_file,
                        )
                        .await?;
                    self.state.steps.lock()[index] = updated;
                }
            }
        }

        tracing::info!(task = %self.state.name, %host, "finished executing task");
        Ok(())
    }

    async fn execute_elementary(
        &self,
        step: TaskStep,
        step_index: usize,
        connection: &dyn Connection,
        working_dir: &str,
        opts: &ExecuteOptions,
        log_file: &ExecutionLogFile,
    ) -> Result<TaskStep, LazyError> {
        let host = connection.host();
        match step {
            TaskStep::RunCommand { command } => {
                tracing::debug!(
                    task = %self.state.name,
                    step = step_index,
                    %command,
                    "running command step"
                );
                let run_opts = RunOptions {
                    cwd: Some(working_dir.to_string()),
                    env: self.state.env_variables.lock().clone(),
                    timeout: None,
                };

                let sink = if opts.debug {
                    OutputSink::Stdout
                } else {
                    let file = log_file.open_append().map_err(|e| {
                        LazyError::other_with_cause(
                            format!("cannot open execution log `{}`", log_file.path().display()),
                            e,
                        )
                    })?;
                    OutputSink::File(Mutex::new(file))
                };
                let on_output = move |line: &str| sink.write_line(line);
                let on_output: &OutputFn = &on_output;

                let result = connection
                    .run(&command, &run_opts, Some(on_output))
                    .await
                    .map_err(|e| e.into_lazy(host))?;

                let output = result.output.trim_end().to_string();
                self.state.execution_log.lock().push(output.clone());

                if !result.success() {
                    return Err(LazyError::TaskExecution {
                        step_index,
                        task_name: self.state.name.clone(),
                        host: host.to_string(),
                        log_file: log_file.path().to_path_buf(),
                        output,
                    });
                }
                Ok(TaskStep::RunCommand { command })
            }

            TaskStep::SendFile {
                local_path,
                remote_path,
            } => {
                let remote_path = resolve_send_path(&remote_path, &local_path, working_dir);
                tracing::debug!(
                    task = %self.state.name,
                    step = step_index,
                    local = %local_path.display(),
                    remote = %remote_path,
                    "sending file"
                );
                connection
                    .put(&local_path, &remote_path)
                    .await
                    .map_err(|e| e.into_lazy(host))?;
                self.state.execution_log.lock().push(String::new());
                Ok(TaskStep::SendFile {
                    local_path,
                    remote_path,
                })
            }

            TaskStep::GetFile {
                remote_path,
                local_path,
            } => {
                let remote_path = resolve_get_path(&remote_path, working_dir);
                let local_path = match local_path {
                    Some(path) => path,
                    None => default_local_path(&remote_path),
                };
                tracing::debug!(
                    task = %self.state.name,
                    step = step_index,
                    remote = %remote_path,
                    local = %local_path.display(),
                    "retrieving file"
                );
                connection
                    .get(&remote_path, &local_path)
                    .await
                    .map_err(|e| e.into_lazy(host))?;
                self.state.execution_log.lock().push(String::new());
                Ok(TaskStep::GetFile {
                    remote_path,
                    local_path: Some(local_path),
                })
            }

            TaskStep::RunFunction { .. } => Err(LazyError::other(
                "function steps cannot be executed as elementary steps",
            )),
        }
    }

    /// Block until an asynchronous execution of this task finished.
    ///
    /// Tasks flagged with `omit_on_join` are skipped to avoid waiting
    /// forever on long-lived worker processes.
    pub async fn join(&self) -> Result<(), LazyError> {
        if self.state.omit_on_join.load(Ordering::SeqCst) && self.has_handle() {
            tracing::debug!(
                task = %self.state.name,
                "join omitted, task is marked as needing explicit termination"
            );
            return Ok(());
        }
        let handle = self.state.handle.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };
        tracing::debug!(task = %self.state.name, "joining task execution");
        match handle.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_cancelled() => Ok(()),
            Err(join_error) => Err(LazyError::other_with_cause(
                format!("execution of task {} panicked", self.state.name),
                join_error,
            )),
        }
    }

    /// Function return data, in registration order.
    ///
    /// Joins the task first, then yields one entry per registered
    /// function: the deserialized return blob, or `None` with a
    /// warning when the artifact file is missing.
    pub async fn function_returns(&self) -> Result<FunctionReturns, LazyError> {
        self.join().await?;
        Ok(FunctionReturns::new(
            self.state.return_artifact_paths.lock().clone(),
        ))
    }

    /// Build an independent copy with fresh function artifacts.
    ///
    /// The copy is named `<name>-<k>` with `k` counting copies of this
    /// task. Elementary steps are reused as-is; function steps are
    /// re-registered so the copy gets its own payload and return
    /// paths. Environment and the join flag carry over, execution
    /// state does not.
    pub fn deep_copy(&self) -> Result<Task, LazyError> {
        let index = self.state.copy_index.fetch_add(1, Ordering::SeqCst) + 1;
        let copy = Task::new(format!("{}-{}", self.state.name, index));

        let steps = self.state.steps.lock().clone();
        for step in steps {
            match step {
                TaskStep::RunFunction { function, kwargs, .. } => {
                    copy.run_function(function, kwargs)?;
                }
                elementary => copy.state.steps.lock().push(elementary),
            }
        }
        *copy.state.env_variables.lock() = self.state.env_variables.lock().clone();
        copy.state
            .omit_on_join
            .store(self.state.omit_on_join.load(Ordering::SeqCst), Ordering::SeqCst);

        tracing::debug!(task = %self.state.name, copy = %copy.state.name, "deep copy created");
        Ok(copy)
    }

    /// Print the execution log, one line per entry with its index.
    pub fn print_log(&self) {
        let log = self.state.execution_log.lock();
        if log.is_empty() {
            println!("The log of task {} is empty!", self.state.name);
            return;
        }
        println!("Log of task {}:", self.state.name);
        for (index, entry) in log.iter().enumerate() {
            println!("{}: {}", index, entry);
        }
    }

    pub fn execution_log(&self) -> Vec<String> {
        self.state.execution_log.lock().clone()
    }

    pub fn execution_log_file_path(&self) -> Option<PathBuf> {
        self.state.execution_log_file_path.lock().clone()
    }

    pub fn env_variables(&self) -> HashMap<String, String> {
        self.state.env_variables.lock().clone()
    }

    pub fn set_env_variables(&self, env_variables: HashMap<String, String>) {
        *self.state.env_variables.lock() = env_variables;
    }

    pub fn omit_on_join(&self) -> bool {
        self.state.omit_on_join.load(Ordering::SeqCst)
    }

    pub fn set_omit_on_join(&self, omit: bool) {
        self.state.omit_on_join.store(omit, Ordering::SeqCst);
    }

    /// Snapshot of the composed steps.
    pub fn steps(&self) -> Vec<TaskStep> {
        self.state.steps.lock().clone()
    }

    /// Paths of the serialized function returns on the manager.
    pub fn return_artifact_paths(&self) -> Vec<PathBuf> {
        self.state.return_artifact_paths.lock().clone()
    }

    /// True if any step is a function invocation.
    pub fn has_function_steps(&self) -> bool {
        self.state
            .steps
            .lock()
            .iter()
            .any(|step| matches!(step, TaskStep::RunFunction { .. }))
    }

    /// True while an asynchronous execution is running.
    pub fn is_running(&self) -> bool {
        self.state
            .handle
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// True if the task was (or is being) executed asynchronously.
    pub fn has_handle(&self) -> bool {
        self.state.handle.lock().is_some()
    }

    pub(crate) fn set_handle(&self, handle: JoinHandle<Result<(), LazyError>>) {
        *self.state.handle.lock() = Some(handle);
    }

    /// Abort an asynchronous execution without waiting.
    pub fn terminate(&self) {
        if let Some(handle) = self.state.handle.lock().as_ref() {
            handle.abort();
        }
    }

    /// Abort an asynchronous execution and wait for it to wind down.
    pub async fn shutdown(&self) {
        let handle = self.state.handle.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Remove the manager-local temp directory with the function
    /// artifacts.
    pub fn cleanup(&self) {
        if let Some(dir) = self.state.temp_dir.lock().take() {
            tracing::debug!(
                task = %self.state.name,
                dir = %dir.path().display(),
                "removing task temp directory"
            );
            drop(dir);
        }
    }
}

/// Iterator over deserialized function returns. Holds the artifact
/// path list by value and opens each file on iteration; reconstruct it
/// via [`Task::function_returns`] to iterate again.
pub struct FunctionReturns {
    paths: std::vec::IntoIter<PathBuf>,
}

impl FunctionReturns {
    pub(crate) fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
        }
    }
}

impl Iterator for FunctionReturns {
    type Item = Option<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => {
                tracing::warn!(
                    path = %path.display(),
                    "return artifact with function return data does not exist, check the logs"
                );
                return Some(None);
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(Some(value)),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "malformed return artifact");
                Some(None)
            }
        }
    }
}

enum OutputSink {
    Stdout,
    File(Mutex<std::fs::File>),
}

impl OutputSink {
    fn write_line(&self, line: &str) {
        match self {
            OutputSink::Stdout => println!("{}", line),
            OutputSink::File(file) => {
                let _ = writeln!(file.lock(), "{}", line);
            }
        }
    }
}

async fn query_working_dir(connection: &dyn Connection) -> Result<String, LazyError> {
    let result = connection
        .run("pwd", &RunOptions::default(), None)
        .await
        .map_err(|e| e.into_lazy(connection.host()))?;
    Ok(result.output.trim().to_string())
}

fn resolve_send_path(remote_path: &str, local_path: &Path, working_dir: &str) -> String {
    if remote_path.is_empty() {
        return format!("{}/{}", working_dir, basename_of(local_path));
    }
    if let Some(rest) = remote_path.strip_prefix("./") {
        return format!("{}/{}", working_dir, rest);
    }
    remote_path.to_string()
}

fn resolve_get_path(remote_path: &str, working_dir: &str) -> String {
    if let Some(rest) = remote_path.strip_prefix("./") {
        return format!("{}/{}", working_dir, rest);
    }
    if !remote_path.starts_with('/') {
        let basename = Path::new(remote_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| remote_path.to_string());
        return format!("{}/{}", working_dir, basename);
    }
    remote_path.to_string()
}

fn default_local_path(remote_path: &str) -> PathBuf {
    let basename = Path::new(remote_path)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(remote_path));
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(basename),
        Err(_) => basename,
    }
}

fn basename_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
