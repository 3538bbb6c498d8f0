// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One remote host.
//!
//! A runtime owns its connection options, a working directory on the
//! host, the environment stamped onto every task, and a registry of
//! the manager-side children it spawned (task executions and SSH
//! tunnels), keyed by the structured process keys of `lc_core`.
//!
//! Construction probes the host: a runtime that failed the probe is
//! never observable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use lc_core::functions::AGENT_RELATIVE_PATH;
use lc_core::proc_key::{self, ForwardKind};
use lc_core::{short_id, Environment, LazyError};
use lc_transport::subprocess::ADMIN_COMMAND_TIMEOUT;
use lc_transport::{
    localhost_has_free_port, Connection, LocalConnection, RunOptions, SshConnection, SshOptions,
    TunnelProcess, LOCALHOST,
};

use crate::hostinfo::{self, HostInfo};
use crate::task::{ExecuteOptions, FunctionReturns, Task};

/// Env var name under which the working directory is exported on the
/// runtime.
pub const WORKING_DIR_ENV_VAR: &str = "WORKING_DIR";

/// Pause after spawning a tunnel, so that a burst of exposures does
/// not trip sshd's MaxStartups throttle.
const TUNNEL_SPAWN_DELAY: Duration = Duration::from_millis(100);

const PYTHON_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// How to dispatch a task on a runtime.
#[derive(Debug, Clone)]
pub struct TaskDispatch {
    /// Execute in a spawned child; the caller collects the result on
    /// join. When false the call itself runs the task and propagates
    /// failures directly.
    pub execute_async: bool,
    /// Skip the task when joining the runtime or group. Used for
    /// long-lived workers that never exit on their own.
    pub omit_on_join: bool,
    /// Stream remote output to the manager's stdout instead of the
    /// execution log file.
    pub debug: bool,
}

impl Default for TaskDispatch {
    fn default() -> Self {
        Self {
            execute_async: true,
            omit_on_join: false,
            debug: false,
        }
    }
}

/// Criteria a runtime can be checked against.
#[derive(Debug, Clone, Default)]
pub struct RuntimeFilter {
    pub gpu_required: bool,
    pub min_memory_mb: Option<u64>,
    pub min_cpu_cores: Option<u32>,
    /// Executables that must resolve via `hash <exe>` on the host.
    pub installed_executables: Vec<String>,
    /// Arbitrary shell commands; each must echo `true` (any case).
    pub filter_commands: Vec<String>,
}

impl RuntimeFilter {
    pub fn is_empty(&self) -> bool {
        !self.gpu_required
            && self.min_memory_mb.is_none()
            && self.min_cpu_cores.is_none()
            && self.installed_executables.is_empty()
            && self.filter_commands.is_empty()
    }

    /// True if evaluating the filter needs the host info probe.
    pub fn needs_info(&self) -> bool {
        self.gpu_required || self.min_memory_mb.is_some() || self.min_cpu_cores.is_some()
    }
}

/// A manager-side child registered on a runtime.
#[derive(Clone)]
pub enum ManagedProcess {
    /// An asynchronously executing task.
    Task(Task),
    /// An SSH tunnel child keeping a port exposure alive.
    Tunnel(Arc<TunnelProcess>),
}

impl ManagedProcess {
    pub fn is_alive(&self) -> bool {
        match self {
            ManagedProcess::Task(task) => task.is_running(),
            ManagedProcess::Tunnel(tunnel) => tunnel.is_alive(),
        }
    }

    fn terminate(&self) {
        match self {
            ManagedProcess::Task(task) => task.terminate(),
            ManagedProcess::Tunnel(tunnel) => {
                let _ = tunnel.terminate();
            }
        }
    }

    async fn shutdown(&self) {
        match self {
            ManagedProcess::Task(task) => task.shutdown().await,
            ManagedProcess::Tunnel(tunnel) => tunnel.shutdown().await,
        }
    }
}

struct WorkingDir {
    path: Option<String>,
    is_temp: bool,
}

/// The logical representation of one remote host.
pub struct Runtime {
    host: String,
    options: SshOptions,
    environment: Environment,
    env_variables: Mutex<HashMap<String, String>>,
    working_dir: Mutex<WorkingDir>,
    processes: Mutex<HashMap<String, ManagedProcess>>,
    info: Mutex<Option<HostInfo>>,
    tasks: Mutex<Vec<Task>>,
    agent_deployed: AtomicBool,
    // Test seam: route a named host through the local transport.
    force_local: AtomicBool,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").field("host", &self.host).finish()
    }
}

impl Runtime {
    /// Validate `host` and construct a runtime with default connection
    /// options.
    pub async fn new(host: impl Into<String>, environment: Environment) -> Result<Self, LazyError> {
        Self::with_options(host, None, SshOptions::default(), environment).await
    }

    /// Validate `host` and construct a runtime.
    ///
    /// When `working_dir` is given the full path is created on the
    /// host and persists across cleanup; otherwise a server-side temp
    /// directory is created on first use and removed on cleanup.
    pub async fn with_options(
        host: impl Into<String>,
        working_dir: Option<String>,
        options: SshOptions,
        environment: Environment,
    ) -> Result<Self, LazyError> {
        let runtime = Self::assemble(host.into(), options, environment);
        if !runtime.is_valid_runtime().await {
            return Err(LazyError::InvalidRuntime {
                host: runtime.host.clone(),
            });
        }
        if let Some(dir) = working_dir {
            runtime.set_working_dir(&dir).await?;
        }
        tracing::debug!(host = %runtime.host, "runtime initialized");
        Ok(runtime)
    }

    /// Construct without the validity probe. Test seam.
    #[cfg(any(test, feature = "test-support"))]
    pub fn unvalidated(host: impl Into<String>, environment: Environment) -> Self {
        Self::assemble(host.into(), SshOptions::default(), environment)
    }

    fn assemble(host: String, options: SshOptions, environment: Environment) -> Self {
        Self {
            host,
            options,
            environment,
            env_variables: Mutex::new(HashMap::new()),
            working_dir: Mutex::new(WorkingDir {
                path: None,
                is_temp: false,
            }),
            processes: Mutex::new(HashMap::new()),
            info: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            agent_deployed: AtomicBool::new(false),
            force_local: AtomicBool::new(false),
        }
    }

    /// Route this runtime through the local transport regardless of
    /// its host name. Test seam.
    #[cfg(any(test, feature = "test-support"))]
    pub fn use_local_transport(&self) {
        self.force_local.store(true, Ordering::SeqCst);
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_localhost(&self) -> bool {
        self.host == LOCALHOST
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Open a fresh connection to the host. The `localhost` runtime
    /// short-circuits to local execution.
    pub fn connection(&self) -> Box<dyn Connection> {
        if self.uses_local_transport() {
            Box::new(LocalConnection::new())
        } else {
            Box::new(SshConnection::new(self.host.clone(), self.options.clone()))
        }
    }

    fn uses_local_transport(&self) -> bool {
        self.is_localhost() || self.force_local.load(Ordering::SeqCst)
    }

    /// Probe the host: reachable over SSH and running python3 >= 3.6.
    pub async fn is_valid_runtime(&self) -> bool {
        tracing::debug!(host = %self.host, "probing python version");
        let opts = RunOptions {
            cwd: None,
            env: HashMap::new(),
            timeout: Some(PYTHON_PROBE_TIMEOUT),
        };
        let result = match self.connection().run("python3 --version", &opts, None).await {
            Ok(result) => result,
            Err(error) => {
                tracing::debug!(host = %self.host, %error, "python probe failed");
                return false;
            }
        };
        if !result.success() {
            return false;
        }
        python_version_supported(&result.output)
    }

    // === Environment ===

    pub fn env_variables(&self) -> HashMap<String, String> {
        self.env_variables.lock().clone()
    }

    /// Replace the environment. The working directory variable is
    /// re-added when a working directory exists.
    pub fn set_env_variables(&self, env_variables: HashMap<String, String>) {
        let mut env = env_variables;
        if let Some(dir) = self.working_dir.lock().path.clone() {
            env.insert(WORKING_DIR_ENV_VAR.to_string(), dir);
        }
        *self.env_variables.lock() = env;
    }

    /// Merge variables into the environment.
    pub fn add_env_variables(&self, env_variables: HashMap<String, String>) {
        self.env_variables.lock().extend(env_variables);
    }

    // === Working directory ===

    /// The working directory, creating a server-side temp dir on
    /// first access.
    pub async fn working_dir(&self) -> Result<String, LazyError> {
        if let Some(dir) = self.working_dir.lock().path.clone() {
            return Ok(dir);
        }
        let dir = self.create_tempdir().await?;
        tracing::debug!(host = %self.host, %dir, "temporary working directory created");
        {
            let mut state = self.working_dir.lock();
            state.path = Some(dir.clone());
            state.is_temp = true;
        }
        self.env_variables
            .lock()
            .insert(WORKING_DIR_ENV_VAR.to_string(), dir.clone());
        Ok(dir)
    }

    /// Point the runtime at `dir`, creating the full path on the host.
    /// A directory set this way persists across cleanup.
    pub async fn set_working_dir(&self, dir: &str) -> Result<(), LazyError> {
        self.create_dir(dir).await?;
        {
            let mut state = self.working_dir.lock();
            state.path = Some(dir.to_string());
            state.is_temp = false;
        }
        self.env_variables
            .lock()
            .insert(WORKING_DIR_ENV_VAR.to_string(), dir.to_string());
        tracing::debug!(host = %self.host, %dir, "working directory set");
        Ok(())
    }

    /// Create a directory on the host, including parents.
    pub async fn create_dir(&self, path: &str) -> Result<(), LazyError> {
        let result = self
            .run_admin_command(&format!("mkdir -p {}", path))
            .await
            .map_err(|_| LazyError::PathCreation {
                path: path.to_string(),
                host: Some(self.host.clone()),
            })?;
        if !result.success() {
            return Err(LazyError::PathCreation {
                path: path.to_string(),
                host: Some(self.host.clone()),
            });
        }
        tracing::debug!(host = %self.host, %path, "directory created");
        Ok(())
    }

    /// Create a server-side temp directory and return its path.
    pub async fn create_tempdir(&self) -> Result<String, LazyError> {
        let result = self.run_admin_command("mktemp -d").await?;
        let path = result
            .output
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        if path.is_empty() || !result.success() {
            return Err(LazyError::PathCreation {
                path: "mktemp -d".to_string(),
                host: Some(self.host.clone()),
            });
        }
        Ok(path)
    }

    /// Delete a directory recursively. Returns false when something
    /// could not be removed.
    pub async fn delete_dir(&self, path: &str) -> Result<bool, LazyError> {
        let result = self
            .run_admin_command(&format!("rm -r {} 2> /dev/null", path))
            .await?;
        if result.success() {
            tracing::debug!(host = %self.host, %path, "directory deleted");
        }
        Ok(result.success())
    }

    async fn run_admin_command(
        &self,
        command: &str,
    ) -> Result<lc_transport::CommandResult, LazyError> {
        let opts = RunOptions {
            cwd: None,
            env: HashMap::new(),
            timeout: Some(ADMIN_COMMAND_TIMEOUT),
        };
        self.connection()
            .run(command, &opts, None)
            .await
            .map_err(|e| e.into_lazy(&self.host))
    }

    // === Task execution ===

    /// Execute a task on this runtime.
    ///
    /// The runtime's environment is stamped onto the task, the task is
    /// recorded in the runtime's task list, and for asynchronous
    /// dispatch the spawned execution is registered in the process map
    /// under the task's process key.
    pub async fn execute_task(&self, task: &Task, dispatch: TaskDispatch) -> Result<(), LazyError> {
        let working_dir = self.working_dir().await?;
        if task.has_function_steps() {
            self.ensure_agent(&working_dir).await?;
        }

        tracing::info!(
            host = %self.host,
            task = %task.name(),
            execute_async = dispatch.execute_async,
            "start executing task"
        );

        task.set_env_variables(self.env_variables());
        task.set_omit_on_join(dispatch.omit_on_join);

        let opts = ExecuteOptions {
            debug: dispatch.debug,
            log_root: self.environment.execution_log_dir(),
            working_dir: Some(working_dir),
        };

        if dispatch.execute_async {
            let connection = self.connection();
            let spawned_task = task.clone();
            let handle = tokio::spawn(async move {
                spawned_task.execute(connection.as_ref(), &opts).await
            });
            task.set_handle(handle);
            self.processes.lock().insert(
                proc_key::task_key(&self.host, task.name()),
                ManagedProcess::Task(task.clone()),
            );
        } else {
            task.execute(self.connection().as_ref(), &opts).await?;
        }

        self.tasks.lock().push(task.clone());
        Ok(())
    }

    /// Send a file to the runtime via a generated single-step task.
    pub async fn send_file(
        &self,
        local_path: impl Into<PathBuf>,
        remote_path: Option<&str>,
        execute_async: bool,
    ) -> Result<Task, LazyError> {
        let local_path = local_path.into();
        let task = Task::new(format!(
            "send-file-{}-to-{}",
            file_label(&local_path),
            self.host
        ));
        task.send_file(local_path, remote_path)?;
        self.execute_task(
            &task,
            TaskDispatch {
                execute_async,
                ..TaskDispatch::default()
            },
        )
        .await?;
        Ok(task)
    }

    /// Retrieve a file from the runtime via a generated single-step
    /// task.
    pub async fn get_file(
        &self,
        remote_path: &str,
        local_path: Option<PathBuf>,
        execute_async: bool,
    ) -> Result<Task, LazyError> {
        let task = Task::new(format!(
            "get-file-{}-from-{}",
            file_label(Path::new(remote_path)),
            self.host
        ));
        task.get_file(remote_path, local_path)?;
        self.execute_task(
            &task,
            TaskDispatch {
                execute_async,
                ..TaskDispatch::default()
            },
        )
        .await?;
        Ok(task)
    }

    /// Execute a registered function on the runtime via a generated
    /// single-step task.
    pub async fn execute_function(
        &self,
        function: &str,
        kwargs: Value,
        execute_async: bool,
        debug: bool,
    ) -> Result<Task, LazyError> {
        let task = Task::new(format!("execute-function-{}", function));
        task.run_function(function, kwargs)?;
        self.execute_task(
            &task,
            TaskDispatch {
                execute_async,
                omit_on_join: false,
                debug,
            },
        )
        .await?;
        Ok(task)
    }

    /// Upload the manager's executable as the function agent, once per
    /// working directory.
    async fn ensure_agent(&self, working_dir: &str) -> Result<(), LazyError> {
        if self.agent_deployed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let exe = std::env::current_exe()
            .map_err(|e| LazyError::other_with_cause("cannot locate the manager executable", e))?;
        tracing::debug!(host = %self.host, agent = %exe.display(), "deploying function agent");

        let agent_dir = Path::new(AGENT_RELATIVE_PATH)
            .parent()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default();
        let connection = self.connection();
        let opts = RunOptions {
            cwd: Some(working_dir.to_string()),
            env: HashMap::new(),
            timeout: Some(ADMIN_COMMAND_TIMEOUT),
        };

        let mkdir = connection
            .run(&format!("mkdir -p {}", agent_dir), &opts, None)
            .await
            .map_err(|e| e.into_lazy(&self.host))?;
        if !mkdir.success() {
            return Err(LazyError::PathCreation {
                path: agent_dir,
                host: Some(self.host.clone()),
            });
        }
        connection
            .put(&exe, &format!("{}/{}", working_dir, AGENT_RELATIVE_PATH))
            .await
            .map_err(|e| e.into_lazy(&self.host))?;
        let chmod = connection
            .run(&format!("chmod +x ./{}", AGENT_RELATIVE_PATH), &opts, None)
            .await
            .map_err(|e| e.into_lazy(&self.host))?;
        if !chmod.success() {
            return Err(LazyError::other(format!(
                "cannot mark the function agent executable on host {}",
                self.host
            )));
        }
        self.agent_deployed.store(true, Ordering::SeqCst);
        Ok(())
    }

    // === Ports & tunnels ===

    /// Check whether `port` is free on the runtime.
    ///
    /// The check is optimistic: it races with later binders. The
    /// manager probes its own sockets directly; a remote host runs a
    /// one-line connect probe that prints a sentinel when the
    /// connection is refused.
    pub async fn has_free_port(&self, port: u16) -> Result<bool, LazyError> {
        tracing::debug!(host = %self.host, port, "checking for free port");
        if self.uses_local_transport() {
            return Ok(localhost_has_free_port(port));
        }
        let command = format!(
            "python3 -c \"import socket; print('free') if \
             socket.socket(socket.AF_INET, socket.SOCK_STREAM).connect_ex(('localhost', {})) \
             else None\"",
            port
        );
        let result = self.run_admin_command(&command).await?;
        Ok(result.output.contains("free"))
    }

    /// First port from `ports` that is free on the runtime.
    pub async fn get_free_port(&self, ports: &[u16]) -> Result<u16, LazyError> {
        for &port in ports {
            if self.has_free_port(port).await? {
                return Ok(port);
            }
        }
        Err(LazyError::NoPortsLeft)
    }

    /// Expose a manager port on the runtime (`ssh -R`): traffic to
    /// `runtime_port` on the host is forwarded to `local_port` on the
    /// manager. Returns the process key of the tunnel child, or the
    /// empty key for the localhost self-forward no-op.
    pub async fn expose_port_to_runtime(
        &self,
        local_port: u16,
        runtime_port: Option<u16>,
    ) -> Result<String, LazyError> {
        let runtime_port = runtime_port.unwrap_or(local_port);
        if local_port == runtime_port && self.is_localhost() {
            tracing::debug!(port = local_port, "self-forward skipped on localhost runtime");
            return Ok(String::new());
        }
        if !self.has_free_port(runtime_port).await? {
            return Err(LazyError::PortInUse {
                port: runtime_port,
                host: Some(self.host.clone()),
            });
        }

        let tunnel =
            TunnelProcess::remote_forward(&self.host, &self.options, runtime_port, local_port)
                .map_err(|e| e.into_lazy(&self.host))?;
        let key = proc_key::exposure_key(
            &self.host,
            ForwardKind::ToRuntime,
            runtime_port,
            local_port,
        );
        self.processes
            .lock()
            .insert(key.clone(), ManagedProcess::Tunnel(Arc::new(tunnel)));
        tokio::time::sleep(TUNNEL_SPAWN_DELAY).await;
        tracing::info!(
            host = %self.host,
            local_port,
            runtime_port,
            "local port exposed to runtime"
        );
        Ok(key)
    }

    /// Expose a runtime port on the manager (`ssh -L`): traffic to
    /// `local_port` on the manager is forwarded to `runtime_port` on
    /// the host. Returns the process key of the tunnel child, or the
    /// empty key for the localhost self-forward no-op.
    pub async fn expose_port_from_runtime(
        &self,
        runtime_port: u16,
        local_port: Option<u16>,
    ) -> Result<String, LazyError> {
        let local_port = local_port.unwrap_or(runtime_port);
        if local_port == runtime_port && self.is_localhost() {
            tracing::debug!(port = local_port, "self-forward skipped on localhost runtime");
            return Ok(String::new());
        }
        if !localhost_has_free_port(local_port) {
            return Err(LazyError::PortInUse {
                port: local_port,
                host: Some(LOCALHOST.to_string()),
            });
        }

        let tunnel =
            TunnelProcess::local_forward(&self.host, &self.options, local_port, runtime_port)
                .map_err(|e| e.into_lazy(&self.host))?;
        let key = proc_key::exposure_key(
            &self.host,
            ForwardKind::FromRuntime,
            runtime_port,
            local_port,
        );
        self.processes
            .lock()
            .insert(key.clone(), ManagedProcess::Tunnel(Arc::new(tunnel)));
        tokio::time::sleep(TUNNEL_SPAWN_DELAY).await;
        tracing::info!(
            host = %self.host,
            runtime_port,
            local_port,
            "runtime port exposed to manager"
        );
        Ok(key)
    }

    // === Process registry ===

    /// Look up a registered process.
    pub fn get_process(&self, key: &str) -> Result<ManagedProcess, LazyError> {
        self.processes
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| LazyError::InvalidArgument(format!("unknown process key `{}`", key)))
    }

    /// All registered processes, optionally restricted to alive ones.
    pub fn get_processes(&self, only_alive: bool) -> HashMap<String, ManagedProcess> {
        let processes = self.processes.lock();
        processes
            .iter()
            .filter(|(_, process)| !only_alive || process.is_alive())
            .map(|(key, process)| (key.clone(), process.clone()))
            .collect()
    }

    /// Terminate a registered process by key.
    pub fn stop_process(&self, key: &str) -> Result<(), LazyError> {
        let process = self.get_process(key)?;
        process.terminate();
        tracing::debug!(host = %self.host, %key, "process stopped");
        Ok(())
    }

    /// Processes that were started to execute a task.
    pub fn task_processes(&self) -> Vec<ManagedProcess> {
        self.processes
            .lock()
            .iter()
            .filter(|(key, _)| proc_key::is_task_process(key))
            .map(|(_, process)| process.clone())
            .collect()
    }

    pub fn alive_process_count(&self) -> usize {
        self.get_processes(true).len()
    }

    /// Alive processes that are executing a task.
    pub fn alive_task_process_count(&self) -> usize {
        self.processes
            .lock()
            .iter()
            .filter(|(key, process)| proc_key::is_task_process(key) && process.is_alive())
            .count()
    }

    // === Host info ===

    /// Information about the host, probed once and cached.
    pub async fn info(&self) -> Result<HostInfo, LazyError> {
        if let Some(info) = self.info.lock().clone() {
            return Ok(info);
        }
        let info = hostinfo::read(self).await?;
        *self.info.lock() = Some(info.clone());
        Ok(info)
    }

    /// True once the info cache is filled.
    pub fn has_info(&self) -> bool {
        self.info.lock().is_some()
    }

    /// Store probed info, e.g. from a group-level concurrent probe.
    pub fn set_info(&self, info: HostInfo) {
        *self.info.lock() = Some(info);
    }

    /// Print the host info formatted as a table.
    pub async fn print_info(&self) -> Result<(), LazyError> {
        let info = self.info().await?;
        println!("Information of runtime {}:", self.host);
        println!("{:<20} {}", "os", info.os);
        println!("{:<20} {}", "cpu_cores", info.cpu_cores);
        println!("{:<20} {} mb", "memory", info.memory_in_mb());
        println!("{:<20} {}", "python_version", info.python_version);
        println!(
            "{:<20} {}",
            "workspace_version",
            info.workspace_version.as_deref().unwrap_or("-")
        );
        println!("{:<20} {}", "gpus", info.gpus.join(", "));
        Ok(())
    }

    /// Check the runtime against filter criteria; all criteria must
    /// hold.
    pub async fn check_filter(&self, filter: &RuntimeFilter) -> Result<bool, LazyError> {
        tracing::debug!(host = %self.host, "evaluating filter criteria");
        let mut all_passed = true;

        if filter.needs_info() {
            let info = self.info().await?;
            if filter.gpu_required && info.gpus.is_empty() {
                tracing::debug!(host = %self.host, "filter failed: no gpus");
                all_passed = false;
            }
            if let Some(min_memory) = filter.min_memory_mb {
                if info.memory_in_mb() < min_memory {
                    tracing::debug!(
                        host = %self.host,
                        available = info.memory_in_mb(),
                        required = min_memory,
                        "filter failed: not enough memory"
                    );
                    all_passed = false;
                }
            }
            if let Some(min_cores) = filter.min_cpu_cores {
                if info.cpu_cores < min_cores {
                    tracing::debug!(
                        host = %self.host,
                        available = info.cpu_cores,
                        required = min_cores,
                        "filter failed: not enough cpu cores"
                    );
                    all_passed = false;
                }
            }
        }

        for executable in &filter.installed_executables {
            let command = format!(r#"hash {} 2>/dev/null && echo "true" || echo """#, executable);
            if !self.filter_command_checked(&command).await? {
                tracing::debug!(host = %self.host, %executable, "filter failed: executable missing");
                all_passed = false;
            }
        }
        for command in &filter.filter_commands {
            if !self.filter_command_checked(command).await? {
                tracing::debug!(host = %self.host, %command, "filter command not satisfied");
                all_passed = false;
            }
        }

        Ok(all_passed)
    }

    async fn filter_command_checked(&self, command: &str) -> Result<bool, LazyError> {
        let task = Task::new(format!("filter-check-{}", short_id()));
        task.run_command(command)?;
        self.execute_task(
            &task,
            TaskDispatch {
                execute_async: false,
                ..TaskDispatch::default()
            },
        )
        .await?;
        let log = task.execution_log();
        Ok(log
            .last()
            .map(|entry| entry.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false))
    }

    // === Logs & task state ===

    /// Echo a message on the runtime and return the output.
    pub async fn echo(&self, message: &str) -> Result<String, LazyError> {
        let working_dir = self.working_dir().await?;
        let opts = RunOptions {
            cwd: Some(working_dir),
            env: self.env_variables(),
            timeout: Some(ADMIN_COMMAND_TIMEOUT),
        };
        let result = self
            .connection()
            .run(&format!("echo {}", message), &opts, None)
            .await
            .map_err(|e| e.into_lazy(&self.host))?;
        Ok(result.output)
    }

    /// Execution log of a task previously executed here.
    pub fn execution_log(&self, task_name: &str) -> Result<Vec<String>, LazyError> {
        self.tasks
            .lock()
            .iter()
            .find(|task| task.name() == task_name)
            .map(|task| task.execution_log())
            .ok_or_else(|| {
                LazyError::InvalidArgument(format!(
                    "task {} was not executed on runtime {}",
                    task_name, self.host
                ))
            })
    }

    /// Print the execution logs of every task executed here.
    pub fn print_log(&self) {
        for task in self.tasks.lock().iter() {
            task.print_log();
        }
    }

    /// Tasks executed on this runtime, in dispatch order.
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }

    /// Drop all task state and task-kind registry entries. Tunnels
    /// stay registered.
    pub fn clear_tasks(&self) {
        tracing::info!(host = %self.host, "clearing tasks");
        self.tasks.lock().clear();
        self.processes
            .lock()
            .retain(|key, _| !proc_key::is_task_process(key));
    }

    /// Return data of all function steps executed through this
    /// runtime, in task dispatch order. Joins the tasks first.
    pub async fn function_returns(&self) -> Result<FunctionReturns, LazyError> {
        tracing::debug!(host = %self.host, "collecting function returns");
        let tasks = self.tasks();
        let mut paths = Vec::new();
        for task in tasks {
            task.join().await?;
            paths.extend(task.return_artifact_paths());
        }
        Ok(FunctionReturns::new(paths))
    }

    /// Block until all tasks executed here finished.
    pub async fn join(&self) -> Result<(), LazyError> {
        tracing::info!(host = %self.host, "joining task processes");
        let tasks = self.tasks();
        let mut first_error = None;
        for task in tasks {
            if let Err(error) = task.join().await {
                tracing::warn!(host = %self.host, task = %task.name(), %error, "task failed");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Release everything: terminate and reap registered children,
    /// remove a temporary working directory, clean up owned tasks.
    /// Tolerates partial failure; never errors.
    pub async fn cleanup(&self) {
        tracing::info!(host = %self.host, "start cleanup");
        let processes: Vec<(String, ManagedProcess)> =
            self.processes.lock().drain().collect();
        for (key, process) in processes {
            process.shutdown().await;
            if process.is_alive() {
                tracing::warn!(host = %self.host, %key, "process could not be terminated");
            } else {
                tracing::debug!(host = %self.host, %key, "process terminated");
            }
        }

        let temp_dir = {
            let state = self.working_dir.lock();
            if state.is_temp { state.path.clone() } else { None }
        };
        if let Some(dir) = temp_dir {
            match self.delete_dir(&dir).await {
                Ok(true) => {
                    let mut state = self.working_dir.lock();
                    state.path = None;
                    state.is_temp = false;
                }
                Ok(false) => {
                    tracing::warn!(host = %self.host, %dir, "temporary working directory could not be removed");
                }
                Err(error) => {
                    tracing::warn!(host = %self.host, %dir, %error, "failed to remove temporary working directory");
                }
            }
        }

        for task in self.tasks.lock().iter() {
            task.cleanup();
        }
    }
}

/// Parse `python3 --version` output; supported means 3.6 or newer.
fn python_version_supported(stdout: &str) -> bool {
    // Example: `Python 3.8.10`
    let version = stdout
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .trim();
    let mut parts = version.split('.');
    let major: u32 = match parts.next().and_then(|part| part.parse().ok()) {
        Some(major) => major,
        None => return false,
    };
    let minor: u32 = parts
        .next()
        .and_then(|part| part.parse().ok())
        .unwrap_or(0);
    if major > 3 {
        tracing::warn!("python {} detected, lazycluster is only tested against python 3", version);
        return true;
    }
    major == 3 && minor >= 6
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
