// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Groups of logically related runtimes.
//!
//! A group coordinates what single runtimes cannot decide alone:
//! which port is free everywhere, how a service on one host becomes
//! reachable as `localhost:<port>` on every other host (all tunnels
//! are routed through the manager), where the next task should run,
//! and how a task is broadcast without sharing execution state
//! between recipients.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use lc_core::{Environment, LazyError};
use lc_transport::{localhost_has_free_port, LOCALHOST};

use crate::runtime::{ManagedProcess, Runtime, TaskDispatch};
use crate::task::{FunctionReturns, Task};

/// Start of the manager-local port window used when tunneling between
/// two remote hosts.
pub const INTERNAL_PORT_MIN: u16 = 5800;
/// End (exclusive) of the manager-local port window.
pub const INTERNAL_PORT_MAX: u16 = 5999;

/// A requested port: one specific port, or a pool to pick the first
/// free port from.
#[derive(Debug, Clone)]
pub enum PortSpec {
    Port(u16),
    Pool(Vec<u16>),
}

/// An insertion-ordered collection of runtimes.
pub struct RuntimeGroup {
    runtimes: Mutex<IndexMap<String, Arc<Runtime>>>,
    tasks: Mutex<Vec<Task>>,
    proc_keys: Mutex<Vec<String>>,
    // Sliding window: advanced past every port handed out, so a port
    // now carrying a tunnel is never handed out again.
    internal_ports: Mutex<std::ops::Range<u16>>,
}

impl std::fmt::Debug for RuntimeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeGroup")
            .field("hosts", &self.hosts())
            .finish()
    }
}

impl RuntimeGroup {
    /// Create a group from already validated runtimes.
    pub fn new(runtimes: Vec<Arc<Runtime>>) -> Result<Self, LazyError> {
        if runtimes.is_empty() {
            return Err(LazyError::InvalidArgument(
                "a runtime group needs at least one runtime".to_string(),
            ));
        }
        let mut map = IndexMap::new();
        for runtime in runtimes {
            if map.contains_key(runtime.host()) {
                return Err(LazyError::InvalidArgument(format!(
                    "runtime with host {} is already contained in the group",
                    runtime.host()
                )));
            }
            map.insert(runtime.host().to_string(), runtime);
        }
        tracing::debug!("runtime group initialized");
        Ok(Self {
            runtimes: Mutex::new(map),
            tasks: Mutex::new(Vec::new()),
            proc_keys: Mutex::new(Vec::new()),
            internal_ports: Mutex::new(INTERNAL_PORT_MIN..INTERNAL_PORT_MAX),
        })
    }

    /// Create a group by validating each host.
    pub async fn from_hosts(
        hosts: &[String],
        environment: Environment,
    ) -> Result<Self, LazyError> {
        let mut runtimes = Vec::new();
        for host in hosts {
            runtimes.push(Arc::new(
                Runtime::new(host.clone(), environment.clone()).await?,
            ));
        }
        Self::new(runtimes)
    }

    // === Membership ===

    pub fn hosts(&self) -> Vec<String> {
        self.runtimes.lock().keys().cloned().collect()
    }

    pub fn runtimes(&self) -> Vec<Arc<Runtime>> {
        self.runtimes.lock().values().cloned().collect()
    }

    pub fn runtime_count(&self) -> usize {
        self.runtimes.lock().len()
    }

    pub fn contains_runtime(&self, host: &str) -> bool {
        self.runtimes.lock().contains_key(host)
    }

    /// Add a runtime. Duplicate hosts are rejected.
    pub fn add_runtime(&self, runtime: Arc<Runtime>) -> Result<(), LazyError> {
        let mut runtimes = self.runtimes.lock();
        if runtimes.contains_key(runtime.host()) {
            return Err(LazyError::InvalidArgument(format!(
                "runtime with host {} is already contained in the group",
                runtime.host()
            )));
        }
        tracing::info!(host = %runtime.host(), "runtime added to the group");
        runtimes.insert(runtime.host().to_string(), runtime);
        Ok(())
    }

    /// Remove a runtime by host. Removing an absent host is a
    /// warning, not an error.
    pub fn remove_runtime(&self, host: &str) {
        if self.runtimes.lock().shift_remove(host).is_none() {
            tracing::warn!(%host, "runtime is not contained in the group");
        } else {
            tracing::info!(%host, "runtime removed from the group");
        }
    }

    /// Get a runtime by host, or the least busy one when no host is
    /// given.
    pub fn get_runtime(&self, host: Option<&str>) -> Result<Arc<Runtime>, LazyError> {
        match host {
            Some(host) => self.runtimes.lock().get(host).cloned().ok_or_else(|| {
                LazyError::InvalidArgument(format!("host {} is not contained in the group", host))
            }),
            None => self.least_busy_runtime(),
        }
    }

    /// Runtimes as a map: all of them, an `include` subset, or the
    /// complement of `exclude`. The two restrictions are mutually
    /// exclusive.
    pub fn get_runtimes(
        &self,
        include_hosts: Option<&[String]>,
        exclude_hosts: Option<&[String]>,
    ) -> Result<IndexMap<String, Arc<Runtime>>, LazyError> {
        let runtimes = self.runtimes.lock();
        match (include_hosts, exclude_hosts) {
            (Some(_), Some(_)) => Err(LazyError::InvalidArgument(
                "only include_hosts or exclude_hosts must be provided, not both".to_string(),
            )),
            (Some(include), None) => {
                let mut selected = IndexMap::new();
                for host in include {
                    let runtime = runtimes.get(host).ok_or_else(|| {
                        LazyError::InvalidArgument(format!(
                            "{} is not contained in the group",
                            host
                        ))
                    })?;
                    selected.insert(host.clone(), Arc::clone(runtime));
                }
                Ok(selected)
            }
            (None, Some(exclude)) => Ok(runtimes
                .iter()
                .filter(|(host, _)| !exclude.contains(host))
                .map(|(host, runtime)| (host.clone(), Arc::clone(runtime)))
                .collect()),
            (None, None) => Ok(runtimes
                .iter()
                .map(|(host, runtime)| (host.clone(), Arc::clone(runtime)))
                .collect()),
        }
    }

    fn least_busy_runtime(&self) -> Result<Arc<Runtime>, LazyError> {
        let runtimes = self.runtimes.lock();
        let mut best: Option<Arc<Runtime>> = None;
        for runtime in runtimes.values() {
            match &best {
                None => best = Some(Arc::clone(runtime)),
                Some(current)
                    if runtime.alive_task_process_count()
                        < current.alive_task_process_count() =>
                {
                    best = Some(Arc::clone(runtime));
                }
                _ => {}
            }
        }
        best.ok_or_else(|| {
            LazyError::InvalidArgument("the group contains no runtimes".to_string())
        })
    }

    // === Environment ===

    /// Replace the environment of every contained runtime.
    pub fn set_env_variables(&self, env_variables: HashMap<String, String>) {
        for runtime in self.runtimes() {
            runtime.set_env_variables(env_variables.clone());
        }
    }

    /// Merge variables into every contained runtime's environment.
    pub fn add_env_variables(&self, env_variables: HashMap<String, String>) {
        for runtime in self.runtimes() {
            runtime.add_env_variables(env_variables.clone());
        }
    }

    // === Ports ===

    /// Check whether `port` is free on all non-excluded runtimes.
    pub async fn has_free_port(
        &self,
        port: u16,
        exclude_hosts: &[String],
    ) -> Result<bool, LazyError> {
        let mut is_free = true;
        for (host, runtime) in self.get_runtimes(None, Some(exclude_hosts))? {
            if !runtime.has_free_port(port).await? {
                tracing::debug!(port, %host, "port is currently in use");
                is_free = false;
            }
        }
        Ok(is_free)
    }

    /// First port from `ports` that is free on the whole group.
    ///
    /// With `enforce_check_on_localhost` the manager itself is probed
    /// as well, even when it is not a member of the group.
    pub async fn get_free_port(
        &self,
        ports: &[u16],
        enforce_check_on_localhost: bool,
    ) -> Result<u16, LazyError> {
        if ports.is_empty() {
            return Err(LazyError::NoPortsLeft);
        }
        let localhost_in_group = self.contains_runtime(LOCALHOST);
        for &port in ports {
            if enforce_check_on_localhost
                && !localhost_in_group
                && !localhost_has_free_port(port)
            {
                continue;
            }
            if !self.has_free_port(port, &[]).await? {
                continue;
            }
            tracing::debug!(port, "free port retrieved in the group");
            return Ok(port);
        }
        Err(LazyError::NoPortsLeft)
    }

    /// Expose a manager port on every non-excluded runtime so that
    /// `localhost:<returned port>` there reaches `localhost:<local_port>`
    /// on the manager. Returns the runtime-side port that was used.
    pub async fn expose_port_to_runtimes(
        &self,
        local_port: u16,
        runtime_port: Option<PortSpec>,
        exclude_hosts: &[String],
    ) -> Result<u16, LazyError> {
        tracing::info!(local_port, "start exposing a local port in the group");

        let selected = match runtime_port {
            None => local_port,
            Some(PortSpec::Port(port)) => port,
            Some(PortSpec::Pool(pool)) => self.get_free_port(&pool, false).await?,
        };

        // The localhost runtime is excluded from the check: exposing
        // there is the self-forward no-op.
        let mut check_excludes = exclude_hosts.to_vec();
        check_excludes.push(LOCALHOST.to_string());
        if !self.has_free_port(selected, &check_excludes).await? {
            return Err(LazyError::PortInUse {
                port: selected,
                host: None,
            });
        }

        for runtime in self.get_runtimes(None, Some(exclude_hosts))?.values() {
            let key = runtime
                .expose_port_to_runtime(local_port, Some(selected))
                .await?;
            if !key.is_empty() {
                self.proc_keys.lock().push(key);
            }
        }
        tracing::debug!(runtime_port = selected, "port used as runtime port");
        Ok(selected)
    }

    /// Expose a port of one runtime to all others, so that
    /// `localhost:<returned port>` anywhere in the group reaches
    /// `host:<runtime_port>` through the manager.
    pub async fn expose_port_from_runtime_to_group(
        &self,
        host: &str,
        runtime_port: u16,
        group_port: Option<PortSpec>,
    ) -> Result<u16, LazyError> {
        if !self.contains_runtime(host) {
            return Err(LazyError::InvalidArgument(format!(
                "runtime {} is not contained in the group",
                host
            )));
        }
        tracing::info!(%host, runtime_port, "start exposing a runtime port in the group");

        let selected = match group_port {
            None => runtime_port,
            Some(PortSpec::Port(port)) => port,
            Some(PortSpec::Pool(pool)) => self.get_free_port(&pool, false).await?,
        };
        if !self
            .has_free_port(selected, &[host.to_string()])
            .await?
        {
            return Err(LazyError::PortInUse {
                port: selected,
                host: None,
            });
        }

        // Every tunnel is mediated by the manager, so a manager-local
        // intermediate port is needed as well.
        let local_port = if localhost_has_free_port(selected) {
            selected
        } else {
            self.next_internal_port()?
        };

        for runtime in self.get_runtimes(None, None)?.values() {
            let key = if runtime.host() == host {
                runtime
                    .expose_port_from_runtime(runtime_port, Some(local_port))
                    .await?
            } else {
                runtime
                    .expose_port_to_runtime(local_port, Some(selected))
                    .await?
            };
            if !key.is_empty() {
                self.proc_keys.lock().push(key);
            }
        }
        tracing::debug!(group_port = selected, "port used as group port");
        Ok(selected)
    }

    /// Take the next free manager-local port from the sliding window,
    /// advancing the window past it.
    fn next_internal_port(&self) -> Result<u16, LazyError> {
        let mut window = self.internal_ports.lock();
        for port in window.clone() {
            if localhost_has_free_port(port) {
                *window = (port + 1)..INTERNAL_PORT_MAX;
                return Ok(port);
            }
        }
        *window = INTERNAL_PORT_MAX..INTERNAL_PORT_MAX;
        Err(LazyError::NoPortsLeft)
    }

    // === Task execution ===

    /// Execute a task on one runtime: the given `host`, or the least
    /// busy runtime when no host is given.
    pub async fn execute_task(
        &self,
        task: &Task,
        host: Option<&str>,
        dispatch: TaskDispatch,
    ) -> Result<Task, LazyError> {
        tracing::debug!(task = %task.name(), "executing task in the group");
        let runtime = self.get_runtime(host)?;
        runtime.execute_task(task, dispatch).await?;
        self.tasks.lock().push(task.clone());
        Ok(task.clone())
    }

    /// Execute a task on every runtime: the original goes to the
    /// first runtime, each further runtime gets a deep copy so no
    /// execution state is shared. Returns the tasks in group
    /// iteration order.
    pub async fn broadcast_task(
        &self,
        task: &Task,
        dispatch: TaskDispatch,
    ) -> Result<Vec<Task>, LazyError> {
        tracing::debug!(task = %task.name(), "broadcasting task in the group");
        let mut dispatched = Vec::new();
        for (index, runtime) in self.runtimes().into_iter().enumerate() {
            let current = if index == 0 {
                task.clone()
            } else {
                task.deep_copy()?
            };
            runtime.execute_task(&current, dispatch.clone()).await?;
            self.tasks.lock().push(current.clone());
            dispatched.push(current);
        }
        Ok(dispatched)
    }

    /// Send a file to every runtime, one generated task per runtime,
    /// in group iteration order.
    pub async fn send_file(
        &self,
        local_path: impl Into<PathBuf>,
        remote_path: Option<&str>,
        execute_async: bool,
    ) -> Result<Vec<Task>, LazyError> {
        let local_path = local_path.into();
        let mut tasks = Vec::new();
        for runtime in self.runtimes() {
            let task = runtime
                .send_file(local_path.clone(), remote_path, execute_async)
                .await?;
            self.tasks.lock().push(task.clone());
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Return data of all function steps dispatched through the
    /// group, in task dispatch order (and registration order within a
    /// task). Joins the tasks first.
    pub async fn function_returns(&self) -> Result<FunctionReturns, LazyError> {
        let tasks = self.tasks();
        let mut paths = Vec::new();
        for task in tasks {
            task.join().await?;
            paths.extend(task.return_artifact_paths());
        }
        Ok(FunctionReturns::new(paths))
    }

    /// Tasks dispatched through the group, in dispatch order.
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }

    /// Task processes of all contained runtimes.
    pub fn task_processes(&self) -> Vec<ManagedProcess> {
        self.runtimes()
            .into_iter()
            .flat_map(|runtime| runtime.task_processes())
            .collect()
    }

    /// Block until every task dispatched through the group finished,
    /// skipping those flagged `omit_on_join`.
    pub async fn join(&self) -> Result<(), LazyError> {
        tracing::info!("joining all task processes started via the group");
        let tasks = self.tasks();
        let mut first_error = None;
        for task in tasks {
            if let Err(error) = task.join().await {
                tracing::warn!(task = %task.name(), %error, "task failed");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Drop all group- and runtime-level task state. Tunnels stay.
    pub fn clear_tasks(&self) {
        tracing::info!("clearing all tasks in the group");
        self.tasks.lock().clear();
        self.proc_keys
            .lock()
            .retain(|key| !lc_core::proc_key::is_task_process(key));
        for runtime in self.runtimes() {
            runtime.clear_tasks();
        }
    }

    /// Trigger the host info probes concurrently and buffer the
    /// results, so later synchronous accessors don't block one by
    /// one.
    pub async fn fill_runtime_info_buffers_async(&self) {
        tracing::debug!("filling runtime info buffers");
        let mut handles = Vec::new();
        for runtime in self.runtimes() {
            if runtime.has_info() {
                continue;
            }
            handles.push(tokio::spawn(async move {
                if let Err(error) = runtime.info().await {
                    tracing::warn!(host = %runtime.host(), %error, "host info probe failed");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Print the hosts of the group.
    pub fn print_hosts(&self) {
        let hosts = self.hosts();
        if hosts.is_empty() {
            println!("The group is empty!");
            return;
        }
        for host in hosts {
            println!("{}", host);
        }
    }

    /// Print the info of every contained runtime.
    pub async fn print_runtime_info(&self) {
        self.fill_runtime_info_buffers_async().await;
        for runtime in self.runtimes() {
            if let Err(error) = runtime.print_info().await {
                tracing::warn!(host = %runtime.host(), %error, "cannot print runtime info");
            }
            println!();
        }
    }

    /// Print the execution logs of every contained runtime.
    pub fn print_log(&self) {
        for runtime in self.runtimes() {
            println!("Execution log of runtime {}:", runtime.host());
            runtime.print_log();
        }
    }

    /// Clean up every contained runtime.
    pub async fn cleanup(&self) {
        tracing::info!("start cleanup of the group");
        for runtime in self.runtimes() {
            runtime.cleanup().await;
        }
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
