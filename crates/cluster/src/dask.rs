// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dask cluster: scheduler on the manager, workers round-robin across
//! the group.
//!
//! The scheduler always runs on the manager and its port is exposed
//! to every runtime, so workers connect to `localhost:<port>`
//! wherever they run. Worker ports are tunneled back through the
//! manager to form the `localhost` mesh Dask needs for shuffling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::{Child, Command};

use lc_core::{remaining_ports, LazyError};
use lc_runtimes::{PortSpec, RuntimeGroup, Task, TaskDispatch};
use lc_transport::{localhost_has_free_port, LOCALHOST};

use crate::cluster::{MasterWorkerCluster, DEFAULT_MASTER_START_TIMEOUT};
use crate::launcher::{setup_worker_ssh_tunnels, MasterLauncher, WorkerLauncher};

/// The Dask scheduler's conventional port.
pub const DASK_DEFAULT_MASTER_PORT: u16 = 8786;

/// Bootstrap command run on a runtime before launching a worker.
pub const DASK_PIP_INSTALL_COMMAND: &str = "pip install -q \"dask[complete]\"";

/// Starts `dask-scheduler` on the manager and exposes its port to the
/// group.
pub struct LocalDaskMasterLauncher {
    group: Arc<RuntimeGroup>,
    port: Mutex<Option<u16>>,
    process: Mutex<Option<Child>>,
}

impl LocalDaskMasterLauncher {
    pub fn new(group: Arc<RuntimeGroup>) -> Self {
        Self {
            group,
            port: Mutex::new(None),
            process: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MasterLauncher for LocalDaskMasterLauncher {
    fn port(&self) -> Option<u16> {
        *self.port.lock()
    }

    fn has_process(&self) -> bool {
        self.process.lock().is_some()
    }

    async fn start(
        &self,
        ports: PortSpec,
        timeout: Duration,
        debug: bool,
    ) -> Result<Vec<u16>, LazyError> {
        if debug {
            tracing::debug!("the debug flag has no effect when the master runs on the manager");
        }

        let (master_port, remaining) = match ports {
            PortSpec::Port(port) => {
                if localhost_has_free_port(port)
                    && self
                        .group
                        .has_free_port(port, &[LOCALHOST.to_string()])
                        .await?
                {
                    (port, Vec::new())
                } else {
                    return Err(LazyError::PortInUse { port, host: None });
                }
            }
            PortSpec::Pool(pool) => {
                let port = self.group.get_free_port(&pool, true).await?;
                let remaining = remaining_ports(&pool, port);
                (port, remaining)
            }
        };

        let child = Command::new("dask-scheduler")
            .arg("--port")
            .arg(master_port.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LazyError::MasterStart {
                host: LOCALHOST.to_string(),
                port: master_port,
                cause: format!("dask-scheduler could not be spawned: {}", e),
            })?;
        *self.process.lock() = Some(child);

        // Give the scheduler time to bind before verifying the port.
        tokio::time::sleep(timeout).await;

        if localhost_has_free_port(master_port) {
            return Err(LazyError::MasterStart {
                host: LOCALHOST.to_string(),
                port: master_port,
                cause: format!(
                    "the master port {} is still free when checking after the timeout of {}s",
                    master_port,
                    timeout.as_secs()
                ),
            });
        }
        *self.port.lock() = Some(master_port);
        tracing::info!(port = master_port, "dask scheduler started on the manager");

        // Route scheduler traffic through the manager so every
        // runtime reaches it on localhost.
        tracing::debug!("exposing the dask scheduler port in the group");
        self.group
            .expose_port_to_runtimes(master_port, None, &[])
            .await?;

        Ok(remaining)
    }

    async fn cleanup(&self) {
        tracing::info!("cleaning up the dask master launcher");
        let child = self.process.lock().take();
        if let Some(mut child) = child {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

/// Places Dask workers round-robin across the group.
pub struct DaskRoundRobinWorkerLauncher {
    group: Arc<RuntimeGroup>,
    ports_per_host: Mutex<HashMap<String, Vec<u16>>>,
}

impl DaskRoundRobinWorkerLauncher {
    pub fn new(group: Arc<RuntimeGroup>) -> Self {
        Self {
            group,
            ports_per_host: Mutex::new(HashMap::new()),
        }
    }

    fn launch_command(master_port: u16, worker_port: u16, working_dir: &str) -> String {
        format!(
            "dask-worker --worker-port={} --local-directory={} localhost:{}",
            worker_port, working_dir, master_port
        )
    }
}

#[async_trait]
impl WorkerLauncher for DaskRoundRobinWorkerLauncher {
    fn ports_per_host(&self) -> HashMap<String, Vec<u16>> {
        self.ports_per_host.lock().clone()
    }

    async fn start(
        &self,
        worker_count: usize,
        master_port: u16,
        ports: Vec<u16>,
        debug: bool,
    ) -> Result<Vec<u16>, LazyError> {
        let runtimes = self.group.runtimes();
        let mut pool = ports;

        for worker_index in 0..worker_count {
            let runtime = &runtimes[worker_index % runtimes.len()];
            tracing::debug!(
                worker = worker_index,
                host = %runtime.host(),
                "launching dask worker"
            );

            let worker_port = self.group.get_free_port(&pool, false).await?;
            pool = remaining_ports(&pool, worker_port);
            let working_dir = runtime.working_dir().await?;

            let task = Task::new(format!("launch-dask-worker-{}", worker_index));
            task.run_command(DASK_PIP_INSTALL_COMMAND)?;
            task.run_command(Self::launch_command(master_port, worker_port, &working_dir))?;
            self.group
                .execute_task(
                    &task,
                    Some(runtime.host()),
                    TaskDispatch {
                        execute_async: true,
                        omit_on_join: true,
                        debug,
                    },
                )
                .await?;

            self.ports_per_host
                .lock()
                .entry(runtime.host().to_string())
                .or_default()
                .push(worker_port);
        }

        // Dask shuffles data directly between workers.
        let ports_per_host = self.ports_per_host();
        setup_worker_ssh_tunnels(&self.group, &ports_per_host).await?;

        Ok(pool)
    }

    async fn cleanup(&self) {
        tracing::debug!("no dask worker launcher resources to release");
    }
}

/// A Dask cluster over a runtime group.
pub struct DaskCluster {
    inner: MasterWorkerCluster,
}

impl DaskCluster {
    /// Build a cluster with the default launchers: scheduler on the
    /// manager, workers round-robin.
    pub fn new(group: Arc<RuntimeGroup>) -> Self {
        let master = Box::new(LocalDaskMasterLauncher::new(Arc::clone(&group)));
        let workers = Box::new(DaskRoundRobinWorkerLauncher::new(Arc::clone(&group)));
        Self::with_launchers(group, None, master, workers)
    }

    /// Build a cluster with custom launchers or a custom port pool.
    pub fn with_launchers(
        group: Arc<RuntimeGroup>,
        ports: Option<Vec<u16>>,
        master_launcher: Box<dyn MasterLauncher>,
        worker_launcher: Box<dyn WorkerLauncher>,
    ) -> Self {
        Self {
            inner: MasterWorkerCluster::new(
                group,
                ports,
                DASK_DEFAULT_MASTER_PORT,
                master_launcher,
                worker_launcher,
            ),
        }
    }

    pub async fn start(
        &self,
        worker_count: Option<usize>,
        master_port: Option<u16>,
        debug: bool,
    ) -> Result<(), LazyError> {
        self.inner.start(worker_count, master_port, debug).await
    }

    pub async fn start_master(
        &self,
        master_port: Option<u16>,
        debug: bool,
    ) -> Result<(), LazyError> {
        self.inner
            .start_master(master_port, DEFAULT_MASTER_START_TIMEOUT, debug)
            .await
    }

    pub async fn start_workers(
        &self,
        count: Option<usize>,
        debug: bool,
    ) -> Result<(), LazyError> {
        self.inner.start_workers(count, debug).await
    }

    pub fn master_port(&self) -> Option<u16> {
        self.inner.master_port()
    }

    /// Address clients connect to once the cluster runs.
    pub fn scheduler_address(&self) -> Option<String> {
        self.master_port()
            .map(|port| format!("localhost:{}", port))
    }

    pub fn runtime_group(&self) -> &Arc<RuntimeGroup> {
        self.inner.runtime_group()
    }

    pub fn print_log(&self) {
        self.inner.print_log();
    }

    pub async fn cleanup(&self) {
        tracing::info!("shutting down the dask cluster");
        self.inner.cleanup().await;
    }
}

#[cfg(test)]
#[path = "dask_tests.rs"]
mod tests;
