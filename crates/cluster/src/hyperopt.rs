// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hyperopt cluster: a MongoDB instance on the manager acts as the
//! master, hyperopt mongo workers poll it from the runtimes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;

use lc_core::{remaining_ports, Environment, LazyError};
use lc_runtimes::{PortSpec, RuntimeGroup, Task, TaskDispatch};
use lc_transport::subprocess::run_with_timeout;
use lc_transport::{localhost_has_free_port, LOCALHOST};

use crate::cluster::{MasterWorkerCluster, DEFAULT_MASTER_START_TIMEOUT};
use crate::launcher::{MasterLauncher, WorkerLauncher};

/// MongoDB's conventional port.
pub const HYPEROPT_DEFAULT_MASTER_PORT: u16 = 27017;

/// Log file mongod writes into the db directory.
pub const MONGO_LOG_FILENAME: &str = "hyperopt_mongo.log";

/// Env var carrying the trials URL on every group member.
pub const MONGO_URL_ENV_VAR: &str = "MONGO_CONNECTION_URL";

const MONGOD_TIMEOUT: Duration = Duration::from_secs(60);

/// Starts a daemonized `mongod` on the manager and exposes its port
/// to the group.
pub struct LocalMongoLauncher {
    group: Arc<RuntimeGroup>,
    dbpath: PathBuf,
    port: Mutex<Option<u16>>,
}

impl LocalMongoLauncher {
    pub fn new(group: Arc<RuntimeGroup>, dbpath: PathBuf) -> Self {
        Self {
            group,
            dbpath,
            port: Mutex::new(None),
        }
    }

    fn start_command(&self, port: u16) -> Vec<String> {
        vec![
            "--fork".to_string(),
            format!("--logpath={}/{}", self.dbpath.display(), MONGO_LOG_FILENAME),
            format!("--dbpath={}", self.dbpath.display()),
            format!("--port={}", port),
        ]
    }

    fn stop_command(&self) -> Vec<String> {
        vec![
            "--shutdown".to_string(),
            format!("--dbpath={}", self.dbpath.display()),
        ]
    }
}

#[async_trait]
impl MasterLauncher for LocalMongoLauncher {
    fn port(&self) -> Option<u16> {
        *self.port.lock()
    }

    /// mongod forks itself into a daemon, so there is never a managed
    /// child to hold on to; shutdown goes through `mongod --shutdown`.
    fn has_process(&self) -> bool {
        false
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

        tracing::debug!(
            port = master_port,
            dbpath = %self.dbpath.display(),
            "starting mongodb on the manager"
        );

        let mut cmd = Command::new("mongod");
        cmd.args(self.start_command(master_port));
        let output = run_with_timeout(cmd, MONGOD_TIMEOUT, "mongod")
            .await
            .map_err(|e| LazyError::MasterStart {
                host: LOCALHOST.to_string(),
                port: master_port,
                cause: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(LazyError::MasterStart {
                host: LOCALHOST.to_string(),
                port: master_port,
                cause: format!(
                    "mongod exited with status {}; verify that (1) MongoDB is installed, \
                     (2) the dbpath `{}` exists with the rights required by mongod and \
                     (3) no other MongoDB instance is locking the respective files",
                    output.status.code().unwrap_or(-1),
                    self.dbpath.display()
                ),
            });
        }

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
        tracing::info!(port = master_port, "mongodb started on the manager");

        tracing::info!("exposing the mongodb port in the group");
        self.group
            .expose_port_to_runtimes(master_port, None, &[])
            .await?;

        Ok(remaining)
    }

    async fn cleanup(&self) {
        tracing::info!("stopping mongodb");
        let mut cmd = Command::new("mongod");
        cmd.args(self.stop_command());
        match run_with_timeout(cmd, MONGOD_TIMEOUT, "mongod --shutdown").await {
            Ok(output) if output.status.success() => {
                tracing::info!("mongodb successfully stopped");
            }
            Ok(_) | Err(_) => {
                tracing::warn!("the mongodb daemon could not be stopped");
            }
        }
    }
}

/// Places hyperopt mongo workers round-robin across the group.
pub struct HyperoptRoundRobinWorkerLauncher {
    group: Arc<RuntimeGroup>,
    dbname: String,
    poll_interval: f64,
}

impl HyperoptRoundRobinWorkerLauncher {
    pub fn new(
        group: Arc<RuntimeGroup>,
        dbname: impl Into<String>,
        poll_interval: f64,
    ) -> Result<Self, LazyError> {
        let dbname = dbname.into();
        if dbname.is_empty() {
            return Err(LazyError::InvalidArgument(
                "dbname must not be empty".to_string(),
            ));
        }
        if poll_interval <= 0.0 {
            return Err(LazyError::InvalidArgument(
                "poll_interval must be positive".to_string(),
            ));
        }
        Ok(Self {
            group,
            dbname,
            poll_interval,
        })
    }

    fn launch_command(&self, master_port: u16) -> String {
        format!(
            "hyperopt-mongo-worker --mongo=localhost:{}/{} --poll-interval={}",
            master_port, self.dbname, self.poll_interval
        )
    }
}

#[async_trait]
impl WorkerLauncher for HyperoptRoundRobinWorkerLauncher {
    /// Hyperopt workers poll the database and expose no port of their
    /// own.
    fn ports_per_host(&self) -> HashMap<String, Vec<u16>> {
        HashMap::new()
    }

    async fn start(
        &self,
        worker_count: usize,
        master_port: u16,
        ports: Vec<u16>,
        debug: bool,
    ) -> Result<Vec<u16>, LazyError> {
        let runtimes = self.group.runtimes();
        for worker_index in 0..worker_count {
            let runtime = &runtimes[worker_index % runtimes.len()];
            tracing::debug!(
                worker = worker_index,
                host = %runtime.host(),
                "launching hyperopt worker"
            );

            let task = Task::new(format!("launch-hyperopt-worker-{}", worker_index));
            task.run_command(self.launch_command(master_port))?;
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
        }
        Ok(ports)
    }

    async fn cleanup(&self) {
        tracing::debug!("no hyperopt worker launcher resources to release");
    }
}

/// A Hyperopt cluster over a runtime group.
pub struct HyperoptCluster {
    inner: MasterWorkerCluster,
    group: Arc<RuntimeGroup>,
    dbname: String,
}

impl HyperoptCluster {
    /// Build a cluster with the default launchers and the default
    /// database settings.
    pub fn new(group: Arc<RuntimeGroup>, environment: &Environment) -> Result<Self, LazyError> {
        Self::with_options(group, environment, None, "hyperopt", 0.1)
    }

    /// Build a cluster with explicit database settings.
    ///
    /// A given `dbpath` is used as-is; without one a `mongodb`
    /// directory is created inside the manager's main directory.
    pub fn with_options(
        group: Arc<RuntimeGroup>,
        environment: &Environment,
        dbpath: Option<PathBuf>,
        dbname: impl Into<String>,
        worker_poll_interval: f64,
    ) -> Result<Self, LazyError> {
        let dbpath = match dbpath {
            Some(path) => path,
            None => {
                let path = environment.main_directory().join("mongodb");
                std::fs::create_dir_all(&path).map_err(|_| LazyError::PathCreation {
                    path: path.display().to_string(),
                    host: None,
                })?;
                path
            }
        };
        let dbname = dbname.into();

        let master = Box::new(LocalMongoLauncher::new(Arc::clone(&group), dbpath));
        let workers = Box::new(HyperoptRoundRobinWorkerLauncher::new(
            Arc::clone(&group),
            dbname.clone(),
            worker_poll_interval,
        )?);
        Ok(Self {
            inner: MasterWorkerCluster::new(
                Arc::clone(&group),
                None,
                HYPEROPT_DEFAULT_MASTER_PORT,
                master,
                workers,
            ),
            group,
            dbname,
        })
    }

    pub async fn start(
        &self,
        worker_count: Option<usize>,
        master_port: Option<u16>,
        debug: bool,
    ) -> Result<(), LazyError> {
        tracing::info!("starting the hyperopt cluster");
        self.start_master(master_port, debug).await?;
        self.inner.start_workers(worker_count, debug).await
    }

    /// Start the MongoDB master and publish its connection URL into
    /// every group member's environment.
    pub async fn start_master(
        &self,
        master_port: Option<u16>,
        debug: bool,
    ) -> Result<(), LazyError> {
        self.inner
            .start_master(master_port, DEFAULT_MASTER_START_TIMEOUT, debug)
            .await?;
        self.group.add_env_variables(HashMap::from([(
            MONGO_URL_ENV_VAR.to_string(),
            self.mongo_trial_url(),
        )]));
        Ok(())
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

    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    /// URL in the format the hyperopt MongoTrials object expects.
    pub fn mongo_trial_url(&self) -> String {
        if self.master_port().is_none() {
            tracing::warn!("the mongo trial url was requested before the master port is set");
        }
        format!(
            "mongo://localhost:{}/{}/jobs",
            self.master_port().unwrap_or(HYPEROPT_DEFAULT_MASTER_PORT),
            self.dbname
        )
    }

    /// Plain `mongo://host:port/dbname` URL.
    pub fn mongo_url(&self) -> String {
        if self.master_port().is_none() {
            tracing::warn!("the mongo url was requested before the master port is set");
        }
        format!(
            "mongo://localhost:{}/{}",
            self.master_port().unwrap_or(HYPEROPT_DEFAULT_MASTER_PORT),
            self.dbname
        )
    }

    pub fn runtime_group(&self) -> &Arc<RuntimeGroup> {
        &self.group
    }

    pub fn print_log(&self) {
        self.inner.print_log();
    }

    pub async fn cleanup(&self) {
        tracing::info!("shutting down the hyperopt cluster");
        self.inner.cleanup().await;
    }
}

#[cfg(test)]
#[path = "hyperopt_tests.rs"]
mod tests;
