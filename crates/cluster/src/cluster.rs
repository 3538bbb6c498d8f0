// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The master/worker cluster skeleton.
//!
//! Startup is strictly serialized: the master comes up first, then
//! the workers. The cluster owns the port pool; launchers hand back
//! whatever they did not consume.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use lc_core::LazyError;
use lc_runtimes::{PortSpec, RuntimeGroup};

use crate::launcher::{MasterLauncher, WorkerLauncher};

/// Master port tried first when the caller picks none.
pub const DEFAULT_MASTER_PORT: u16 = 60000;
/// Start of the default port pool.
pub const DEFAULT_PORT_RANGE_START: u16 = 60001;
/// End (exclusive) of the default port pool.
pub const DEFAULT_PORT_RANGE_END: u16 = 60200;

/// Grace period daemons get to bind their port before the launcher
/// verifies it.
pub const DEFAULT_MASTER_START_TIMEOUT: Duration = Duration::from_secs(3);

/// A cluster following the master/worker architecture. Concrete
/// clusters wire their launchers into this skeleton.
pub struct MasterWorkerCluster {
    group: Arc<RuntimeGroup>,
    ports: Mutex<Vec<u16>>,
    master_launcher: Box<dyn MasterLauncher>,
    worker_launcher: Box<dyn WorkerLauncher>,
    default_master_port: u16,
}

impl MasterWorkerCluster {
    pub fn new(
        group: Arc<RuntimeGroup>,
        ports: Option<Vec<u16>>,
        default_master_port: u16,
        master_launcher: Box<dyn MasterLauncher>,
        worker_launcher: Box<dyn WorkerLauncher>,
    ) -> Self {
        let ports =
            ports.unwrap_or_else(|| (DEFAULT_PORT_RANGE_START..DEFAULT_PORT_RANGE_END).collect());
        tracing::debug!("master worker cluster initialized");
        Self {
            group,
            ports: Mutex::new(ports),
            master_launcher,
            worker_launcher,
            default_master_port,
        }
    }

    /// The port the master was started on. None before startup.
    pub fn master_port(&self) -> Option<u16> {
        self.master_launcher.port()
    }

    pub fn runtime_group(&self) -> &Arc<RuntimeGroup> {
        &self.group
    }

    /// Remaining ports of the cluster's pool.
    pub fn remaining_ports(&self) -> Vec<u16> {
        self.ports.lock().clone()
    }

    /// Bring up master, then workers.
    pub async fn start(
        &self,
        worker_count: Option<usize>,
        master_port: Option<u16>,
        debug: bool,
    ) -> Result<(), LazyError> {
        tracing::info!("starting the cluster");
        self.start_master(master_port, DEFAULT_MASTER_START_TIMEOUT, debug)
            .await?;
        self.start_workers(worker_count, debug).await
    }

    /// Start the master instance.
    ///
    /// An explicit `master_port` is passed through untouched; without
    /// one the cluster's default master port is used when it is free
    /// group-wide, otherwise the whole remaining pool is handed to the
    /// launcher.
    pub async fn start_master(
        &self,
        master_port: Option<u16>,
        timeout: Duration,
        debug: bool,
    ) -> Result<(), LazyError> {
        let (spec, pool_given) = match master_port {
            Some(port) => (PortSpec::Port(port), false),
            None => {
                if self
                    .group
                    .has_free_port(self.default_master_port, &[])
                    .await?
                {
                    (PortSpec::Port(self.default_master_port), false)
                } else {
                    (PortSpec::Pool(self.ports.lock().clone()), true)
                }
            }
        };

        let remaining = self.master_launcher.start(spec, timeout, debug).await?;
        if pool_given {
            *self.ports.lock() = remaining;
        }

        // The launcher contract: the port must be set after a
        // successful start. A missing process handle is allowed for
        // daemonized masters, but worth a warning since nothing can
        // shut the master down later.
        if self.master_launcher.port().is_none() {
            return Err(LazyError::other(
                "master launcher did not record the master port after start",
            ));
        }
        if !self.master_launcher.has_process() {
            tracing::warn!(
                "no master process handle is set after starting the cluster master; \
                 if the master was not started as a daemon this indicates a launcher bug"
            );
        }

        tracing::info!(port = self.master_launcher.port(), "master instance started");
        Ok(())
    }

    /// Start the worker instances; placement is entirely up to the
    /// worker launcher. Defaults to one worker per runtime.
    pub async fn start_workers(
        &self,
        count: Option<usize>,
        debug: bool,
    ) -> Result<(), LazyError> {
        let count = count.unwrap_or_else(|| self.group.runtime_count());
        let master_port = self.master_port().ok_or_else(|| {
            LazyError::other("workers cannot be started before the master")
        })?;

        let pool = self.ports.lock().clone();
        let remaining = self
            .worker_launcher
            .start(count, master_port, pool, debug)
            .await?;
        *self.ports.lock() = remaining;

        tracing::info!(count, "worker instances started");
        Ok(())
    }

    /// Print the execution logs of the contained group.
    pub fn print_log(&self) {
        self.group.print_log();
    }

    /// Shut the cluster down: workers, then master, then the group.
    pub async fn cleanup(&self) {
        tracing::info!("shutting down the master worker cluster");
        self.worker_launcher.cleanup().await;
        self.master_launcher.cleanup().await;
        self.group.cleanup().await;
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
