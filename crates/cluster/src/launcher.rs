// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Launcher strategies.
//!
//! How a master or a set of workers comes up differs per cluster kind;
//! the skeleton only depends on these two traits. Implementations own
//! the launched processes and report the ports they used.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use lc_core::LazyError;
use lc_runtimes::{PortSpec, RuntimeGroup};

/// Strategy for launching the master instance of a cluster.
#[async_trait]
pub trait MasterLauncher: Send + Sync {
    /// The port the master listens on. None before a successful
    /// start.
    fn port(&self) -> Option<u16>;

    /// Whether the launcher holds a managed child process for the
    /// master. Daemonized masters legitimately answer false.
    fn has_process(&self) -> bool;

    /// Launch the master. With a port pool the launcher picks the
    /// first free port and returns the remaining pool; with a single
    /// port it returns an empty list.
    async fn start(
        &self,
        ports: PortSpec,
        timeout: Duration,
        debug: bool,
    ) -> Result<Vec<u16>, LazyError>;

    /// Release the launcher's resources.
    async fn cleanup(&self);
}

/// Strategy for launching the worker instances of a cluster.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Ports with a reachable worker instance, per host.
    fn ports_per_host(&self) -> HashMap<String, Vec<u16>>;

    /// Launch `worker_count` workers against the master, drawing
    /// worker ports from `ports`. Returns the shrunken pool.
    async fn start(
        &self,
        worker_count: usize,
        master_port: u16,
        ports: Vec<u16>,
        debug: bool,
    ) -> Result<Vec<u16>, LazyError>;

    /// Release the launcher's resources.
    async fn cleanup(&self);
}

/// Tunnel every worker port through the manager so that workers can
/// reach each other on `localhost`, which shuffling data between
/// workers requires.
pub async fn setup_worker_ssh_tunnels(
    group: &RuntimeGroup,
    ports_per_host: &HashMap<String, Vec<u16>>,
) -> Result<(), LazyError> {
    tracing::info!("setting up ssh tunnels for inter-worker communication");
    for (host, ports) in ports_per_host {
        for &worker_port in ports {
            group
                .expose_port_from_runtime_to_group(host, worker_port, None)
                .await?;
        }
    }
    Ok(())
}
