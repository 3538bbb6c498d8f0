// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lc-cluster: master/worker topologies over a runtime group.
//!
//! The skeleton is [`MasterWorkerCluster`]: pick a master port from a
//! pool, let a [`MasterLauncher`] bring the master up, then let a
//! [`WorkerLauncher`] place workers across the group. The concrete
//! launchers wire in the third-party binaries (Dask scheduler and
//! workers, MongoDB plus Hyperopt workers) and route every peer
//! connection through manager-mediated SSH tunnels so all entities
//! see each other on `localhost`.

pub mod cluster;
pub mod dask;
pub mod hyperopt;
pub mod launcher;

pub use cluster::{
    MasterWorkerCluster, DEFAULT_MASTER_PORT, DEFAULT_MASTER_START_TIMEOUT,
    DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START,
};
pub use dask::{DaskCluster, DaskRoundRobinWorkerLauncher, LocalDaskMasterLauncher};
pub use hyperopt::{HyperoptCluster, HyperoptRoundRobinWorkerLauncher, LocalMongoLauncher};
pub use launcher::{MasterLauncher, WorkerLauncher};
