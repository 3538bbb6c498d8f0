// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lc-runtimes: tasks, runtimes and groups.
//!
//! A [`Task`] is an ordered list of elementary steps (run a command,
//! send a file, get a file, invoke a registered function). A
//! [`Runtime`] is one remote host that executes tasks, keeps a
//! registry of the child processes it spawned and owns a working
//! directory on the host. A [`RuntimeGroup`] coordinates several
//! runtimes: group-wide port discovery, port exposure, broadcasting
//! and least-busy dispatch. The [`RuntimeManager`] turns a
//! [`HostSource`] into validated runtimes.

pub mod group;
pub mod hostinfo;
pub mod manager;
pub mod runtime;
pub mod task;

pub use group::{PortSpec, RuntimeGroup, INTERNAL_PORT_MAX, INTERNAL_PORT_MIN};
pub use hostinfo::HostInfo;
pub use manager::{GroupFilter, HostSource, RuntimeManager, StaticHostSource};
pub use runtime::{ManagedProcess, Runtime, RuntimeFilter, TaskDispatch, WORKING_DIR_ENV_VAR};
pub use task::{ExecuteOptions, FunctionReturns, Task, TaskStep};
