// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lc-core: shared model for the lazycluster manager.
//!
//! Holds everything the higher layers agree on: the error taxonomy,
//! the manager-local directory context, process-key naming, port-list
//! math, execution log files, and the remote-function registry.

pub mod env;
pub mod error;
pub mod functions;
pub mod id;
pub mod logfile;
pub mod ports;
pub mod proc_key;

pub use env::Environment;
pub use error::LazyError;
pub use functions::{agent_guard, ArtifactNames, FunctionPayload};
pub use id::short_id;
pub use logfile::ExecutionLogFile;
pub use ports::remaining_ports;
pub use proc_key::ForwardKind;
