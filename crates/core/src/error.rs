// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy of the lazycluster manager.
//!
//! Every failure surfaced by the core is one of these variants. Errors
//! carry host/port/path data by value so that they stay cheap to move
//! across task boundaries and never hold a live `Runtime` or group.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LazyError {
    /// The host failed the remote python-version probe.
    #[error("no runtime could be instantiated for host {host}")]
    InvalidRuntime { host: String },

    /// Discovery yielded zero valid hosts, or a filtered group is empty.
    #[error("no runtimes detected{}", fmt_cause(.cause))]
    NoRuntimesDetected { cause: Option<String> },

    /// A specific port was demanded and found occupied.
    #[error("port {port} is already in use{}", fmt_location(.host))]
    PortInUse { port: u16, host: Option<String> },

    /// A port list was exhausted without a match.
    #[error("no free port could be determined, no more ports left in the list")]
    NoPortsLeft,

    /// `mkdir -p` or equivalent reported an error.
    #[error("the path {path} could not be created{}", fmt_location(.host))]
    PathCreation { path: String, host: Option<String> },

    /// A run-command step exited non-zero during task execution.
    #[error(
        "task {task_name} failed on host {host} at step {step_index}, \
         see the execution log `{}`; output on the runtime was:\n{output}",
        .log_file.display()
    )]
    TaskExecution {
        step_index: usize,
        task_name: String,
        host: String,
        log_file: PathBuf,
        output: String,
    },

    /// The launcher could not confirm the master instance is listening.
    #[error("master instance could not be started on host {host} on port {port}: {cause}")]
    MasterStart {
        host: String,
        port: u16,
        cause: String,
    },

    /// The SSH layer failed (connect, run, put, get).
    #[error("connection to host {host} failed: {message}")]
    Connection { host: String, message: String },

    /// A caller violated an API contract (unknown host, bad parameter
    /// combination, unknown process key).
    #[error("{0}")]
    InvalidArgument(String),

    /// Anything else, with an optional predecessor.
    #[error("{message}{}", fmt_cause(.cause))]
    Other {
        message: String,
        cause: Option<String>,
    },
}

impl LazyError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            cause: None,
        }
    }

    pub fn other_with_cause(message: impl Into<String>, cause: impl ToString) -> Self {
        Self::Other {
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }
}

fn fmt_cause(cause: &Option<String>) -> String {
    match cause {
        Some(cause) => format!(", caused by: {}", cause),
        None => String::new(),
    }
}

fn fmt_location(host: &Option<String>) -> String {
    match host {
        Some(host) => format!(" on host {}", host),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
