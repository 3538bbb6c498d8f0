// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The connection seam between the task engine and a host.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

/// Callback receiving remote output line by line while a command runs.
///
/// Task execution uses this to tee output into the execution log file
/// (or the manager's stdout in debug mode) before the command ends,
/// which matters for long-lived worker processes.
pub type OutputFn = dyn Fn(&str) + Send + Sync;

/// Options for a single remote command.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Remote directory to run in. Every step gets this fresh; a `cd`
    /// inside one command does not leak into the next.
    pub cwd: Option<String>,
    /// Environment stamped onto the command.
    pub env: HashMap<String, String>,
    /// Abort the command after this long.
    pub timeout: Option<Duration>,
}

/// Captured outcome of one remote command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Combined stdout/stderr as seen through the pty.
    pub output: String,
    /// Process exit code; -1 when terminated by signal.
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One host as seen by the task engine: run a command, move a file in,
/// move a file out.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The host this connection talks to.
    fn host(&self) -> &str;

    /// Run a shell command, streaming each output line to `on_output`
    /// as it arrives and returning the captured result.
    async fn run(
        &self,
        command: &str,
        opts: &RunOptions,
        on_output: Option<&OutputFn>,
    ) -> Result<CommandResult, TransportError>;

    /// Copy a manager-local file to the host.
    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<(), TransportError>;

    /// Copy a file from the host to the manager.
    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<(), TransportError>;
}
