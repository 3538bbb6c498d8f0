// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The manager itself as a runtime.
//!
//! A `localhost` runtime does not go through sshd: commands run in a
//! local `sh -c` child and file transfers are filesystem copies. The
//! semantics mirror [`SshConnection`] so the task engine cannot tell
//! the difference.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::connection::{CommandResult, Connection, OutputFn, RunOptions};
use crate::error::TransportError;
use crate::subprocess::stream_command;
use crate::LOCALHOST;

#[derive(Debug, Clone, Default)]
pub struct LocalConnection;

impl LocalConnection {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn host(&self) -> &str {
        LOCALHOST
    }

    async fn run(
        &self,
        command: &str,
        opts: &RunOptions,
        on_output: Option<&OutputFn>,
    ) -> Result<CommandResult, TransportError> {
        tracing::debug!(%command, "running local command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&opts.env);
        stream_command(cmd, opts.timeout, "sh", on_output).await
    }

    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<(), TransportError> {
        copy(local_path, Path::new(remote_path)).await
    }

    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<(), TransportError> {
        copy(Path::new(remote_path), local_path).await
    }
}

async fn copy(from: &Path, to: &Path) -> Result<(), TransportError> {
    if let Some(dir) = to.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| TransportError::Io {
                context: format!("creating {}", dir.display()),
                source,
            })?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|source| TransportError::Io {
            context: format!("copying {} to {}", from.display(), to.display()),
            source,
        })?;
    Ok(())
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
