// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH connection over the spawned OpenSSH client.
//!
//! Commands run through `ssh -tt` so remote stdout/stderr arrive
//! merged through a pty, the way an interactive session would show
//! them. File transfer goes through `scp`. Password-less key auth is
//! assumed; `BatchMode=yes` turns a missing key into a hard failure
//! instead of a prompt.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::connection::{CommandResult, Connection, OutputFn, RunOptions};
use crate::error::TransportError;
use crate::subprocess::{run_with_timeout, stream_command, TRANSFER_TIMEOUT};

/// Options forwarded to every `ssh`/`scp` invocation for one host.
///
/// This is the connection-kwargs bag of the runtime: it is carried
/// verbatim and never interpreted by the layers above.
#[derive(Debug, Clone, Default)]
pub struct SshOptions {
    /// Remote sshd port.
    pub port: Option<u16>,
    /// Private key file (`-i`).
    pub identity_file: Option<PathBuf>,
    /// Alternative client config (`-F`).
    pub config_file: Option<PathBuf>,
    /// Seconds for `ConnectTimeout`.
    pub connect_timeout: Option<u64>,
    /// Raw extra `-o` options, passed through untouched.
    pub extra_options: Vec<String>,
}

impl SshOptions {
    fn common_args(&self) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(seconds) = self.connect_timeout {
            args.push("-o".to_string());
            args.push(format!("ConnectTimeout={}", seconds));
        }
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        if let Some(config) = &self.config_file {
            args.push("-F".to_string());
            args.push(config.display().to_string());
        }
        for option in &self.extra_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args
    }

    fn ssh_args(&self) -> Vec<String> {
        let mut args = self.common_args();
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args
    }

    /// scp spells the port flag differently.
    fn scp_args(&self) -> Vec<String> {
        let mut args = self.common_args();
        if let Some(port) = self.port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        args
    }
}

/// A handle on one remote host, driven through `ssh`/`scp` children.
#[derive(Debug, Clone)]
pub struct SshConnection {
    host: String,
    options: SshOptions,
}

impl SshConnection {
    pub fn new(host: impl Into<String>, options: SshOptions) -> Self {
        Self {
            host: host.into(),
            options,
        }
    }

    pub fn options(&self) -> &SshOptions {
        &self.options
    }

    /// Compose the script executed by the remote login shell: change
    /// into the working directory, export the environment, then run
    /// the command.
    fn remote_script(command: &str, opts: &RunOptions) -> String {
        let mut script = String::new();
        if let Some(cwd) = &opts.cwd {
            script.push_str("cd ");
            script.push_str(&escape(cwd));
            script.push_str(" && ");
        }
        let mut env: Vec<_> = opts.env.iter().collect();
        env.sort();
        for (key, value) in env {
            script.push_str("export ");
            script.push_str(key);
            script.push('=');
            script.push_str(&escape(value));
            script.push_str("; ");
        }
        script.push_str(command);
        script
    }
}

#[async_trait]
impl Connection for SshConnection {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(
        &self,
        command: &str,
        opts: &RunOptions,
        on_output: Option<&OutputFn>,
    ) -> Result<CommandResult, TransportError> {
        let script = Self::remote_script(command, opts);
        tracing::debug!(host = %self.host, %command, "running remote command");

        let mut cmd = Command::new("ssh");
        cmd.args(self.options.ssh_args())
            .arg("-tt")
            .arg(&self.host)
            .arg("--")
            .arg(script);
        stream_command(cmd, opts.timeout, "ssh", on_output).await
    }

    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<(), TransportError> {
        tracing::debug!(
            host = %self.host,
            local = %local_path.display(),
            remote = %remote_path,
            "sending file"
        );
        let mut cmd = Command::new("scp");
        cmd.args(self.options.scp_args())
            .arg("-q")
            .arg("-r")
            .arg(local_path)
            .arg(format!("{}:{}", self.host, escape(remote_path)));
        check_transfer(run_with_timeout(cmd, TRANSFER_TIMEOUT, "scp").await?)
    }

    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<(), TransportError> {
        tracing::debug!(
            host = %self.host,
            remote = %remote_path,
            local = %local_path.display(),
            "retrieving file"
        );
        let mut cmd = Command::new("scp");
        cmd.args(self.options.scp_args())
            .arg("-q")
            .arg("-r")
            .arg(format!("{}:{}", self.host, escape(remote_path)))
            .arg(local_path);
        check_transfer(run_with_timeout(cmd, TRANSFER_TIMEOUT, "scp").await?)
    }
}

fn check_transfer(output: std::process::Output) -> Result<(), TransportError> {
    if output.status.success() {
        return Ok(());
    }
    Err(TransportError::TransferFailed {
        program: "scp".to_string(),
        code: output.status.code().unwrap_or(-1),
        detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

fn escape(value: &str) -> String {
    shell_escape::escape(Cow::Borrowed(value)).into_owned()
}

#[cfg(test)]
#[path = "ssh_tests.rs"]
mod tests;
