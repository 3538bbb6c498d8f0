// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH port-forward tunnels.
//!
//! Tunnels are deliberately OS-level `ssh -N` children rather than
//! in-process tasks: they must outlive whatever request spawned them
//! and stay individually killable by pid. Each tunnel is registered
//! in its runtime's process map under an exposure key.

use std::process::Stdio;

use parking_lot::Mutex;
use tokio::process::{Child, Command};

use crate::error::TransportError;
use crate::ssh::SshOptions;

/// A running `ssh -N` forward child.
#[derive(Debug)]
pub struct TunnelProcess {
    child: Mutex<Option<Child>>,
}

impl TunnelProcess {
    /// Forward `localhost:<local_port>` on the manager to
    /// `localhost:<runtime_port>` on the host (`ssh -L`).
    pub fn local_forward(
        host: &str,
        options: &SshOptions,
        local_port: u16,
        runtime_port: u16,
    ) -> Result<Self, TransportError> {
        let spec = format!("{}:localhost:{}", local_port, runtime_port);
        tracing::debug!(%host, %spec, "opening local forward");
        Self::spawn(host, options, "-L", &spec)
    }

    /// Forward `localhost:<runtime_port>` on the host back to
    /// `localhost:<local_port>` on the manager (`ssh -R`).
    pub fn remote_forward(
        host: &str,
        options: &SshOptions,
        runtime_port: u16,
        local_port: u16,
    ) -> Result<Self, TransportError> {
        let spec = format!("{}:localhost:{}", runtime_port, local_port);
        tracing::debug!(%host, %spec, "opening remote forward");
        Self::spawn(host, options, "-R", &spec)
    }

    fn spawn(
        host: &str,
        options: &SshOptions,
        direction: &str,
        spec: &str,
    ) -> Result<Self, TransportError> {
        let mut cmd = Command::new("ssh");
        cmd.args(ssh_args(options))
            .arg("-N")
            .arg(direction)
            .arg(spec)
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let child = cmd.spawn().map_err(|source| TransportError::Spawn {
            program: "ssh".to_string(),
            source,
        })?;
        Ok(Self {
            child: Mutex::new(Some(child)),
        })
    }

    /// Whether the tunnel child is still running.
    pub fn is_alive(&self) -> bool {
        match self.child.lock().as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Signal the tunnel child to stop without waiting for it.
    pub fn terminate(&self) -> Result<(), TransportError> {
        if let Some(child) = self.child.lock().as_mut() {
            child.start_kill().map_err(|source| TransportError::Io {
                context: "killing tunnel".to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Kill the tunnel child and wait for it to exit. Idempotent.
    pub async fn shutdown(&self) {
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

fn ssh_args(options: &SshOptions) -> Vec<String> {
    let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
    if let Some(seconds) = options.connect_timeout {
        args.push("-o".to_string());
        args.push(format!("ConnectTimeout={}", seconds));
    }
    if let Some(port) = options.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    if let Some(identity) = &options.identity_file {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }
    if let Some(config) = &options.config_file {
        args.push("-F".to_string());
        args.push(config.display().to_string());
    }
    for option in &options.extra_options {
        args.push("-o".to_string());
        args.push(option.clone());
    }
    args
}

#[cfg(test)]
#[path = "tunnel_tests.rs"]
mod tests;
