// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lazycluster add-runtime` / `delete-runtime` / `list-runtimes`

use std::path::PathBuf;

use anyhow::Result;

use lc_core::{Environment, LazyError};
use lc_runtimes::RuntimeManager;

use crate::ssh_config::{self, ConnectionUri, SshConfigSource};

/// Persist an SSH config entry for a new runtime.
pub fn add(
    name: &str,
    connection_uri: &str,
    id_file: Option<PathBuf>,
    options: &[String],
    config: Option<PathBuf>,
) -> Result<()> {
    let config = resolve_config(config)?;
    let uri = ConnectionUri::parse(connection_uri)?;
    ssh_config::add_entry(&config, name, &uri, id_file.as_deref(), options)?;
    println!("Runtime {} added to {}.", name, config.display());
    Ok(())
}

/// Delete a runtime's SSH config entry and any remote kernel
/// registered for it.
pub async fn delete(name: &str, config: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config)?;
    ssh_config::delete_entry(&config, name)?;

    // Best effort: drop a leftover remote kernel spec for this host.
    let kernel_name = format!("rik_ssh_{}_py36", name.replace('-', "_"));
    let cleanup = tokio::process::Command::new("remote_ikernel")
        .args(["manage", "--delete", &kernel_name])
        .output()
        .await;
    if let Err(error) = cleanup {
        tracing::debug!(%kernel_name, %error, "no remote kernel removed");
    }

    println!("Runtime successfully deleted.");
    Ok(())
}

/// Discover valid runtimes from the ssh config and print them.
pub async fn list(long: bool) -> Result<()> {
    let source = SshConfigSource::new(resolve_config(None)?);
    let manager = match RuntimeManager::discover(&source, Environment::default()).await {
        Ok(manager) => manager,
        Err(LazyError::NoRuntimesDetected { .. }) => {
            println!("\nNo runtimes detected!\n");
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    if long {
        manager.print_runtime_info().await;
    } else {
        // Printing only the hosts skips the per-host info probes.
        manager.print_hosts();
    }
    Ok(())
}

fn resolve_config(config: Option<PathBuf>) -> Result<PathBuf> {
    match config {
        Some(path) => Ok(path),
        None => ssh_config::default_config_path(),
    }
}
