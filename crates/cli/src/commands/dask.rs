// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lazycluster start-dask`

use std::sync::Arc;

use anyhow::{Context, Result};

use lc_cluster::DaskCluster;
use lc_core::Environment;
use lc_runtimes::{GroupFilter, RuntimeManager};

use crate::ssh_config::{self, SshConfigSource};

/// Start a Dask cluster on every detected runtime and block until
/// interrupted.
pub async fn start(debug: bool) -> Result<()> {
    let source = SshConfigSource::new(ssh_config::default_config_path()?);
    let manager = RuntimeManager::discover(&source, Environment::default()).await?;
    let group = Arc::new(manager.create_group(GroupFilter::default()).await?);

    let cluster = DaskCluster::new(group);
    cluster.start(None, None, debug).await?;
    println!(
        "Dask cluster running, scheduler at {}. Press Ctrl-C to shut down.",
        cluster
            .scheduler_address()
            .unwrap_or_else(|| "localhost".to_string())
    );

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for the shutdown signal")?;
    cluster.cleanup().await;
    Ok(())
}
