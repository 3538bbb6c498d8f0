// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host discovery and validated group construction.
//!
//! A [`HostSource`] yields candidate host names (the CLI feeds the
//! user's ssh config through this seam). The manager probes each
//! candidate, keeps the valid ones and remembers the rest as
//! inactive, and builds filtered [`RuntimeGroup`]s on request.

use std::sync::Arc;

use lc_core::{Environment, LazyError};
use lc_transport::LOCALHOST;

use crate::group::RuntimeGroup;
use crate::runtime::{Runtime, RuntimeFilter};

const LOOPBACK: &str = "127.0.0.1";

/// Yields candidate host names for discovery.
pub trait HostSource: Send + Sync {
    fn hosts(&self) -> Result<Vec<String>, LazyError>;
}

/// A fixed host list as a source.
pub struct StaticHostSource {
    hosts: Vec<String>,
}

impl StaticHostSource {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

impl HostSource for StaticHostSource {
    fn hosts(&self) -> Result<Vec<String>, LazyError> {
        Ok(self.hosts.clone())
    }
}

/// Restrictions applied when building a group from detected runtimes.
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    /// Only these hosts. Mutually exclusive with `exclude_hosts`.
    pub include_hosts: Option<Vec<String>>,
    /// All detected hosts but these.
    pub exclude_hosts: Option<Vec<String>>,
    /// Capability criteria each runtime must pass.
    pub filter: RuntimeFilter,
    /// Working directory to set on every selected runtime.
    pub working_dir: Option<String>,
}

/// Discovers and validates runtimes from a host source.
pub struct RuntimeManager {
    group: RuntimeGroup,
    inactive_hosts: Vec<String>,
}

impl RuntimeManager {
    /// Probe every candidate host and keep the valid runtimes.
    ///
    /// Hosts that fail the validity probe are collected as inactive.
    /// `localhost` and `127.0.0.1` count as the same host.
    pub async fn discover(
        source: &dyn HostSource,
        environment: Environment,
    ) -> Result<Self, LazyError> {
        tracing::debug!("looking for runtimes from the host source");
        let mut runtimes: Vec<Arc<Runtime>> = Vec::new();
        let mut inactive_hosts = Vec::new();

        for host in source.hosts()? {
            let seen: Vec<String> = runtimes
                .iter()
                .map(|runtime| runtime.host().to_string())
                .collect();
            if is_duplicate_host(&host, &seen) {
                continue;
            }
            tracing::debug!(%host, "trying to instantiate host as a runtime");
            match Runtime::new(host.clone(), environment.clone()).await {
                Ok(runtime) => {
                    tracing::info!(%host, "detected as valid runtime");
                    runtimes.push(Arc::new(runtime));
                }
                Err(LazyError::InvalidRuntime { .. }) => {
                    tracing::debug!(%host, "host could not be instantiated as a valid runtime");
                    inactive_hosts.push(host);
                }
                Err(error) => return Err(error),
            }
        }

        let count = runtimes.len();
        let group = RuntimeGroup::new(runtimes).map_err(|error| {
            LazyError::NoRuntimesDetected {
                cause: Some(error.to_string()),
            }
        })?;
        tracing::info!(count, "runtime manager detected valid runtimes");
        Ok(Self {
            group,
            inactive_hosts,
        })
    }

    /// Build a manager around already constructed runtimes. Test seam.
    #[cfg(any(test, feature = "test-support"))]
    pub fn from_runtimes(
        runtimes: Vec<Arc<Runtime>>,
        inactive_hosts: Vec<String>,
    ) -> Result<Self, LazyError> {
        Ok(Self {
            group: RuntimeGroup::new(runtimes)?,
            inactive_hosts,
        })
    }

    /// The detected runtimes.
    pub fn group(&self) -> &RuntimeGroup {
        &self.group
    }

    /// Hosts that were yielded by the source but failed validation.
    pub fn inactive_hosts(&self) -> &[String] {
        &self.inactive_hosts
    }

    /// Create a group with all detected runtimes or a filtered subset.
    pub async fn create_group(&self, filter: GroupFilter) -> Result<RuntimeGroup, LazyError> {
        tracing::info!("runtime manager starts building a group");
        let candidates = self.group.get_runtimes(
            filter.include_hosts.as_deref(),
            filter.exclude_hosts.as_deref(),
        )?;

        let selected: Vec<Arc<Runtime>> = if filter.filter.is_empty() {
            candidates.values().cloned().collect()
        } else {
            tracing::info!("evaluating the given filter criteria");
            if filter.filter.needs_info() {
                self.group.fill_runtime_info_buffers_async().await;
            }
            let mut passed = Vec::new();
            for runtime in candidates.values() {
                if runtime.check_filter(&filter.filter).await? {
                    passed.push(Arc::clone(runtime));
                }
            }
            passed
        };

        if let Some(dir) = &filter.working_dir {
            for runtime in &selected {
                runtime.set_working_dir(dir).await?;
            }
        }

        let group = RuntimeGroup::new(selected).map_err(|error| {
            LazyError::NoRuntimesDetected {
                cause: Some(error.to_string()),
            }
        })?;
        tracing::info!(count = group.runtime_count(), "runtime group created");
        Ok(group)
    }

    /// Print detected hosts and the inactive ones.
    pub fn print_hosts(&self) {
        println!(
            "{} runtime(s) and {} inactive host(s) detected:",
            self.group.runtime_count(),
            self.inactive_hosts.len()
        );
        self.group.print_hosts();
        self.print_inactive_hosts();
    }

    /// Print detailed info of detected runtimes and the inactive
    /// hosts.
    pub async fn print_runtime_info(&self) {
        println!(
            "{} runtime(s) and {} inactive host(s) detected:",
            self.group.runtime_count(),
            self.inactive_hosts.len()
        );
        self.group.print_runtime_info().await;
        self.print_inactive_hosts();
    }

    pub fn print_inactive_hosts(&self) {
        for host in &self.inactive_hosts {
            println!("{} (inactive)", host);
        }
    }
}

/// `localhost` and `127.0.0.1` are the same machine; a host already
/// seen is a duplicate either way.
fn is_duplicate_host(host: &str, seen: &[String]) -> bool {
    if seen.iter().any(|existing| existing == host) {
        return true;
    }
    (host == LOCALHOST && seen.iter().any(|existing| existing == LOOPBACK))
        || (host == LOOPBACK && seen.iter().any(|existing| existing == LOCALHOST))
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
