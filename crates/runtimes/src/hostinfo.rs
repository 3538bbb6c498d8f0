// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote host information probe.
//!
//! A small python3 script is shipped into the working directory and
//! executed; it prints one JSON object with the host's OS, the
//! cgroup-aware cpu/memory figures, the interpreter version, an
//! optional workspace version and the GPU product names parsed from
//! `nvidia-smi -q`.

use serde::{Deserialize, Serialize};

use lc_core::LazyError;

use crate::runtime::Runtime;
use crate::task::{ExecuteOptions, Task};

/// The probe routine executed on the host.
const PROBE_SCRIPT: &str = include_str!("../assets/host_info.py");
const PROBE_FILE_NAME: &str = "lazy_host_info.py";

/// Facts about one host, as reported by the probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub os: String,
    pub cpu_cores: u32,
    /// Total memory in bytes (or the cgroup limit, if smaller).
    pub memory: u64,
    pub python_version: String,
    pub workspace_version: Option<String>,
    pub gpus: Vec<String>,
}

impl HostInfo {
    pub fn memory_in_mb(&self) -> u64 {
        self.memory / 1024 / 1024
    }

    pub fn gpu_count(&self) -> usize {
        self.gpus.len()
    }
}

/// Upload and run the probe on `runtime`, returning the parsed info.
pub(crate) async fn read(runtime: &Runtime) -> Result<HostInfo, LazyError> {
    tracing::debug!(host = %runtime.host(), "reading host information");

    let staging = tempfile::tempdir()
        .map_err(|e| LazyError::other_with_cause("cannot create probe staging directory", e))?;
    let script_path = staging.path().join(PROBE_FILE_NAME);
    std::fs::write(&script_path, PROBE_SCRIPT)
        .map_err(|e| LazyError::other_with_cause("cannot write probe script", e))?;

    let task = Task::new("get-host-info");
    task.send_file(&script_path, Some(&format!("./{}", PROBE_FILE_NAME)))?;
    task.run_command(format!("python3 ./{}", PROBE_FILE_NAME))?;
    task.run_command(format!("rm ./{}", PROBE_FILE_NAME))?;
    task.set_env_variables(runtime.env_variables());

    let connection = runtime.connection();
    let opts = ExecuteOptions {
        debug: false,
        log_root: runtime.environment().execution_log_dir(),
        working_dir: Some(runtime.working_dir().await?),
    };
    task.execute(connection.as_ref(), &opts).await?;

    let log = task.execution_log();
    let raw = log
        .get(1)
        .ok_or_else(|| LazyError::other("host info probe produced no output"))?;
    serde_json::from_str(raw.trim()).map_err(|e| {
        LazyError::other_with_cause(
            format!("malformed host info from {}", runtime.host()),
            e,
        )
    })
}

#[cfg(test)]
#[path = "hostinfo_tests.rs"]
mod tests;
