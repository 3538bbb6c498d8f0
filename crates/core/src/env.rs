// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager-local directory context.
//!
//! The original library kept the main directory in process-global
//! state; here it is an explicit value handed to whoever needs to
//! place files on the manager (execution logs, the mongodb data dir).

use std::path::{Path, PathBuf};

/// Name of the directory collecting per-host execution log files.
const EXECUTION_LOG_DIR: &str = "execution_log";

/// Manager-side context: where lazycluster keeps its local files.
#[derive(Debug, Clone)]
pub struct Environment {
    main_directory: PathBuf,
}

impl Environment {
    /// Create a context rooted at `dir`. A relative path is resolved
    /// against the current working directory.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            main_directory: absolutize(dir.as_ref()),
        }
    }

    /// The main directory on the manager.
    pub fn main_directory(&self) -> &Path {
        &self.main_directory
    }

    /// Directory collecting execution log files, one subdirectory per
    /// host.
    pub fn execution_log_dir(&self) -> PathBuf {
        self.main_directory.join(EXECUTION_LOG_DIR)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new("./lazycluster")
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
