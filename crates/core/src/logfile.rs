// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-execution log files on the manager.
//!
//! Each task execution writes the captured remote output to
//! `<main>/execution_log/<host>/<task>_<yyyymmddhhmmss>.log`. The path
//! is fixed when the execution starts; the file is created lazily on
//! the first write and appended to afterwards.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;

/// Handle on one execution's log file.
#[derive(Debug, Clone)]
pub struct ExecutionLogFile {
    path: PathBuf,
}

impl ExecutionLogFile {
    /// Allocate a log file path for one execution of `task_name` on
    /// `host`. `log_root` is the `execution_log` directory of the
    /// manager's main directory.
    pub fn new(log_root: &Path, host: &str, task_name: &str) -> Self {
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        let file_name = format!("{}_{}.log", task_name, stamp);
        Self {
            path: log_root.join(host).join(file_name),
        }
    }

    /// The full path of the log file. The file itself only exists once
    /// something was written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file for appending, creating it and its directories on
    /// first use.
    pub fn open_append(&self) -> io::Result<File> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

#[cfg(test)]
#[path = "logfile_tests.rs"]
mod tests;
