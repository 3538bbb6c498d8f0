// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport-level failures.

use lc_core::LazyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The local `ssh`/`scp`/`sh` process could not be launched.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Reading process output or touching the filesystem failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    /// A file transfer process exited non-zero.
    #[error("{program} exited with status {code}: {detail}")]
    TransferFailed {
        program: String,
        code: i32,
        detail: String,
    },

    /// The command did not finish within the given timeout.
    #[error("command timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl TransportError {
    /// Attach the host this transport was talking to and lift into the
    /// shared taxonomy.
    pub fn into_lazy(self, host: &str) -> LazyError {
        LazyError::Connection {
            host: host.to_string(),
            message: self.to_string(),
        }
    }
}
