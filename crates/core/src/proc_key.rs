// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured keys identifying manager-side child processes.
//!
//! Every process a `Runtime` spawns is registered under a
//! delimiter-joined key `host :: kind :: a :: b`. The key is the sole
//! identity used to classify processes during cleanup, so its layout
//! must stay stable.

/// Delimiter between key segments.
pub const KEY_DELIMITER: &str = "::";

/// Kind segment for task-execution processes.
pub const TASK_KIND: &str = "task";

/// Direction of an SSH port forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardKind {
    /// `-L`: a runtime port is made reachable on the manager.
    FromRuntime,
    /// `-R`: a manager port is made reachable on the runtime.
    ToRuntime,
}

impl ForwardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardKind::FromRuntime => "-L",
            ForwardKind::ToRuntime => "-R",
        }
    }
}

/// Key for a process executing a task.
pub fn task_key(host: &str, task_name: &str) -> String {
    [host, TASK_KIND, task_name].join(KEY_DELIMITER)
}

/// Key for a process keeping an SSH tunnel alive.
pub fn exposure_key(host: &str, kind: ForwardKind, runtime_port: u16, local_port: u16) -> String {
    [
        host,
        kind.as_str(),
        &runtime_port.to_string(),
        &local_port.to_string(),
    ]
    .join(KEY_DELIMITER)
}

/// True if the key belongs to a process executing a task.
pub fn is_task_process(key: &str) -> bool {
    kind_segment(key) == Some(TASK_KIND)
}

/// True if the key belongs to a process keeping an SSH tunnel alive.
pub fn is_port_exposure_process(key: &str) -> bool {
    matches!(
        kind_segment(key),
        Some(kind) if kind == ForwardKind::FromRuntime.as_str()
            || kind == ForwardKind::ToRuntime.as_str()
    )
}

fn kind_segment(key: &str) -> Option<&str> {
    key.split(KEY_DELIMITER).nth(1)
}

#[cfg(test)]
#[path = "proc_key_tests.rs"]
mod tests;
