// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers.

use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::connection::{CommandResult, OutputFn};
use crate::error::TransportError;

/// Default timeout for short administrative commands (probes,
/// directory management).
pub const ADMIN_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for file transfers.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

/// Run a command to completion with a timeout, capturing its output.
///
/// The child is killed automatically if the timeout elapses (via the
/// tokio `Child` drop implementation).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    program: &str,
) -> Result<Output, TransportError> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(TransportError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_elapsed) => Err(TransportError::Timeout {
            seconds: timeout.as_secs(),
        }),
    }
}

/// Run a command while streaming every output line to `on_output`,
/// returning the accumulated output and the exit code.
///
/// stdout and stderr are drained concurrently; lines from both feed
/// the same accumulator so the captured result reads like a terminal
/// session.
pub async fn stream_command(
    mut cmd: Command,
    timeout: Option<Duration>,
    program: &str,
    on_output: Option<&OutputFn>,
) -> Result<CommandResult, TransportError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let accumulated = Arc::new(Mutex::new(String::new()));

    let wait = async {
        tokio::join!(
            drain(stdout, Arc::clone(&accumulated), on_output),
            drain(stderr, Arc::clone(&accumulated), on_output),
        );
        child.wait().await
    };

    let status = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| TransportError::Timeout {
                seconds: timeout.as_secs(),
            })?,
        None => wait.await,
    }
    .map_err(|source| TransportError::Io {
        context: format!("waiting for {}", program),
        source,
    })?;

    let output = accumulated.lock().clone();
    Ok(CommandResult {
        output,
        exit_code: status.code().unwrap_or(-1),
    })
}

async fn drain<R>(reader: Option<R>, accumulated: Arc<Mutex<String>>, on_output: Option<&OutputFn>)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else { return };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        // A pty terminates lines with \r\n.
        let line = line.trim_end_matches('\r');
        {
            let mut buf = accumulated.lock();
            buf.push_str(line);
            buf.push('\n');
        }
        if let Some(cb) = on_output {
            cb(line);
        }
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
