// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local TCP port probing.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Check whether `port` is free on the manager.
///
/// "Free" means a TCP connect to `127.0.0.1:port` is refused. The
/// probe is optimistic: a racing binder can still grab the port right
/// after the check.
pub fn localhost_has_free_port(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_err()
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
