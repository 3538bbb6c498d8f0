// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH client config as the host source.
//!
//! Runtimes are persisted as `Host` blocks in the user's ssh config;
//! discovery reads the same file back. Only concrete host entries
//! count, wildcard patterns are configuration, not machines.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use lc_core::LazyError;
use lc_runtimes::HostSource;

/// `~/.ssh/config`, the OpenSSH default.
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("cannot determine the home directory")?;
    Ok(home.join(".ssh").join("config"))
}

/// A parsed `user@host[:port]` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUri {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl ConnectionUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let (user, rest) = match uri.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => bail!("connection uri `{}` has an empty user", uri),
            None => (None, uri),
        };
        let (host, port) = match rest.split_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .with_context(|| format!("invalid port in connection uri `{}`", uri))?;
                (host, Some(port))
            }
            None => (rest, None),
        };
        if host.is_empty() {
            bail!("connection uri `{}` has an empty host", uri);
        }
        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

/// Hosts with a concrete `Host` entry in the config file.
pub fn list_hosts(config: &Path) -> Result<Vec<String>> {
    let contents = match fs::read_to_string(config) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("cannot read ssh config `{}`", config.display()))
        }
    };

    let mut hosts = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        let Some(patterns) = host_line_patterns(line) else {
            continue;
        };
        for pattern in patterns {
            if is_concrete_host(pattern) && !hosts.iter().any(|known| known == pattern) {
                hosts.push(pattern.to_string());
            }
        }
    }
    Ok(hosts)
}

/// Append a `Host` block for `name`.
pub fn add_entry(
    config: &Path,
    name: &str,
    uri: &ConnectionUri,
    id_file: Option<&Path>,
    options: &[String],
) -> Result<()> {
    if list_hosts(config)?.iter().any(|host| host == name) {
        bail!("host `{}` already exists in `{}`", name, config.display());
    }

    let mut block = String::new();
    let _ = writeln!(block, "Host {}", name);
    let _ = writeln!(block, "    HostName {}", uri.host);
    if let Some(user) = &uri.user {
        let _ = writeln!(block, "    User {}", user);
    }
    if let Some(port) = uri.port {
        let _ = writeln!(block, "    Port {}", port);
    }
    if let Some(id_file) = id_file {
        let _ = writeln!(block, "    IdentityFile {}", id_file.display());
    }
    for option in options {
        let _ = writeln!(block, "    {}", option);
    }

    if let Some(dir) = config.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create `{}`", dir.display()))?;
    }
    let mut contents = fs::read_to_string(config).unwrap_or_default();
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&block);
    fs::write(config, contents)
        .with_context(|| format!("cannot write ssh config `{}`", config.display()))?;
    Ok(())
}

/// Remove the `Host` block for `name`. Removing an absent entry is an
/// error so typos do not pass silently.
pub fn delete_entry(config: &Path, name: &str) -> Result<()> {
    let contents = fs::read_to_string(config)
        .with_context(|| format!("cannot read ssh config `{}`", config.display()))?;

    let mut kept = Vec::new();
    let mut removing = false;
    let mut removed = false;
    for line in contents.lines() {
        if let Some(patterns) = host_line_patterns(line.trim()) {
            removing = patterns.iter().any(|pattern| *pattern == name);
            if removing {
                removed = true;
                continue;
            }
        }
        if !removing {
            kept.push(line);
        }
    }
    if !removed {
        bail!("host `{}` not found in `{}`", name, config.display());
    }

    let mut updated = kept.join("\n");
    if !updated.is_empty() {
        updated.push('\n');
    }
    fs::write(config, updated)
        .with_context(|| format!("cannot write ssh config `{}`", config.display()))?;
    Ok(())
}

fn host_line_patterns(line: &str) -> Option<Vec<&str>> {
    let mut parts = line.split_whitespace();
    let keyword = parts.next()?;
    if !keyword.eq_ignore_ascii_case("host") {
        return None;
    }
    Some(parts.collect())
}

fn is_concrete_host(pattern: &str) -> bool {
    !pattern.is_empty() && !pattern.contains(['*', '?', '!'])
}

/// The user's ssh config as a [`HostSource`] for runtime discovery.
pub struct SshConfigSource {
    config: PathBuf,
}

impl SshConfigSource {
    pub fn new(config: PathBuf) -> Self {
        Self { config }
    }
}

impl HostSource for SshConfigSource {
    fn hosts(&self) -> Result<Vec<String>, LazyError> {
        list_hosts(&self.config)
            .map_err(|error| LazyError::other_with_cause("cannot read the ssh config", error))
    }
}

#[cfg(test)]
#[path = "ssh_config_tests.rs"]
mod tests;
