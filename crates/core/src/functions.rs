// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote-function registry and transport payloads.
//!
//! Rust closures cannot be serialized across process boundaries, so
//! function steps ship a *named-function payload* instead: a JSON file
//! naming a function registered in this process plus its kwargs. The
//! remote side runs the manager's own executable (uploaded once per
//! working directory as the "function agent"), which re-enters
//! [`agent_guard`], looks the name up in the same registry and writes
//! the serialized return value next to the payload.
//!
//! Both ends therefore agree on the serialization format by running
//! the same binary, the same way both ends of the original agreed by
//! installing the same serializer library.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Env var carrying the payload path when the process runs as agent.
pub const PAYLOAD_ENV_VAR: &str = "LAZYCLUSTER_RUN_PAYLOAD";
/// Env var carrying the return-blob path when the process runs as agent.
pub const RETURN_ENV_VAR: &str = "LAZYCLUSTER_RUN_RETURN";

/// Path of the uploaded agent executable, relative to a runtime's
/// working directory.
pub const AGENT_RELATIVE_PATH: &str = ".lazycluster/agent";

/// Handler signature for a registered remote function.
pub type FunctionHandler = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

static REGISTRY: Lazy<RwLock<HashMap<String, FunctionHandler>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

// Program-global counter making artifact file names unique.
static FUNCTION_INDEX: AtomicU64 = AtomicU64::new(0);

/// Register a function under `name` so tasks can ship it to runtimes.
///
/// Registration must happen before the agent guard runs, i.e. early in
/// `main`, so the uploaded agent resolves the same name.
pub fn register<F>(name: impl Into<String>, handler: F)
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    REGISTRY.write().insert(name.into(), Arc::new(handler));
}

/// True if `name` was registered in this process.
pub fn is_registered(name: &str) -> bool {
    REGISTRY.read().contains_key(name)
}

/// Apply the registered function `name` to `kwargs`.
pub fn invoke(name: &str, kwargs: Value) -> Result<Value, String> {
    let handler = REGISTRY
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| format!("function `{}` is not registered", name))?;
    handler(kwargs)
}

/// The wire format of a function invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionPayload {
    pub function: String,
    pub kwargs: Value,
}

/// File names generated for one `run_function` registration.
///
/// Local and remote names differ so that running against a
/// `localhost` runtime cannot overwrite the manager-side files.
#[derive(Debug, Clone)]
pub struct ArtifactNames {
    /// Payload file name on the runtime.
    pub remote: String,
    /// Payload file name in the task's manager-local temp dir.
    pub local: String,
    /// Return-blob file name on the runtime.
    pub remote_return: String,
    /// Return-blob file name in the task's manager-local temp dir.
    pub local_return: String,
}

/// Generate a program-unique artifact name set for `function_name`.
pub fn artifact_names(function_name: &str) -> ArtifactNames {
    let index = FUNCTION_INDEX.fetch_add(1, Ordering::SeqCst) + 1;
    let remote = format!("{}{}.json", function_name, index);
    let local = format!("local_{}", remote);
    let local_return = format!("return_{}", remote);
    let remote_return = format!("remote_{}", local_return);
    ArtifactNames {
        remote,
        local,
        remote_return,
        local_return,
    }
}

/// Execute a payload file and write the return blob.
///
/// This is what the uploaded agent does on the runtime; it is also
/// directly usable for tests.
pub fn run_payload(payload_path: &str, return_path: &str) -> Result<(), String> {
    let raw = std::fs::read_to_string(payload_path)
        .map_err(|e| format!("cannot read payload `{}`: {}", payload_path, e))?;
    let payload: FunctionPayload =
        serde_json::from_str(&raw).map_err(|e| format!("malformed payload: {}", e))?;
    let result = invoke(&payload.function, payload.kwargs)?;
    let blob = serde_json::to_string(&result)
        .map_err(|e| format!("cannot serialize return value: {}", e))?;
    std::fs::write(return_path, blob)
        .map_err(|e| format!("cannot write return blob `{}`: {}", return_path, e))
}

/// Check whether this process was started as the function agent, and
/// if so execute the payload and exit.
///
/// Call this first thing in `main`, after registering all remote
/// functions. When the agent env vars are absent this is a no-op.
pub fn agent_guard() {
    let payload = std::env::var(PAYLOAD_ENV_VAR).ok();
    let ret = std::env::var(RETURN_ENV_VAR).ok();
    let (payload, ret) = match (payload, ret) {
        (Some(payload), Some(ret)) => (payload, ret),
        _ => return,
    };
    match run_payload(&payload, &ret) {
        Ok(()) => std::process::exit(0),
        Err(message) => {
            eprintln!("lazycluster agent: {}", message);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
#[path = "functions_tests.rs"]
mod tests;
