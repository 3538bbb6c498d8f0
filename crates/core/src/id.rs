// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short unique identifiers for default task names.

use uuid::Uuid;

/// An eight character identifier, unique enough to tell two unnamed
/// tasks apart in logs and process keys.
pub fn short_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
