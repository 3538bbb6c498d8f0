// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn short_id_has_fixed_length() {
    assert_eq!(short_id().len(), 8);
}

#[test]
fn short_ids_differ() {
    assert_ne!(short_id(), short_id());
}
