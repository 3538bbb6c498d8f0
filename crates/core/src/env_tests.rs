// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn relative_main_directory_is_absolutized() {
    let env = Environment::new("./lazycluster");
    assert!(env.main_directory().is_absolute());
    assert!(env.main_directory().ends_with("lazycluster"));
}

#[test]
fn absolute_main_directory_is_kept() {
    let env = Environment::new("/var/tmp/lazycluster");
    assert_eq!(
        env.main_directory(),
        Path::new("/var/tmp/lazycluster")
    );
}

#[test]
fn execution_log_dir_is_nested_under_main() {
    let env = Environment::new("/var/tmp/lazycluster");
    assert_eq!(
        env.execution_log_dir(),
        PathBuf::from("/var/tmp/lazycluster/execution_log")
    );
}

#[test]
fn default_points_at_cwd_lazycluster() {
    let env = Environment::default();
    assert!(env.main_directory().ends_with("lazycluster"));
}
