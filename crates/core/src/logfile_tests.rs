// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

use super::*;

#[test]
fn path_nests_host_under_log_root() {
    let root = Path::new("/var/tmp/lazycluster/execution_log");
    let log = ExecutionLogFile::new(root, "host-1", "deploy");
    let path = log.path();
    assert!(path.starts_with(root.join("host-1")));
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("deploy_"));
    assert!(name.ends_with(".log"));
    // timestamp is a fixed-width yyyymmddhhmmss
    assert_eq!(name.len(), "deploy_".len() + 14 + ".log".len());
}

#[test]
fn open_append_creates_directories_and_appends() {
    let tmp = tempfile::tempdir().unwrap();
    let log = ExecutionLogFile::new(tmp.path(), "host-1", "deploy");

    writeln!(log.open_append().unwrap(), "first").unwrap();
    writeln!(log.open_append().unwrap(), "second").unwrap();

    let contents = std::fs::read_to_string(log.path()).unwrap();
    assert_eq!(contents, "first\nsecond\n");
}
