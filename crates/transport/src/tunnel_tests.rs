// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn ssh_args_carry_the_options() {
    let options = SshOptions {
        port: Some(2222),
        extra_options: vec!["ServerAliveInterval=30".to_string()],
        ..SshOptions::default()
    };
    let args = ssh_args(&options);
    assert!(args.windows(2).any(|w| w == ["-o", "BatchMode=yes"]));
    assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
    assert!(args.windows(2).any(|w| w == ["-o", "ServerAliveInterval=30"]));
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    if std::process::Command::new("ssh").arg("-V").output().is_err() {
        eprintln!("skipping: no ssh client available");
        return;
    }
    // A tunnel to an unroutable host never connects but the child
    // still spawns; shutdown must reap it either way.
    let options = SshOptions {
        connect_timeout: Some(1),
        ..SshOptions::default()
    };
    let tunnel =
        TunnelProcess::local_forward("invalid.example.invalid", &options, 5800, 5800).unwrap();
    tunnel.shutdown().await;
    assert!(!tunnel.is_alive());
    tunnel.shutdown().await;
}
