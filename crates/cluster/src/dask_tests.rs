// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::TcpListener;
use std::sync::Arc;

use lc_runtimes::Runtime;

use super::*;

fn fake_group(tmp: &tempfile::TempDir) -> Arc<RuntimeGroup> {
    let make = |host: &str| {
        let runtime =
            Runtime::unvalidated(host, lc_core::Environment::new(tmp.path().join("main")));
        runtime.use_local_transport();
        Arc::new(runtime)
    };
    Arc::new(RuntimeGroup::new(vec![make("host-a"), make("host-b")]).unwrap())
}

#[test]
fn worker_launch_command_wires_ports_and_directory() {
    assert_eq!(
        DaskRoundRobinWorkerLauncher::launch_command(8786, 60001, "/work"),
        "dask-worker --worker-port=60001 --local-directory=/work localhost:8786"
    );
}

#[test]
fn pip_install_command_targets_the_complete_extra() {
    assert_eq!(DASK_PIP_INSTALL_COMMAND, "pip install -q \"dask[complete]\"");
}

#[tokio::test]
async fn occupied_single_port_is_rejected_before_spawning() {
    let tmp = tempfile::tempdir().unwrap();
    let group = fake_group(&tmp);
    let launcher = LocalDaskMasterLauncher::new(Arc::clone(&group));

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let busy = listener.local_addr().unwrap().port();

    let err = launcher
        .start(PortSpec::Port(busy), DEFAULT_MASTER_START_TIMEOUT, false)
        .await
        .unwrap_err();
    assert!(matches!(err, LazyError::PortInUse { port, .. } if port == busy));
    assert!(launcher.port().is_none());
    assert!(!launcher.has_process());
}

#[test]
fn scheduler_address_requires_a_started_master() {
    let tmp = tempfile::tempdir().unwrap();
    let cluster = DaskCluster::new(fake_group(&tmp));
    assert!(cluster.master_port().is_none());
    assert!(cluster.scheduler_address().is_none());
}
