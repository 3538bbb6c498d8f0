// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::TcpListener;
use std::sync::Arc;

use lc_runtimes::Runtime;

use super::*;

struct FakeMasterLauncher {
    port: Mutex<Option<u16>>,
    record_port: bool,
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl FakeMasterLauncher {
    fn new(record_port: bool, events: Arc<Mutex<Vec<&'static str>>>) -> Self {
        Self {
            port: Mutex::new(None),
            record_port,
            events,
        }
    }
}

#[async_trait::async_trait]
impl MasterLauncher for FakeMasterLauncher {
    fn port(&self) -> Option<u16> {
        *self.port.lock()
    }

    fn has_process(&self) -> bool {
        false
    }

    async fn start(
        &self,
        ports: PortSpec,
        _timeout: std::time::Duration,
        _debug: bool,
    ) -> Result<Vec<u16>, LazyError> {
        let remaining = match &ports {
            PortSpec::Port(port) => {
                if self.record_port {
                    *self.port.lock() = Some(*port);
                }
                Vec::new()
            }
            PortSpec::Pool(pool) => {
                if self.record_port {
                    *self.port.lock() = pool.first().copied();
                }
                pool[1..].to_vec()
            }
        };
        Ok(remaining)
    }

    async fn cleanup(&self) {
        self.events.lock().push("master");
    }
}

struct FakeWorkerLauncher {
    seen: Arc<Mutex<Vec<(usize, u16, Vec<u16>)>>>,
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl FakeWorkerLauncher {
    fn new(events: Arc<Mutex<Vec<&'static str>>>) -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            events,
        }
    }

    fn with_recorder(
        events: Arc<Mutex<Vec<&'static str>>>,
        seen: Arc<Mutex<Vec<(usize, u16, Vec<u16>)>>>,
    ) -> Self {
        Self { seen, events }
    }
}

#[async_trait::async_trait]
impl WorkerLauncher for FakeWorkerLauncher {
    fn ports_per_host(&self) -> std::collections::HashMap<String, Vec<u16>> {
        std::collections::HashMap::new()
    }

    async fn start(
        &self,
        worker_count: usize,
        master_port: u16,
        ports: Vec<u16>,
        _debug: bool,
    ) -> Result<Vec<u16>, LazyError> {
        let remaining = ports[1..].to_vec();
        self.seen.lock().push((worker_count, master_port, ports));
        Ok(remaining)
    }

    async fn cleanup(&self) {
        self.events.lock().push("workers");
    }
}

fn fake_group(tmp: &tempfile::TempDir) -> Arc<RuntimeGroup> {
    let make = |host: &str| {
        let runtime =
            Runtime::unvalidated(host, lc_core::Environment::new(tmp.path().join("main")));
        runtime.use_local_transport();
        Arc::new(runtime)
    };
    Arc::new(RuntimeGroup::new(vec![make("host-a"), make("host-b")]).unwrap())
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

struct Fixture {
    cluster: MasterWorkerCluster,
    events: Arc<Mutex<Vec<&'static str>>>,
}

fn fixture(tmp: &tempfile::TempDir, default_port: u16, pool: Vec<u16>, record_port: bool) -> Fixture {
    let events = Arc::new(Mutex::new(Vec::new()));
    let cluster = MasterWorkerCluster::new(
        fake_group(tmp),
        Some(pool),
        default_port,
        Box::new(FakeMasterLauncher::new(record_port, Arc::clone(&events))),
        Box::new(FakeWorkerLauncher::new(Arc::clone(&events))),
    );
    Fixture { cluster, events }
}

#[tokio::test]
async fn explicit_master_port_is_passed_through() {
    let tmp = tempfile::tempdir().unwrap();
    let f = fixture(&tmp, free_port(), vec![60001, 60002], true);

    f.cluster
        .start_master(Some(61000), DEFAULT_MASTER_START_TIMEOUT, false)
        .await
        .unwrap();
    assert_eq!(f.cluster.master_port(), Some(61000));
    // An explicit port leaves the pool untouched.
    assert_eq!(f.cluster.remaining_ports(), vec![60001, 60002]);
}

#[tokio::test]
async fn free_default_master_port_is_preferred() {
    let tmp = tempfile::tempdir().unwrap();
    let default_port = free_port();
    let f = fixture(&tmp, default_port, vec![60001, 60002], true);

    f.cluster
        .start_master(None, DEFAULT_MASTER_START_TIMEOUT, false)
        .await
        .unwrap();
    assert_eq!(f.cluster.master_port(), Some(default_port));
    assert_eq!(f.cluster.remaining_ports(), vec![60001, 60002]);
}

#[tokio::test]
async fn busy_default_master_port_falls_back_to_the_pool() {
    let tmp = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let busy_port = listener.local_addr().unwrap().port();
    let f = fixture(&tmp, busy_port, vec![60001, 60002, 60003], true);

    f.cluster
        .start_master(None, DEFAULT_MASTER_START_TIMEOUT, false)
        .await
        .unwrap();
    assert_eq!(f.cluster.master_port(), Some(60001));
    // The launcher consumed the first pool port.
    assert_eq!(f.cluster.remaining_ports(), vec![60002, 60003]);
}

#[tokio::test]
async fn master_launcher_must_record_the_port() {
    let tmp = tempfile::tempdir().unwrap();
    let f = fixture(&tmp, free_port(), vec![60001], false);

    let err = f
        .cluster
        .start_master(Some(61000), DEFAULT_MASTER_START_TIMEOUT, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("did not record the master port"));
}

#[tokio::test]
async fn workers_cannot_start_before_the_master() {
    let tmp = tempfile::tempdir().unwrap();
    let f = fixture(&tmp, free_port(), vec![60001], true);
    let err = f.cluster.start_workers(None, false).await.unwrap_err();
    assert!(err.to_string().contains("before the master"));
}

#[tokio::test]
async fn start_runs_master_then_workers_and_shrinks_the_pool() {
    let tmp = tempfile::tempdir().unwrap();
    let f = fixture(&tmp, free_port(), vec![60001, 60002, 60003], true);

    f.cluster.start(Some(4), Some(61000), false).await.unwrap();

    // Worker count was explicit; with None it would default to the
    // group size.
    assert_eq!(f.cluster.master_port(), Some(61000));
    assert_eq!(f.cluster.remaining_ports(), vec![60002, 60003]);
}

#[tokio::test]
async fn default_worker_count_is_the_group_size() {
    let tmp = tempfile::tempdir().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let cluster = MasterWorkerCluster::new(
        fake_group(&tmp),
        Some(vec![60001, 60002]),
        free_port(),
        Box::new(FakeMasterLauncher::new(true, Arc::clone(&events))),
        Box::new(FakeWorkerLauncher::with_recorder(
            Arc::clone(&events),
            Arc::clone(&seen),
        )),
    );

    cluster.start(None, Some(61000), false).await.unwrap();
    assert_eq!(*seen.lock(), vec![(2, 61000, vec![60001, 60002])]);
}

#[tokio::test]
async fn cleanup_stops_workers_before_the_master() {
    let tmp = tempfile::tempdir().unwrap();
    let f = fixture(&tmp, free_port(), vec![60001], true);
    f.cluster.cleanup().await;
    assert_eq!(*f.events.lock(), vec!["workers", "master"]);
}
