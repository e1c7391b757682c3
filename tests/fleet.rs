//! Several devices running side by side under one fleet.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::{Behavior, FakeServer, ServerEvent};
use gps_tracker_simulator::gps_simulator::fleet::Fleet;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;

const DEVICE_A: &str = "356307000000001";
const DEVICE_B: &str = "356307000000002";
const DEVICE_C: &str = "356307000000003";

/// A device whose handshake keeps failing does not slow the others down.
#[tokio::test]
async fn failing_device_does_not_affect_others() {
    let mut server = FakeServer::spawn(|identity, _| {
        if identity == DEVICE_B {
            Behavior::RejectAck(0x00)
        } else {
            Behavior::Accept
        }
    })
    .await;

    let mut config = server.config();
    config.devices = 3;
    config.identities = vec![DEVICE_A.into(), DEVICE_B.into(), DEVICE_C.into()];
    config.report_interval_ms = 50;
    config.reconnect_delay_ms = 100;
    let fleet = Fleet::from_config(&config).unwrap();

    let started = Instant::now();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(fleet.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(800)).await;
    shutdown_tx.send(true).unwrap();
    let stats = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("fleet did not stop")
        .unwrap();

    let mut first_report = HashMap::new();
    let mut reports = HashMap::<String, usize>::new();
    for event in server.drain() {
        match event {
            ServerEvent::Report { identity, at, .. } => {
                first_report.entry(identity.clone()).or_insert(at);
                *reports.entry(identity).or_default() += 1;
            }
            ServerEvent::UnexpectedBytes { identity, len } => {
                panic!("{identity} sent {len} bytes after a rejected handshake")
            }
            ServerEvent::Handshake { .. } => {}
        }
    }

    assert!(!reports.contains_key(DEVICE_B));
    for identity in [DEVICE_A, DEVICE_C] {
        assert!(reports[identity] >= 4, "{identity} sent {}", reports[identity]);
        assert!(first_report[identity].duration_since(started) < Duration::from_millis(500));
    }

    let by_identity: HashMap<_, _> = stats.iter().map(|s| (s.identity.as_str(), s)).collect();
    assert_eq!(by_identity.len(), 3);
    assert_eq!(by_identity[DEVICE_B].reports_sent, 0);
    assert!(by_identity[DEVICE_B].protocol_errors >= 2);
    assert_eq!(by_identity[DEVICE_A].protocol_errors, 0);
    assert_eq!(by_identity[DEVICE_C].connection_errors, 0);
}

/// Shutdown interrupts sessions mid-sleep instead of waiting out the interval.
#[tokio::test]
async fn shutdown_interrupts_long_interval() {
    let mut server = FakeServer::spawn(|_, _| Behavior::Accept).await;

    let mut config = server.config();
    config.devices = 2;
    config.report_interval_ms = 60_000;
    let fleet = Fleet::from_config(&config).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(fleet.run(shutdown_rx));

    let mut reports = 0;
    while reports < 2 {
        match server.next_event(Duration::from_secs(5)).await {
            Some(ServerEvent::Report { .. }) => reports += 1,
            Some(_) => {}
            None => panic!("devices never reported"),
        }
    }

    shutdown_tx.send(true).unwrap();
    let stats = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("fleet did not stop")
        .unwrap();
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.reports_sent == 1));
}

/// Refused connections are retried with the constant backoff.
#[tokio::test]
async fn refused_connection_is_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = gps_tracker_simulator::config::SimulatorConfig {
        server_address: addr.to_string(),
        devices: 1,
        reconnect_delay_ms: 50,
        log_stdout: false,
        ..Default::default()
    };
    let fleet = Fleet::from_config(&config).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(fleet.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(400)).await;
    shutdown_tx.send(true).unwrap();
    let stats = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("fleet did not stop")
        .unwrap();

    assert!(stats[0].sessions >= 3);
    // shutdown may cancel the attempt in flight before it records an error
    assert!(stats[0].connection_errors + 1 >= stats[0].sessions);
    assert_eq!(stats[0].handshakes, 0);
}
