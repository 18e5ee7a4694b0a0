//! UDP listener tests on a loopback socket.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use radarops_core::parser::binary_frame;
use radarops_events::event_types;
use radarops_ingest::{IngestConfig, IngestError, IngestStats, UdpListener};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use common::{pipeline_with, MemoryStore};

fn loopback_config() -> IngestConfig {
    IngestConfig {
        udp_bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..IngestConfig::default()
    }
}

/// Poll until `done` holds or the deadline passes.
async fn wait_for(stats: &IngestStats, done: impl Fn(&radarops_ingest::StatsSnapshot) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if done(&stats.snapshot()) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for stats: {:?}",
            stats.snapshot()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn receives_processes_and_shuts_down() {
    let store = Arc::new(MemoryStore::default());
    let (pipeline, bus) = pipeline_with(&store, &loopback_config());
    let mut events = bus.subscribe();

    let listener = UdpListener::bind(&loopback_config(), Arc::clone(&pipeline))
        .await
        .unwrap();
    let addr = listener.local_addr();
    assert_ne!(addr.port(), 0);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(listener.run(cancel.clone()));

    let started = events.recv().await.unwrap();
    assert_eq!(started.event_type, event_types::LISTENER_STARTED);
    assert!(pipeline.stats().is_listening());

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&binary_frame(10, 70), addr).await.unwrap();
    client
        .send_to(b"ID: 2,Speed: 25, Time: 11:32:15.", addr)
        .await
        .unwrap();
    client.send_to(b"not a reading", addr).await.unwrap();

    wait_for(pipeline.stats(), |s| s.readings_saved == 2 && s.errors == 1).await;

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener should stop")
        .unwrap();
    assert!(result.is_ok());

    let stats = pipeline.stats().snapshot();
    assert_eq!(stats.messages_received, 3);
    assert_eq!(stats.violations_detected, 1);
    assert_eq!(stats.fines_created, 1);
    assert!(!stats.listening);
    assert_eq!(store.readings().len(), 2);
}

#[tokio::test]
async fn full_queue_drops_and_counts_overflow() {
    let store = Arc::new(MemoryStore::gated());
    let config = IngestConfig {
        queue_capacity: 1,
        workers: 1,
        ..loopback_config()
    };
    let (pipeline, _bus) = pipeline_with(&store, &config);

    let listener = UdpListener::bind(&config, Arc::clone(&pipeline)).await.unwrap();
    let addr = listener.local_addr();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(listener.run(cancel.clone()));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let sent = 8;
    for speed in 0..sent {
        client
            .send_to(&binary_frame(1, 20 + speed), addr)
            .await
            .unwrap();
    }

    // One datagram is blocked in the store, one waits for a worker permit
    // and one sits in the queue; the rest overflow.
    wait_for(pipeline.stats(), |s| s.messages_received == u64::from(sent)).await;
    let overflowed = pipeline.stats().snapshot().queue_overflows;
    assert!(overflowed >= 1, "expected overflow, got {overflowed}");

    store.open_gate();
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener should drain and stop")
        .unwrap()
        .unwrap();

    // Everything that was queued was processed before shutdown completed.
    let stats = pipeline.stats().snapshot();
    assert_eq!(stats.readings_saved + stats.queue_overflows, u64::from(sent));
    assert_eq!(stats.errors, stats.queue_overflows);
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let store = Arc::new(MemoryStore::default());
    let occupied = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let config = IngestConfig {
        udp_bind_addr: occupied.local_addr().unwrap(),
        ..IngestConfig::default()
    };
    let (pipeline, _bus) = pipeline_with(&store, &config);

    let err = UdpListener::bind(&config, pipeline).await.err().unwrap();
    assert_matches!(err, IngestError::Bind { .. });
}
