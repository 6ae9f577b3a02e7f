//! End-to-end tests: real sockets on 127.0.0.1, in-memory collaborators.

mod common;

use common::*;
use fleetgate_core::Protocol;
use fleetgate_network::{DispatchMode, ListenerConfig, ServerError, ServerManager};
use fleetgate_protocol::{ACK, ChecksumPolicy, NACK, RuptelaConfig};
use fleetgate_storage::MemorySink;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[rstest]
#[case::pooled(DispatchMode::Pooled)]
#[case::per_connection(DispatchMode::PerConnection)]
#[tokio::test]
async fn test_binary_report_is_acked_and_persisted(#[case] dispatch: DispatchMode) {
    let sink = MemorySink::new();
    let (mut listener, addr) = start(Protocol::Ruptela, dispatch, pipeline(&sink)).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&packet(TEST_IMEI, &[record(TEST_TS, 40)]))
        .await
        .unwrap();

    assert_eq!(read_reply(&mut client, 6).await, ACK);
    assert!(delivered(&sink, 1).await);

    let positions = sink.positions().await;
    assert_eq!(positions[0].tracked_object_id, 42);
    assert_eq!(positions[0].speed_kmh, 40);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_frames_on_one_connection_processed_in_order() {
    let sink = MemorySink::new();
    let (mut listener, addr) = start(Protocol::Ruptela, DispatchMode::Pooled, pipeline(&sink)).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    for (i, speed) in [10u16, 20, 30].into_iter().enumerate() {
        let ts = TEST_TS + 30 * i as u32;
        client
            .write_all(&packet(TEST_IMEI, &[record(ts, speed)]))
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client, 6).await, ACK);
    }

    assert!(delivered(&sink, 3).await);
    let speeds: Vec<u16> = sink.positions().await.iter().map(|p| p.speed_kmh).collect();
    assert_eq!(speeds, vec![10, 20, 30]);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_packet_split_across_writes() {
    let sink = MemorySink::new();
    let (mut listener, addr) = start(Protocol::Ruptela, DispatchMode::Pooled, pipeline(&sink)).await;

    let bytes = packet(TEST_IMEI, &[record(TEST_TS, 40), record(TEST_TS + 30, 45)]);
    let mut client = TcpStream::connect(addr).await.unwrap();
    for chunk in bytes.chunks(7) {
        client.write_all(chunk).await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(read_reply(&mut client, 6).await, ACK);
    assert!(delivered(&sink, 2).await);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_unknown_device_is_acked_and_connection_kept() {
    let sink = MemorySink::new();
    let (mut listener, addr) = start(Protocol::Ruptela, DispatchMode::Pooled, pipeline(&sink)).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&packet(UNKNOWN_IMEI, &[record(TEST_TS, 40)]))
        .await
        .unwrap();
    assert_eq!(read_reply(&mut client, 6).await, ACK);
    assert!(sink.positions().await.is_empty());

    // Same connection, corrected device
    client
        .write_all(&packet(TEST_IMEI, &[record(TEST_TS, 40)]))
        .await
        .unwrap();
    assert_eq!(read_reply(&mut client, 6).await, ACK);
    assert!(delivered(&sink, 1).await);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_invalid_imei_closes_connection() {
    let sink = MemorySink::new();
    let (mut listener, addr) = start(Protocol::Ruptela, DispatchMode::Pooled, pipeline(&sink)).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&packet(0, &[record(TEST_TS, 40)])).await.unwrap();

    assert!(closed_by_server(&mut client, Duration::from_secs(2)).await);
    assert!(sink.positions().await.is_empty());

    listener.shutdown().await;
}

#[tokio::test]
async fn test_checksum_reject_policy_answers_nack() {
    let sink = MemorySink::new();
    let pipeline = pipeline(&sink)
        .with_ruptela(RuptelaConfig::default().with_checksum_policy(ChecksumPolicy::Reject));
    let (mut listener, addr) = start(Protocol::Ruptela, DispatchMode::Pooled, pipeline).await;

    let mut bytes = packet(TEST_IMEI, &[record(TEST_TS, 40)]);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&bytes).await.unwrap();

    assert_eq!(read_reply(&mut client, 6).await, NACK);
    assert!(sink.positions().await.is_empty());

    listener.shutdown().await;
}

#[tokio::test]
async fn test_checksum_warn_policy_still_persists() {
    let sink = MemorySink::new();
    let (mut listener, addr) = start(Protocol::Ruptela, DispatchMode::Pooled, pipeline(&sink)).await;

    let mut bytes = packet(TEST_IMEI, &[record(TEST_TS, 40)]);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&bytes).await.unwrap();

    assert_eq!(read_reply(&mut client, 6).await, ACK);
    assert!(delivered(&sink, 1).await);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_text_protocol_persists_without_reply() {
    let sink = MemorySink::new();
    let (mut listener, addr) = start(Protocol::Neon, DispatchMode::Pooled, pipeline(&sink)).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(neon_frame(&TEST_IMEI.to_string(), 55).as_bytes())
        .await
        .unwrap();

    let sink_ref = &sink;
    assert!(eventually(|| async move { sink_ref.positions().await.len() == 1 }).await);
    assert_eq!(sink.positions().await[0].speed_kmh, 55);
    assert!(!closed_by_server(&mut client, Duration::from_millis(100)).await);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_repeated_decode_failures_disconnect() {
    let sink = MemorySink::new();
    let (mut listener, addr) = start(Protocol::Neon, DispatchMode::Pooled, pipeline(&sink)).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let broken = format!("<oris,0,{TEST_IMEI},150324>");
    for _ in 0..3 {
        client.write_all(broken.as_bytes()).await.unwrap();
    }

    assert!(closed_by_server(&mut client, Duration::from_secs(2)).await);
    assert!(sink.positions().await.is_empty());

    listener.shutdown().await;
}

#[tokio::test]
async fn test_good_frame_resets_failure_count() {
    let sink = MemorySink::new();
    let (mut listener, addr) = start(Protocol::Neon, DispatchMode::Pooled, pipeline(&sink)).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let broken = format!("<oris,0,{TEST_IMEI},150324>");
    let good = neon_frame(&TEST_IMEI.to_string(), 30);
    let stream = format!("{broken}{broken}{good}{broken}{broken}");
    client.write_all(stream.as_bytes()).await.unwrap();

    let sink_ref = &sink;
    assert!(eventually(|| async move { sink_ref.positions().await.len() == 1 }).await);
    assert!(!closed_by_server(&mut client, Duration::from_millis(200)).await);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let sink = MemorySink::new();
    let pipeline = pipeline(&sink).with_read_timeout(Duration::from_millis(200));
    let (mut listener, addr) = start(Protocol::Ruptela, DispatchMode::Pooled, pipeline).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    assert!(closed_by_server(&mut client, Duration::from_secs(2)).await);
    let listener_ref = &listener;
    assert!(eventually(|| async move { listener_ref.status().active_connections == 0 }).await);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_single_worker_serves_sequential_connections() {
    let sink = MemorySink::new();
    let mut listener = fleetgate_network::Listener::new(
        listener_config(Protocol::Ruptela).workers(1),
        server_config(DispatchMode::Pooled),
        Arc::new(pipeline(&sink)),
    );
    let addr = listener.start().await.unwrap();

    for i in 0..3u32 {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&packet(TEST_IMEI, &[record(TEST_TS + i * 30, 40)]))
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client, 6).await, ACK);
    }

    assert!(delivered(&sink, 3).await);
    assert_eq!(listener.status().total_connections, 3);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_ack_sent_before_slow_collaborators_finish() {
    let sink = MemorySink::new();
    let mut listener = fleetgate_network::Listener::new(
        listener_config(Protocol::Ruptela),
        server_config(DispatchMode::Pooled),
        Arc::new(resolving_pipeline(&sink, StallingResolver)),
    );
    let addr = listener.start().await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&packet(TEST_IMEI, &[record(TEST_TS, 120)]))
        .await
        .unwrap();

    assert_eq!(read_reply(&mut client, 6).await, ACK);
    assert!(sink.positions().await.is_empty());

    listener.shutdown().await;
}

#[rstest]
#[case::pooled(DispatchMode::Pooled)]
#[case::per_connection(DispatchMode::PerConnection)]
#[tokio::test]
async fn test_panicking_handler_does_not_take_down_listener(#[case] dispatch: DispatchMode) {
    let sink = MemorySink::new();
    let mut listener = fleetgate_network::Listener::new(
        listener_config(Protocol::Ruptela).workers(1),
        server_config(dispatch),
        Arc::new(resolving_pipeline(&sink, PanickingResolver)),
    );
    let addr = listener.start().await.unwrap();

    // Speeding triggers the address lookup, which panics mid-connection.
    let mut speeding = TcpStream::connect(addr).await.unwrap();
    speeding
        .write_all(&packet(TEST_IMEI, &[record(TEST_TS, 120)]))
        .await
        .unwrap();
    assert_eq!(read_reply(&mut speeding, 6).await, ACK);
    assert!(closed_by_server(&mut speeding, Duration::from_secs(2)).await);

    for i in 1..=2u32 {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&packet(TEST_IMEI, &[record(TEST_TS + i * 30, 40)]))
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client, 6).await, ACK);
    }

    assert!(delivered(&sink, 2).await);
    let listener_ref = &listener;
    assert!(eventually(|| async move { listener_ref.status().active_connections == 0 }).await);
    assert!(listener.is_running());

    listener.shutdown().await;
}

#[rstest]
#[case::pooled(DispatchMode::Pooled)]
#[case::per_connection(DispatchMode::PerConnection)]
#[tokio::test]
async fn test_shutdown_interrupts_open_connections(#[case] dispatch: DispatchMode) {
    let sink = MemorySink::new();
    let (mut listener, addr) = start(Protocol::Ruptela, dispatch, pipeline(&sink)).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let listener_ref = &listener;
    assert!(eventually(|| async move { listener_ref.status().active_connections == 1 }).await);

    tokio::time::timeout(Duration::from_secs(3), listener.shutdown())
        .await
        .expect("shutdown hung");

    assert!(closed_by_server(&mut client, Duration::from_secs(1)).await);
    let status = listener.status();
    assert!(!status.running);
    assert_eq!(status.address, None);
    assert_eq!(status.active_connections, 0);
    assert_eq!(status.total_connections, 1);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let sink = MemorySink::new();
    let (mut listener, _addr) = start(Protocol::Geneko, DispatchMode::Pooled, pipeline(&sink)).await;

    let err = listener.start().await.unwrap_err();
    assert!(matches!(err, ServerError::AlreadyRunning(Protocol::Geneko)));

    listener.shutdown().await;
    // Shutdown of a stopped listener is a no-op
    listener.shutdown().await;
}

#[tokio::test]
async fn test_zero_workers_refused_at_start() {
    let sink = MemorySink::new();
    let mut listener = fleetgate_network::Listener::new(
        listener_config(Protocol::Neon).workers(0),
        server_config(DispatchMode::Pooled),
        Arc::new(pipeline(&sink)),
    );
    assert!(matches!(listener.start().await, Err(ServerError::Config(_))));
    assert!(!listener.is_running());
}

#[tokio::test]
async fn test_manager_runs_enabled_listeners() {
    let sink = MemorySink::new();
    let configs = [
        listener_config(Protocol::Neon),
        listener_config(Protocol::Geneko).enabled(false),
        listener_config(Protocol::Ruptela),
    ];
    let mut manager = ServerManager::new(
        Arc::new(pipeline(&sink)),
        server_config(DispatchMode::Pooled),
        configs,
    );
    manager.start_all().await.unwrap();

    let status = manager.status();
    assert_eq!(status.len(), 2);
    assert!(status.iter().all(|s| s.running && s.address.is_some()));
    assert_eq!(manager.local_addr(Protocol::Geneko), None);

    let addr = manager.local_addr(Protocol::Ruptela).unwrap();
    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&packet(TEST_IMEI, &[record(TEST_TS, 40)]))
        .await
        .unwrap();
    assert_eq!(read_reply(&mut client, 6).await, ACK);

    tokio::time::timeout(Duration::from_secs(5), manager.shutdown_all())
        .await
        .expect("shutdown_all hung");

    assert!(manager.shutdown_token().is_cancelled());
    assert!(manager.status().iter().all(|s| !s.running));
    assert!(closed_by_server(&mut client, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_manager_start_failure_stops_started_listeners() {
    // Occupy a port so the second listener cannot bind
    let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let taken = blocker.local_addr().unwrap().port();

    let sink = MemorySink::new();
    let configs = [
        listener_config(Protocol::Neon),
        ListenerConfig::for_protocol(Protocol::Ruptela).port(taken).workers(2),
    ];
    let mut manager = ServerManager::new(
        Arc::new(pipeline(&sink)),
        server_config(DispatchMode::Pooled),
        configs,
    );

    let err = manager.start_all().await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }));
    assert!(manager.status().iter().all(|s| !s.running));
}
