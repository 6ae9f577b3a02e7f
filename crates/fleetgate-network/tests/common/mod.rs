//! Fixtures for the TCP end-to-end tests.

#![allow(dead_code)]

use fleetgate_alarm::{AddressResolver, AlarmEngine, Notifier};
use fleetgate_core::{AlarmCatalog, AlarmCode, AlarmType, Protocol, TrackedObject};
use fleetgate_network::{DispatchMode, Listener, ListenerConfig, Pipeline, ServerConfig};
use fleetgate_protocol::crc16;
use fleetgate_protocol::ruptela::COMMAND_STANDARD;
use fleetgate_storage::{MemoryDirectory, MemorySink};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

pub const TEST_IMEI: u64 = 359_633_100_458_590;
pub const UNKNOWN_IMEI: u64 = 359_633_100_000_001;

/// 2024-03-15T08:30:15Z
pub const TEST_TS: u32 = 1_710_491_415;

pub type TestPipeline = Pipeline<MemoryDirectory, MemorySink>;

pub fn test_object() -> TrackedObject {
    TrackedObject {
        id: 42,
        label: "BG-042-FG".to_string(),
        speed_limit_kmh: 90,
        stop_dwell_secs: 300,
    }
}

pub fn directory() -> MemoryDirectory {
    MemoryDirectory::new()
        .with_device(TEST_IMEI.to_string(), Some(test_object()))
        .with_default_alarm_types()
}

pub fn pipeline(sink: &MemorySink) -> TestPipeline {
    let catalog = Arc::new(AlarmCatalog::with_defaults());
    Pipeline::new(
        Arc::new(directory()),
        AlarmEngine::new(Arc::clone(&catalog)),
        Notifier::new(Arc::new(sink.clone()), catalog),
    )
}

/// Geocoder that blows up on every lookup.
pub struct PanickingResolver;

impl AddressResolver for PanickingResolver {
    async fn resolve_address(&self, _lat: f64, _lon: f64) -> Option<String> {
        panic!("geocoder crashed")
    }
}

/// Geocoder that takes far longer than any device waits for a reply.
pub struct StallingResolver;

impl AddressResolver for StallingResolver {
    async fn resolve_address(&self, _lat: f64, _lon: f64) -> Option<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        None
    }
}

/// Pipeline whose speeding alarms go through `resolver`.
pub fn resolving_pipeline<R: AddressResolver>(
    sink: &MemorySink,
    resolver: R,
) -> Pipeline<MemoryDirectory, MemorySink, R> {
    let types: Vec<AlarmType> = AlarmCatalog::with_defaults()
        .types()
        .cloned()
        .map(|mut alarm_type| {
            alarm_type.address_resolution_required = alarm_type.code == AlarmCode::SPEEDING;
            alarm_type
        })
        .collect();
    let catalog = Arc::new(AlarmCatalog::new(types));
    Pipeline::new(
        Arc::new(directory()),
        AlarmEngine::new(Arc::clone(&catalog)),
        Notifier::with_resolver(Arc::new(sink.clone()), Arc::new(resolver), catalog),
    )
}

pub fn server_config(dispatch: DispatchMode) -> ServerConfig {
    ServerConfig::default()
        .bind_host("127.0.0.1")
        .shutdown_timeout_secs(2)
        .dispatch(dispatch)
}

pub fn listener_config(protocol: Protocol) -> ListenerConfig {
    ListenerConfig::for_protocol(protocol)
        .port(0)
        .workers(4)
        .queue_capacity(16)
}

/// Started listener and its bound address.
pub async fn start(
    protocol: Protocol,
    dispatch: DispatchMode,
    pipeline: TestPipeline,
) -> (Listener<MemoryDirectory, MemorySink>, SocketAddr) {
    let mut listener = Listener::new(
        listener_config(protocol),
        server_config(dispatch),
        Arc::new(pipeline),
    );
    let addr = listener.start().await.unwrap();
    (listener, addr)
}

/// One standard binary record at `timestamp` with the given speed.
pub fn record(timestamp: u32, speed_kmh: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&timestamp.to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&204_612_340i32.to_be_bytes());
    out.extend_from_slice(&448_123_450i32.to_be_bytes());
    out.extend_from_slice(&1170u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.push(9);
    out.extend_from_slice(&speed_kmh.to_be_bytes());
    out.push(7);
    out.push(0);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out
}

/// Complete binary frame: length, IMEI, command, counts, records and CRC.
pub fn packet(imei: u64, records: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = imei.to_be_bytes().to_vec();
    payload.extend_from_slice(&[COMMAND_STANDARD, 0, records.len() as u8]);
    for record in records {
        payload.extend_from_slice(record);
    }

    let mut frame = (payload.len() as u16).to_be_bytes().to_vec();
    frame.extend_from_slice(&payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

/// `>`-terminated text frame for `imei` at 2024-03-15 08:30:15.
pub fn neon_frame(imei: &str, speed: u16) -> String {
    format!("<oris,0,{imei},150324,083015,44.812345,20.461234,{speed},90,117,1>")
}

/// Read exactly `len` bytes or fail after a second.
pub async fn read_reply(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(1), stream.read_exact(&mut buf))
        .await
        .expect("reply timed out")
        .expect("read failed");
    buf
}

/// Returns `true` once the server has closed `stream`.
pub async fn closed_by_server(stream: &mut TcpStream, within: Duration) -> bool {
    let mut buf = [0u8; 16];
    match tokio::time::timeout(within, stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) | Err(_) => false,
    }
}

/// Poll `check` until it returns `true` or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Wait until `sink` holds `count` positions and as many broadcasts.
///
/// Replies go out before delivery, so an ACK alone does not mean persisted.
pub async fn delivered(sink: &MemorySink, count: usize) -> bool {
    eventually(|| async move {
        sink.positions().await.len() == count && sink.broadcasts().await.len() == count
    })
    .await
}
