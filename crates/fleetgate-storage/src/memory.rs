//! In-memory collaborators for tests and demo deployments.

use crate::error::{StorageError, StorageResult};
use crate::repositories::{DeviceDirectory, ReportSink};
use fleetgate_core::{
    AlarmCatalog, AlarmType, Device, DiagnosticsSnapshot, PositionReport, Subscriber,
    TrackedObject, Zone,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Immutable directory assembled with builder methods.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    devices: HashMap<String, Device>,
    zones: HashMap<i64, Vec<Zone>>,
    subscribers: HashMap<i64, Vec<Subscriber>>,
    alarm_types: Vec<AlarmType>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `code`, optionally linked to `object`.
    pub fn with_device(mut self, code: impl Into<String>, object: Option<TrackedObject>) -> Self {
        let code = code.into();
        self.devices.insert(
            code.clone(),
            Device {
                code,
                tracked_object: object,
            },
        );
        self
    }

    pub fn with_zone(mut self, object_id: i64, zone: Zone) -> Self {
        self.zones.entry(object_id).or_default().push(zone);
        self
    }

    pub fn with_subscriber(mut self, object_id: i64, subscriber: Subscriber) -> Self {
        self.subscribers.entry(object_id).or_default().push(subscriber);
        self
    }

    pub fn with_alarm_types(mut self, types: impl IntoIterator<Item = AlarmType>) -> Self {
        self.alarm_types = types.into_iter().collect();
        self
    }

    /// Every well-known alarm type, active, without address or e-mail.
    pub fn with_default_alarm_types(self) -> Self {
        let defaults = AlarmCatalog::with_defaults();
        self.with_alarm_types(defaults.types().cloned())
    }
}

impl DeviceDirectory for MemoryDirectory {
    async fn lookup_device(&self, code: &str) -> StorageResult<Option<Device>> {
        Ok(self.devices.get(code).cloned())
    }

    async fn lookup_zones(&self, object: &TrackedObject) -> StorageResult<Vec<Zone>> {
        Ok(self.zones.get(&object.id).cloned().unwrap_or_default())
    }

    async fn lookup_alarm_subscribers(&self, object: &TrackedObject) -> StorageResult<Vec<Subscriber>> {
        Ok(self.subscribers.get(&object.id).cloned().unwrap_or_default())
    }

    async fn lookup_alarm_types(&self) -> StorageResult<Vec<AlarmType>> {
        Ok(self.alarm_types.clone())
    }
}

#[derive(Debug, Default)]
struct SinkState {
    positions: Vec<PositionReport>,
    diagnostics: Vec<DiagnosticsSnapshot>,
    broadcasts: Vec<PositionReport>,
    notifications: Vec<(Subscriber, PositionReport)>,
}

/// Records every side effect. Clones share the same state, so a test can
/// keep a handle while the server owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
    failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every operation fails with [`StorageError::Unavailable`].
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub async fn positions(&self) -> Vec<PositionReport> {
        self.state.lock().await.positions.clone()
    }

    pub async fn diagnostics(&self) -> Vec<DiagnosticsSnapshot> {
        self.state.lock().await.diagnostics.clone()
    }

    pub async fn broadcasts(&self) -> Vec<PositionReport> {
        self.state.lock().await.broadcasts.clone()
    }

    pub async fn notifications(&self) -> Vec<(Subscriber, PositionReport)> {
        self.state.lock().await.notifications.clone()
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing {
            return Err(StorageError::Unavailable("memory sink is in failing mode".to_string()));
        }
        Ok(())
    }
}

impl ReportSink for MemorySink {
    async fn persist_position(&self, report: &PositionReport) -> StorageResult<i64> {
        self.check()?;
        let mut state = self.state.lock().await;
        state.positions.push(report.clone());
        Ok(state.positions.len() as i64)
    }

    async fn persist_diagnostics(&self, snapshot: &DiagnosticsSnapshot) -> StorageResult<()> {
        self.check()?;
        self.state.lock().await.diagnostics.push(snapshot.clone());
        Ok(())
    }

    async fn broadcast(&self, report: &PositionReport) -> StorageResult<()> {
        self.check()?;
        self.state.lock().await.broadcasts.push(report.clone());
        Ok(())
    }

    async fn notify_subscriber(&self, subscriber: &Subscriber, report: &PositionReport) -> StorageResult<()> {
        self.check()?;
        self.state
            .lock()
            .await
            .notifications
            .push((subscriber.clone(), report.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn object() -> TrackedObject {
        TrackedObject {
            id: 3,
            label: "truck".to_string(),
            speed_limit_kmh: 80,
            stop_dwell_secs: 0,
        }
    }

    #[tokio::test]
    async fn test_memory_directory_lookups() {
        let directory = MemoryDirectory::new()
            .with_device("123", Some(object()))
            .with_device("456", None)
            .with_default_alarm_types();

        let device = directory.lookup_device("123").await.unwrap().unwrap();
        assert_eq!(device.tracked_object, Some(object()));

        let unlinked = directory.lookup_device("456").await.unwrap().unwrap();
        assert!(unlinked.tracked_object.is_none());

        assert!(directory.lookup_device("789").await.unwrap().is_none());
        assert!(directory.lookup_zones(&object()).await.unwrap().is_empty());
        assert_eq!(directory.lookup_alarm_types().await.unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_memory_sink_shares_state_between_clones() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        let report = PositionReport::new(3, Utc::now(), 44.8, 20.4);

        assert_eq!(sink.persist_position(&report).await.unwrap(), 1);
        sink.broadcast(&report).await.unwrap();

        assert_eq!(handle.positions().await, vec![report.clone()]);
        assert_eq!(handle.broadcasts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_sink() {
        let sink = MemorySink::failing();
        let report = PositionReport::new(3, Utc::now(), 44.8, 20.4);

        assert!(matches!(
            sink.persist_position(&report).await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(sink.positions().await.is_empty());
    }
}
