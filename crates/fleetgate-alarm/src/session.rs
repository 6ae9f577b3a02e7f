//! Per-connection state owned by the worker serving the connection.

use fleetgate_core::{
    DiagnosticsSnapshot, PositionReport, Subscriber, TrackedObject, Zone, ZoneRef,
};
use fleetgate_storage::{DeviceDirectory, StorageResult};

/// First stopped report since the object last moved, plus the first
/// diagnostics seen while stopped (the fuel reference).
#[derive(Debug, Clone, PartialEq)]
pub struct StopAnchor {
    pub report: PositionReport,
    pub diagnostics: Option<DiagnosticsSnapshot>,
}

/// Device and alarm state for one connection.
///
/// Created on the first frame whose device resolves to a tracked object and
/// dropped with the connection. Nothing here is persisted.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub device_code: String,
    pub object: TrackedObject,

    /// Zone memberships and subscribers, cached for the connection lifetime
    pub zones: Vec<Zone>,
    pub subscribers: Vec<Subscriber>,

    /// Last accepted report that moved the ordering reference forward
    pub last: Option<PositionReport>,
    pub stop_anchor: Option<StopAnchor>,
    pub current_zone: Option<ZoneRef>,

    pub speeding_latched: bool,
    pub stationary_latched: bool,
    pub fuel_theft_latched: bool,
}

/// Outcome of resolving a device code against the directory.
#[derive(Debug)]
pub enum Resolution {
    Ready(Box<SessionState>),
    UnknownDevice,
    /// The device exists but is not linked to an active tracked object
    Unlinked,
}

impl SessionState {
    pub fn new(
        device_code: impl Into<String>,
        object: TrackedObject,
        zones: Vec<Zone>,
        subscribers: Vec<Subscriber>,
    ) -> Self {
        Self {
            device_code: device_code.into(),
            object,
            zones,
            subscribers,
            last: None,
            stop_anchor: None,
            current_zone: None,
            speeding_latched: false,
            stationary_latched: false,
            fuel_theft_latched: false,
        }
    }

    /// Look the device up and, when it is linked, load its zones and
    /// subscribers into a fresh session.
    pub async fn resolve<D: DeviceDirectory>(directory: &D, code: &str) -> StorageResult<Resolution> {
        let Some(device) = directory.lookup_device(code).await? else {
            return Ok(Resolution::UnknownDevice);
        };
        let Some(object) = device.tracked_object else {
            return Ok(Resolution::Unlinked);
        };

        let zones = directory.lookup_zones(&object).await?;
        let subscribers = directory.lookup_alarm_subscribers(&object).await?;

        tracing::debug!(
            device = %code,
            tracked_object_id = object.id,
            zones = zones.len(),
            subscribers = subscribers.len(),
            "session resolved"
        );

        Ok(Resolution::Ready(Box::new(Self::new(code, object, zones, subscribers))))
    }

    /// Drop the stop anchor and the latches that only re-arm on motion.
    pub(crate) fn clear_stop(&mut self) {
        self.stop_anchor = None;
        self.stationary_latched = false;
        self.fuel_theft_latched = false;
    }

    pub(crate) fn anchor_stop(&mut self, report: &PositionReport, diagnostics: Option<&DiagnosticsSnapshot>) {
        let anchor = self.stop_anchor.get_or_insert_with(|| StopAnchor {
            report: report.clone(),
            diagnostics: None,
        });
        if anchor.diagnostics.is_none() {
            anchor.diagnostics = diagnostics.cloned();
        }
    }
}
