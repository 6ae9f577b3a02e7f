use fleetgate_core::{Device, TrackedObject};

/// Device row joined with its (optional, active) tracked object.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRow {
    pub code: String,
    pub tracked_object_id: Option<i64>,
    pub label: Option<String>,
    pub speed_limit_kmh: Option<i64>,
    pub stop_dwell_secs: Option<i64>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        let tracked_object = row.tracked_object_id.map(|id| TrackedObject {
            id,
            label: row.label.unwrap_or_default(),
            speed_limit_kmh: u16::try_from(row.speed_limit_kmh.unwrap_or(0).max(0))
                .unwrap_or(u16::MAX),
            stop_dwell_secs: u32::try_from(row.stop_dwell_secs.unwrap_or(0).max(0))
                .unwrap_or(u32::MAX),
        });

        Device {
            code: row.code,
            tracked_object,
        }
    }
}
