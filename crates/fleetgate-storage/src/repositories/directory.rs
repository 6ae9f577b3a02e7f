use crate::error::StorageResult;
use crate::models::{AlarmTypeRow, DeviceRow, SubscriberRow, ZoneRow};
use fleetgate_core::{AlarmType, Device, Subscriber, TrackedObject, Zone};
use sqlx::SqlitePool;
use std::future::Future;

/// Read-only lookups the decoders and the alarm engine depend on.
///
/// Methods return `Send` futures so implementations can be shared by
/// workers running on spawned tasks.
pub trait DeviceDirectory: Send + Sync {
    /// Find an active device by IMEI or vendor id.
    ///
    /// `Ok(None)` means the code is unknown; a device without a linked
    /// tracked object is returned with `tracked_object: None`.
    fn lookup_device(
        &self,
        code: &str,
    ) -> impl Future<Output = StorageResult<Option<Device>>> + Send;

    /// Zones the object is a member of, with per-membership alarm flags.
    fn lookup_zones(
        &self,
        object: &TrackedObject,
    ) -> impl Future<Output = StorageResult<Vec<Zone>>> + Send;

    fn lookup_alarm_subscribers(
        &self,
        object: &TrackedObject,
    ) -> impl Future<Output = StorageResult<Vec<Subscriber>>> + Send;

    /// Full alarm type catalog, read once at startup.
    fn lookup_alarm_types(&self) -> impl Future<Output = StorageResult<Vec<AlarmType>>> + Send;
}

/// SQLite implementation of [`DeviceDirectory`]
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl DeviceDirectory for SqliteDirectory {
    async fn lookup_device(&self, code: &str) -> StorageResult<Option<Device>> {
        let row = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT d.code, t.id AS tracked_object_id, t.label,
                   t.speed_limit_kmh, t.stop_dwell_secs
            FROM devices d
            LEFT JOIN tracked_objects t
                   ON t.id = d.tracked_object_id AND t.active = 1
            WHERE d.code = ? AND d.active = 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Device::from))
    }

    async fn lookup_zones(&self, object: &TrackedObject) -> StorageResult<Vec<Zone>> {
        let rows = sqlx::query_as::<_, ZoneRow>(
            r#"
            SELECT z.id, z.name, z.lat, z.lon, z.radius_m,
                   oz.entry_alarm, oz.exit_alarm,
                   CASE WHEN z.active = 1 AND oz.active = 1 THEN 1 ELSE 0 END AS active
            FROM object_zones oz
            JOIN zones z ON z.id = oz.zone_id
            WHERE oz.tracked_object_id = ?
            ORDER BY z.id
            "#,
        )
        .bind(object.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Zone::from).collect())
    }

    async fn lookup_alarm_subscribers(&self, object: &TrackedObject) -> StorageResult<Vec<Subscriber>> {
        let rows = sqlx::query_as::<_, SubscriberRow>(
            r#"
            SELECT id, name, email, alarm_code, email_enabled
            FROM alarm_subscribers
            WHERE tracked_object_id = ?
            ORDER BY id
            "#,
        )
        .bind(object.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Subscriber::from).collect())
    }

    async fn lookup_alarm_types(&self) -> StorageResult<Vec<AlarmType>> {
        let rows = sqlx::query_as::<_, AlarmTypeRow>(
            r#"
            SELECT code, name, address_resolution_required, email, active
            FROM alarm_types
            ORDER BY code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(count = rows.len(), "alarm types loaded");
        Ok(rows.into_iter().map(AlarmType::from).collect())
    }
}
