use crate::error::{StorageError, StorageResult};
use fleetgate_core::{DiagnosticsSnapshot, PositionReport, Subscriber};
use sqlx::SqlitePool;
use std::future::Future;
use tokio::sync::broadcast;

/// Capacity of the live report channel; slow subscribers lag and skip.
pub const BROADCAST_CAPACITY: usize = 1024;

/// Outward side effects of an accepted report.
pub trait ReportSink: Send + Sync {
    /// Store a position, returning its row id.
    fn persist_position(
        &self,
        report: &PositionReport,
    ) -> impl Future<Output = StorageResult<i64>> + Send;

    fn persist_diagnostics(
        &self,
        snapshot: &DiagnosticsSnapshot,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// Publish to live consumers (dashboards, forwarders).
    fn broadcast(&self, report: &PositionReport) -> impl Future<Output = StorageResult<()>> + Send;

    /// Queue an alarm notification for one subscriber.
    fn notify_subscriber(
        &self,
        subscriber: &Subscriber,
        report: &PositionReport,
    ) -> impl Future<Output = StorageResult<()>> + Send;
}

/// Writes history to SQLite, broadcasts on a tokio channel and queues
/// e-mail notifications in the `alarm_notifications` outbox.
#[derive(Debug, Clone)]
pub struct SqliteReportSink {
    pool: SqlitePool,
    live: broadcast::Sender<PositionReport>,
}

impl SqliteReportSink {
    pub fn new(pool: SqlitePool) -> Self {
        let (live, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { pool, live }
    }

    /// Receive every report broadcast after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PositionReport> {
        self.live.subscribe()
    }
}

impl ReportSink for SqliteReportSink {
    async fn persist_position(&self, report: &PositionReport) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO positions (
                tracked_object_id, timestamp, lat, lon, altitude, heading,
                speed_kmh, ignition_on, raw_event_code, virtual_odometer_km,
                alarm_code, event_text, zone_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(report.tracked_object_id)
        .bind(report.timestamp)
        .bind(report.lat)
        .bind(report.lon)
        .bind(f64::from(report.altitude))
        .bind(f64::from(report.heading))
        .bind(i64::from(report.speed_kmh))
        .bind(report.ignition_on)
        .bind(i64::from(report.raw_event_code))
        .bind(report.virtual_odometer_km)
        .bind(report.alarm.as_str())
        .bind(&report.event_text)
        .bind(report.zone.as_ref().map(|zone| zone.id))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn persist_diagnostics(&self, snapshot: &DiagnosticsSnapshot) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO diagnostics (
                tracked_object_id, timestamp, rpm, temp_c, fuel_pct, battery_v,
                engine_hours_total, odometer_km_total, fuel_total_l,
                avg_consumption_lph, error_codes, engine_load_pct, throttle_pct,
                trip_fuel_l, trip_km
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.tracked_object_id)
        .bind(snapshot.timestamp)
        .bind(i64::from(snapshot.rpm))
        .bind(snapshot.temp_c)
        .bind(f64::from(snapshot.fuel_pct))
        .bind(f64::from(snapshot.battery_v))
        .bind(f64::from(snapshot.engine_hours_total))
        .bind(i64::from(snapshot.odometer_km_total))
        .bind(f64::from(snapshot.fuel_total_l))
        .bind(f64::from(snapshot.avg_consumption_lph))
        .bind(&snapshot.error_codes)
        .bind(f64::from(snapshot.engine_load_pct))
        .bind(f64::from(snapshot.throttle_pct))
        .bind(f64::from(snapshot.trip_fuel_l))
        .bind(f64::from(snapshot.trip_km))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn broadcast(&self, report: &PositionReport) -> StorageResult<()> {
        // No live consumers is not an error.
        if let Err(broadcast::error::SendError(report)) = self.live.send(report.clone()) {
            tracing::trace!(tracked_object_id = report.tracked_object_id, "no live subscribers");
        }
        Ok(())
    }

    async fn notify_subscriber(&self, subscriber: &Subscriber, report: &PositionReport) -> StorageResult<()> {
        if subscriber.email.is_empty() {
            return Err(StorageError::Configuration(format!(
                "subscriber {} has no e-mail address",
                subscriber.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO alarm_notifications (
                subscriber_id, email, tracked_object_id, alarm_code,
                event_text, lat, lon, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(subscriber.id)
        .bind(&subscriber.email)
        .bind(report.tracked_object_id)
        .bind(report.alarm.as_str())
        .bind(&report.event_text)
        .bind(report.lat)
        .bind(report.lon)
        .bind(report.timestamp)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            subscriber_id = subscriber.id,
            alarm = %report.alarm,
            "alarm notification queued"
        );
        Ok(())
    }
}
