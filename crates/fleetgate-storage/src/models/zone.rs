use fleetgate_core::Zone;

/// Zone row with the per-object membership flags folded in.
///
/// `active` is true only when both the zone and the membership are active.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ZoneRow {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub radius_m: f64,
    pub entry_alarm: bool,
    pub exit_alarm: bool,
    pub active: bool,
}

impl From<ZoneRow> for Zone {
    fn from(row: ZoneRow) -> Self {
        Zone {
            id: row.id,
            name: row.name,
            lat: row.lat,
            lon: row.lon,
            radius_m: row.radius_m,
            entry_alarm: row.entry_alarm,
            exit_alarm: row.exit_alarm,
            active: row.active,
        }
    }
}
