use fleetgate_core::{AlarmCode, AlarmType, Subscriber};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlarmTypeRow {
    pub code: String,
    pub name: String,
    pub address_resolution_required: bool,
    pub email: bool,
    pub active: bool,
}

impl From<AlarmTypeRow> for AlarmType {
    fn from(row: AlarmTypeRow) -> Self {
        AlarmType {
            code: AlarmCode::new(row.code),
            name: row.name,
            address_resolution_required: row.address_resolution_required,
            email: row.email,
            active: row.active,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriberRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub alarm_code: String,
    pub email_enabled: bool,
}

impl From<SubscriberRow> for Subscriber {
    fn from(row: SubscriberRow) -> Self {
        Subscriber {
            id: row.id,
            name: row.name,
            email: row.email,
            alarm: AlarmCode::new(row.alarm_code),
            email_enabled: row.email_enabled,
        }
    }
}
