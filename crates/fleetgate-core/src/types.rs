use crate::{
    Result,
    constants::{
        ALARM_FUEL_THEFT, ALARM_IGNITION_OFF, ALARM_IGNITION_ON, ALARM_REGULAR, ALARM_SOS,
        ALARM_SPEEDING, ALARM_STATIONARY, ALARM_ZONE_ENTRY, ALARM_ZONE_EXIT, GENEKO_PORT,
        NEON_PORT, RUPTELA_PORT,
    },
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Wire protocol spoken on a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// `>`-delimited comma separated text.
    Neon,
    /// `<fox>...</fox>` tag-delimited text.
    Geneko,
    /// Length-prefixed binary frames with CRC16 trailer.
    Ruptela,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Neon, Protocol::Geneko, Protocol::Ruptela];

    /// Port the protocol listens on unless configured otherwise.
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Neon => NEON_PORT,
            Protocol::Geneko => GENEKO_PORT,
            Protocol::Ruptela => RUPTELA_PORT,
        }
    }

    /// Returns `true` for the binary protocol, the only one that replies.
    #[inline]
    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(self, Protocol::Ruptela)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Neon => "neon",
            Protocol::Geneko => "geneko",
            Protocol::Ruptela => "ruptela",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "neon" => Ok(Protocol::Neon),
            "geneko" => Ok(Protocol::Geneko),
            "ruptela" => Ok(Protocol::Ruptela),
            _ => Err(Error::UnknownProtocol(s.to_string())),
        }
    }
}

/// Alarm type code as stored in the alarm catalog (e.g. `"6013"`).
///
/// Well-known codes are available as associated constants, so no allocation
/// happens for the codes the engine assigns itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmCode(Cow<'static, str>);

impl AlarmCode {
    pub const REGULAR: AlarmCode = AlarmCode(Cow::Borrowed(ALARM_REGULAR));
    pub const SPEEDING: AlarmCode = AlarmCode(Cow::Borrowed(ALARM_SPEEDING));
    pub const STATIONARY: AlarmCode = AlarmCode(Cow::Borrowed(ALARM_STATIONARY));
    pub const FUEL_THEFT: AlarmCode = AlarmCode(Cow::Borrowed(ALARM_FUEL_THEFT));
    pub const ZONE_EXIT: AlarmCode = AlarmCode(Cow::Borrowed(ALARM_ZONE_EXIT));
    pub const ZONE_ENTRY: AlarmCode = AlarmCode(Cow::Borrowed(ALARM_ZONE_ENTRY));
    pub const SOS: AlarmCode = AlarmCode(Cow::Borrowed(ALARM_SOS));
    pub const IGNITION_ON: AlarmCode = AlarmCode(Cow::Borrowed(ALARM_IGNITION_ON));
    pub const IGNITION_OFF: AlarmCode = AlarmCode(Cow::Borrowed(ALARM_IGNITION_OFF));

    pub fn new(code: impl Into<String>) -> Self {
        AlarmCode(Cow::Owned(code.into()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.0 == ALARM_REGULAR
    }
}

impl Default for AlarmCode {
    fn default() -> Self {
        AlarmCode::REGULAR
    }
}

impl fmt::Display for AlarmCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlarmCode {
    fn from(code: &str) -> Self {
        AlarmCode::new(code)
    }
}

/// Reference to the zone a report was inside of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRef {
    pub id: i64,
    pub name: String,
}

/// Canonical position record produced by every protocol decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    /// Tracked object the reporting device is linked to
    pub tracked_object_id: i64,

    /// Fix time reported by the device (UTC)
    pub timestamp: DateTime<Utc>,

    /// Latitude in decimal degrees
    pub lat: f64,

    /// Longitude in decimal degrees
    pub lon: f64,

    /// Altitude in meters
    pub altitude: f32,

    /// Heading in degrees
    pub heading: f32,

    pub speed_kmh: u16,

    pub ignition_on: bool,

    /// Device event id that triggered the report
    pub raw_event_code: u16,

    /// Accumulated distance, maintained by the alarm engine
    pub virtual_odometer_km: f64,

    /// Alarm assigned to this report; at most one per report
    pub alarm: AlarmCode,

    /// Free text attached to the alarm (speed, zone name, address)
    pub event_text: String,

    /// Zone the object is currently inside of, if any
    pub zone: Option<ZoneRef>,
}

impl PositionReport {
    /// Create a regular report with no alarm and empty event text.
    pub fn new(tracked_object_id: i64, timestamp: DateTime<Utc>, lat: f64, lon: f64) -> Self {
        Self {
            tracked_object_id,
            timestamp,
            lat,
            lon,
            altitude: 0.0,
            heading: 0.0,
            speed_kmh: 0,
            ignition_on: false,
            raw_event_code: 0,
            virtual_odometer_km: 0.0,
            alarm: AlarmCode::REGULAR,
            event_text: String::new(),
            zone: None,
        }
    }

    /// Returns `true` if this report's fix is strictly newer than `other`'s.
    #[inline]
    #[must_use]
    pub fn is_after(&self, other: &PositionReport) -> bool {
        self.timestamp > other.timestamp
    }
}

/// OBD / CAN diagnostics sampled together with a position fix.
///
/// A snapshot whose fields are all at their default carries no information
/// and must never be forwarded; see [`DiagnosticsSnapshot::is_empty`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub tracked_object_id: i64,
    pub timestamp: DateTime<Utc>,
    pub rpm: u32,
    pub temp_c: i32,
    pub fuel_pct: f32,
    pub battery_v: f32,
    pub engine_hours_total: f32,
    pub odometer_km_total: u32,
    pub fuel_total_l: f32,
    pub avg_consumption_lph: f32,
    pub error_codes: String,
    pub engine_load_pct: f32,
    pub throttle_pct: f32,
    pub trip_fuel_l: f32,
    pub trip_km: f32,
}

impl DiagnosticsSnapshot {
    pub fn new(tracked_object_id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            tracked_object_id,
            timestamp,
            ..Default::default()
        }
    }

    /// Returns `true` when every measured field is at its default value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rpm == 0
            && self.temp_c == 0
            && self.fuel_pct == 0.0
            && self.battery_v == 0.0
            && self.engine_hours_total == 0.0
            && self.odometer_km_total == 0
            && self.fuel_total_l == 0.0
            && self.avg_consumption_lph == 0.0
            && self.error_codes.is_empty()
            && self.engine_load_pct == 0.0
            && self.throttle_pct == 0.0
            && self.trip_fuel_l == 0.0
            && self.trip_km == 0.0
    }

    /// Overlay every non-default field of `part` onto `self`.
    ///
    /// Identity fields (object id, timestamp) and temperature are kept; later
    /// parts of a split record only refine the measured values.
    pub fn merge_nonzero(&mut self, part: &DiagnosticsSnapshot) {
        if part.battery_v != 0.0 {
            self.battery_v = part.battery_v;
        }
        if part.throttle_pct != 0.0 {
            self.throttle_pct = part.throttle_pct;
        }
        if !part.error_codes.is_empty() {
            self.error_codes.clone_from(&part.error_codes);
        }
        if part.fuel_pct != 0.0 {
            self.fuel_pct = part.fuel_pct;
        }
        if part.engine_load_pct != 0.0 {
            self.engine_load_pct = part.engine_load_pct;
        }
        if part.avg_consumption_lph != 0.0 {
            self.avg_consumption_lph = part.avg_consumption_lph;
        }
        if part.rpm != 0 {
            self.rpm = part.rpm;
        }
        if part.trip_fuel_l != 0.0 {
            self.trip_fuel_l = part.trip_fuel_l;
        }
        if part.trip_km != 0.0 {
            self.trip_km = part.trip_km;
        }
        if part.engine_hours_total != 0.0 {
            self.engine_hours_total = part.engine_hours_total;
        }
        if part.fuel_total_l != 0.0 {
            self.fuel_total_l = part.fuel_total_l;
        }
        if part.odometer_km_total != 0 {
            self.odometer_km_total = part.odometer_km_total;
        }
    }

    /// Consume the snapshot, returning `None` if it carries no data.
    #[must_use]
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() { None } else { Some(self) }
    }
}

/// Vehicle or asset whose position is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: i64,
    pub label: String,

    /// Speed limit in km/h; `0` disables the speeding alarm
    pub speed_limit_kmh: u16,

    /// Dwell after which a stop raises the stationary alarm; `0` disables it
    pub stop_dwell_secs: u32,
}

/// Tracking hardware, identified by its IMEI or vendor device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub code: String,
    pub tracked_object: Option<TrackedObject>,
}

/// Circular geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub radius_m: f64,
    pub entry_alarm: bool,
    pub exit_alarm: bool,
    pub active: bool,
}

impl Zone {
    #[must_use]
    pub fn to_ref(&self) -> ZoneRef {
        ZoneRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Catalog entry describing an alarm type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmType {
    pub code: AlarmCode,
    pub name: String,

    /// Attach a reverse-geocoded address to the event text
    pub address_resolution_required: bool,

    /// Send e-mail notifications to subscribers
    pub email: bool,

    /// Inactive types are never assigned; reports fall back to regular
    pub active: bool,
}

/// Person subscribed to an alarm type on one tracked object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub alarm: AlarmCode,
    pub email_enabled: bool,
}

impl Subscriber {
    /// Returns `true` if this subscriber wants mail for `alarm`.
    #[must_use]
    pub fn wants(&self, alarm: &AlarmCode) -> bool {
        self.email_enabled && &self.alarm == alarm
    }
}
