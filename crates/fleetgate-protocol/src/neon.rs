//! `>`-delimited text protocol.
//!
//! # Frame Format
//!
//! ```text
//! <oris,EVENT,IMEI,ddMMyy,HHmmss,LAT,LON,SPEED,HEADING,ALTITUDE,IGNITION>
//! ```
//!
//! The reassembler strips the `>` terminator. Some firmware prefixes frames
//! with `#` and sends a bare `#` as keep-alive; the former is stripped here,
//! the latter never reaches the decoder.
//!
//! `EVENT` is the device's event code. When it names an alarm type in the
//! catalog (for example `6022`, SOS) that alarm is assigned to the report.

use chrono::{NaiveDateTime, TimeZone, Utc};
use fleetgate_core::{AlarmCatalog, AlarmCode, PositionReport, Protocol, TrackedObject};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::decoder::{
    Decoded, DecodedReport, ProtocolDecoder, before_epoch_floor, parse_field, raw_event_code,
};
use crate::error::{DecodeError, DecodeResult};
use crate::frame::Frame;

/// Number of comma separated fields in a complete frame.
pub const NEON_FIELD_COUNT: usize = 11;

const DEVICE_FIELD: usize = 2;

pub struct NeonDecoder {
    catalog: Arc<AlarmCatalog>,
}

impl NeonDecoder {
    pub fn new(catalog: Arc<AlarmCatalog>) -> Self {
        Self { catalog }
    }

    fn fields(frame: &Frame) -> DecodeResult<Vec<&str>> {
        let text = frame
            .as_text()
            .ok_or_else(|| DecodeError::malformed("frame", frame.to_string()))?;
        let text = text.strip_prefix('#').unwrap_or(text);
        Ok(text.split(',').collect())
    }
}

impl ProtocolDecoder for NeonDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::Neon
    }

    fn device_code(&self, frame: &Frame) -> DecodeResult<String> {
        let fields = Self::fields(frame)?;
        match fields.get(DEVICE_FIELD).map(|code| code.trim()) {
            Some(code) if !code.is_empty() => Ok(code.to_string()),
            _ => Err(DecodeError::malformed("device id", frame.to_string())),
        }
    }

    fn decode(&mut self, frame: &Frame, object: &TrackedObject) -> DecodeResult<Decoded> {
        let fields = Self::fields(frame)?;
        if fields.len() < NEON_FIELD_COUNT {
            return Err(DecodeError::Truncated {
                what: "neon frame",
                needed: NEON_FIELD_COUNT,
                available: fields.len(),
            });
        }

        let stamp = format!("{}{}", fields[3].trim(), fields[4].trim());
        let naive = NaiveDateTime::parse_from_str(&stamp, "%d%m%y%H%M%S")
            .map_err(|_| DecodeError::malformed("timestamp", stamp.clone()))?;
        let timestamp = Utc.from_utc_datetime(&naive);

        let lat: f64 = parse_field("latitude", fields[5])?;
        let lon: f64 = parse_field("longitude", fields[6])?;
        let speed: f64 = parse_field("speed", fields[7])?;

        let mut report = PositionReport::new(object.id, timestamp, lat, lon);
        report.speed_kmh = speed.round() as u16;
        report.heading = parse_field("heading", fields[8])?;
        report.altitude = parse_field("altitude", fields[9])?;
        report.ignition_on = parse_field::<u8>("ignition", fields[10])? == 1;

        let event = fields[1].trim();
        report.raw_event_code = raw_event_code(Protocol::Neon, event);
        let code = AlarmCode::new(event);
        if !code.is_regular() && self.catalog.get(&code).is_some() {
            report.alarm = self.catalog.assign(code);
        }

        if before_epoch_floor(&report.timestamp) {
            debug!(object = object.id, timestamp = %report.timestamp, "Fix predates epoch floor");
        }
        trace!(object = object.id, lat, lon, speed = report.speed_kmh, "Decoded neon frame");

        Ok(Decoded::single(DecodedReport::new(report, None)))
    }
}
