//! `<fox>` tag-delimited text protocol.
//!
//! ```text
//! <fox><gps id="DEVICE" data="yyyyMMddHHmmss,LAT,LON,ALT,HEADING,SPEED,IGNITION,EVENT"/></fox>
//! ```
//!
//! Only the quoted values matter: splitting on `"` puts the device id at
//! token 1 and the data record at token 3.

use chrono::{NaiveDateTime, TimeZone, Utc};
use fleetgate_core::{AlarmCatalog, AlarmCode, PositionReport, Protocol, TrackedObject};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::decoder::{
    Decoded, DecodedReport, ProtocolDecoder, before_epoch_floor, parse_field, raw_event_code,
};
use crate::error::{DecodeError, DecodeResult};
use crate::frame::Frame;

const MIN_TOKENS: usize = 4;
const DATA_FIELDS: usize = 8;

pub struct GenekoDecoder {
    catalog: Arc<AlarmCatalog>,
}

impl GenekoDecoder {
    pub fn new(catalog: Arc<AlarmCatalog>) -> Self {
        Self { catalog }
    }

    fn tokens(frame: &Frame) -> DecodeResult<Vec<&str>> {
        let text = frame
            .as_text()
            .ok_or_else(|| DecodeError::malformed("frame", frame.to_string()))?;
        let tokens: Vec<&str> = text.split('"').collect();
        if tokens.len() < MIN_TOKENS {
            return Err(DecodeError::Truncated {
                what: "fox frame",
                needed: MIN_TOKENS,
                available: tokens.len(),
            });
        }
        Ok(tokens)
    }
}

impl ProtocolDecoder for GenekoDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::Geneko
    }

    fn device_code(&self, frame: &Frame) -> DecodeResult<String> {
        let code = Self::tokens(frame)?[1].trim();
        if code.is_empty() {
            return Err(DecodeError::malformed("device id", frame.to_string()));
        }
        Ok(code.to_string())
    }

    fn decode(&mut self, frame: &Frame, object: &TrackedObject) -> DecodeResult<Decoded> {
        let tokens = Self::tokens(frame)?;
        let data: Vec<&str> = tokens[3].split(',').collect();
        if data.len() < DATA_FIELDS {
            return Err(DecodeError::Truncated {
                what: "fox data",
                needed: DATA_FIELDS,
                available: data.len(),
            });
        }

        let naive = NaiveDateTime::parse_from_str(data[0].trim(), "%Y%m%d%H%M%S")
            .map_err(|_| DecodeError::malformed("timestamp", data[0]))?;

        let mut report = PositionReport::new(
            object.id,
            Utc.from_utc_datetime(&naive),
            parse_field("latitude", data[1])?,
            parse_field("longitude", data[2])?,
        );
        report.altitude = parse_field("altitude", data[3])?;
        report.heading = parse_field("heading", data[4])?;
        report.speed_kmh = parse_field::<f64>("speed", data[5])?.round() as u16;
        report.ignition_on = parse_field::<u8>("ignition", data[6])? == 1;

        let event = data[7].trim();
        report.raw_event_code = raw_event_code(Protocol::Geneko, event);
        let code = AlarmCode::new(event);
        if !code.is_regular() && self.catalog.get(&code).is_some() {
            report.alarm = self.catalog.assign(code);
        }

        if before_epoch_floor(&report.timestamp) {
            debug!(object = object.id, timestamp = %report.timestamp, "Fix predates epoch floor");
        }
        trace!(object = object.id, speed = report.speed_kmh, "Decoded fox frame");

        Ok(Decoded::single(DecodedReport::new(report, None)))
    }
}
