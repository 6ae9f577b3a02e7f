//! Length-prefixed binary protocol.
//!
//! # Packet Format
//!
//! ```text
//! +--------+----------+---------+--------------+-------------+---------+--------+
//! | len:u16| imei:u64 | cmd:u8  | records_left | num_records | records | crc:u16|
//! +--------+----------+---------+--------------+-------------+---------+--------+
//! ```
//!
//! `len` counts the bytes between itself and the CRC. The CRC16/Kermit covers
//! everything before the trailer, the length header included.
//!
//! Two commands carry records: [`COMMAND_STANDARD`] and
//! [`COMMAND_EXTENDED`]. Once the declared record count has been walked the
//! device gets an [`ACK`], even if some records had to be skipped.

pub mod io;
pub mod merge;
pub(crate) mod reader;
pub mod record;

use bytes::Bytes;
use fleetgate_core::{
    AlarmCatalog, AlarmCode, DiagnosticsSnapshot, PositionReport, Protocol, TrackedObject,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::checksum::{ACK, NACK, frame_checksums};
use crate::decoder::{
    Decoded, DecodedReport, ProtocolDecoder, before_epoch_floor, timestamp_from_secs,
};
use crate::error::{DecodeError, DecodeResult};
use crate::frame::Frame;
use io::IgnitionEdge;
use merge::ExtendedMerger;
use reader::ByteReader;
use record::{Record, RecordKind, read_record};

pub const COMMAND_STANDARD: u8 = 0x01;
pub const COMMAND_EXTENDED: u8 = 0x44;

/// Largest valid IMEI (15 decimal digits).
pub const MAX_IMEI: u64 = 999_999_999_999_999;

/// What to do with a frame whose CRC does not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Log the mismatch and decode the frame anyway
    #[default]
    Warn,
    /// Answer with NACK and drop the frame
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuptelaConfig {
    pub checksum_policy: ChecksumPolicy,
}

impl RuptelaConfig {
    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }
}

pub struct RuptelaDecoder {
    catalog: Arc<AlarmCatalog>,
    config: RuptelaConfig,
}

impl RuptelaDecoder {
    pub fn new(catalog: Arc<AlarmCatalog>, config: RuptelaConfig) -> Self {
        Self { catalog, config }
    }

    pub fn config(&self) -> &RuptelaConfig {
        &self.config
    }

    fn read_imei(reader: &mut ByteReader<'_>) -> DecodeResult<u64> {
        reader.skip(2, "length")?;
        let imei = reader.u64("imei")?;
        if imei == 0 || imei > MAX_IMEI {
            return Err(DecodeError::InvalidImei(imei));
        }
        Ok(imei)
    }

    fn verify_checksum(&self, frame: &[u8]) -> DecodeResult<()> {
        let Some((carried, computed)) = frame_checksums(frame) else {
            return Ok(());
        };
        if carried == computed {
            return Ok(());
        }
        warn!(
            expected = carried,
            actual = computed,
            policy = ?self.config.checksum_policy,
            "CRC mismatch"
        );
        match self.config.checksum_policy {
            ChecksumPolicy::Warn => Ok(()),
            ChecksumPolicy::Reject => Err(DecodeError::ChecksumMismatch {
                expected: carried,
                actual: computed,
            }),
        }
    }

    fn to_report(
        &self,
        record: Record,
        object: &TrackedObject,
    ) -> DecodeResult<(PositionReport, DiagnosticsSnapshot)> {
        let timestamp = timestamp_from_secs(i64::from(record.timestamp_secs))?;
        if before_epoch_floor(&timestamp) {
            debug!(object = object.id, %timestamp, "Fix predates epoch floor");
        }

        let mut report = PositionReport::new(object.id, timestamp, record.lat, record.lon);
        report.altitude = record.altitude;
        report.heading = record.heading;
        report.speed_kmh = record.speed_kmh;
        report.raw_event_code = record.event_id;
        report.ignition_on = record.io.ignition_on;
        report.virtual_odometer_km = record.io.virtual_odometer_km;

        // SOS outranks an ignition edge reported in the same record.
        let alarm = if record.io.sos {
            Some(AlarmCode::SOS)
        } else {
            record.io.ignition_edge.map(|edge| match edge {
                IgnitionEdge::On => AlarmCode::IGNITION_ON,
                IgnitionEdge::Off => AlarmCode::IGNITION_OFF,
            })
        };
        if let Some(code) = alarm {
            report.alarm = self.catalog.assign(code);
        }

        let mut diagnostics = record.io.diagnostics;
        diagnostics.tracked_object_id = object.id;
        diagnostics.timestamp = timestamp;

        Ok((report, diagnostics))
    }
}

impl ProtocolDecoder for RuptelaDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::Ruptela
    }

    fn device_code(&self, frame: &Frame) -> DecodeResult<String> {
        let mut reader = ByteReader::new(frame.as_bytes());
        Ok(Self::read_imei(&mut reader)?.to_string())
    }

    fn decode(&mut self, frame: &Frame, object: &TrackedObject) -> DecodeResult<Decoded> {
        let bytes = frame.as_bytes();
        self.verify_checksum(bytes)?;

        let body = &bytes[..bytes.len().saturating_sub(2)];
        let mut reader = ByteReader::new(body);
        Self::read_imei(&mut reader)?;

        let command = reader.u8("command")?;
        let kind = match command {
            COMMAND_STANDARD => RecordKind::Standard,
            COMMAND_EXTENDED => RecordKind::Extended,
            other => return Err(DecodeError::UnknownCommand(other)),
        };
        let records_left = reader.u8("records left")?;
        let num_records = reader.u8("record count")?;
        if num_records == 0 {
            return Err(DecodeError::InvalidRecordCount(num_records));
        }
        trace!(object = object.id, ?kind, num_records, records_left, "Decoding records");

        let mut decoded = Decoded::reply_only(Bytes::from_static(&ACK));
        let mut merger = ExtendedMerger::new();

        for index in 0..num_records {
            let record = match read_record(&mut reader, kind) {
                Ok(record) => record,
                Err(e) => {
                    // The record length is unknown past this point.
                    let lost = usize::from(num_records - index);
                    warn!(
                        object = object.id,
                        record = index + 1,
                        num_records,
                        error = %e,
                        "Record walk stopped"
                    );
                    decoded.skipped += lost;
                    break;
                }
            };

            let part = record.part;
            let (report, diagnostics) = match self.to_report(record, object) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(object = object.id, record = index + 1, error = %e, "Record skipped");
                    decoded.skipped += 1;
                    continue;
                }
            };

            match part {
                None => decoded
                    .reports
                    .push(DecodedReport::new(report, Some(diagnostics))),
                Some(part) => {
                    if !merger.push(part, report, diagnostics, &mut decoded.reports) {
                        decoded.skipped += 1;
                    }
                }
            }
        }
        decoded.reports.extend(merger.flush());

        if reader.remaining() > 0 {
            trace!(trailing = reader.remaining(), "Unused bytes after records");
        }
        debug!(
            object = object.id,
            reports = decoded.reports.len(),
            skipped = decoded.skipped,
            "Frame decoded"
        );
        Ok(decoded)
    }

    fn reply_for(&self, err: &DecodeError) -> Option<Bytes> {
        match err {
            DecodeError::ChecksumMismatch { .. } => Some(Bytes::from_static(&NACK)),
            e if e.is_fatal() => None,
            DecodeError::InvalidFrameLength { .. } => None,
            _ => Some(Bytes::from_static(&ACK)),
        }
    }
}
