//! Common decoder interface.
//!
//! A connection worker drives one decoder per connection:
//!
//! 1. [`ProtocolDecoder::device_code`] extracts the device identifier from
//!    the first frame so the caller can resolve it against the directory.
//! 2. [`ProtocolDecoder::decode`] turns every frame into canonical reports,
//!    stamped with the resolved tracked object.
//! 3. [`ProtocolDecoder::reply_for`] tells the caller what to answer when a
//!    frame could not be decoded (binary protocol only).

use bytes::Bytes;
use chrono::{DateTime, Utc};
use fleetgate_core::{
    AlarmCatalog, DiagnosticsSnapshot, PositionReport, Protocol, TrackedObject,
    constants::EPOCH_FLOOR_SECS,
};
use std::sync::Arc;

use crate::error::{DecodeError, DecodeResult};
use crate::frame::Frame;
use crate::geneko::GenekoDecoder;
use crate::neon::NeonDecoder;
use crate::ruptela::{RuptelaConfig, RuptelaDecoder};

/// One position fix together with the diagnostics sampled with it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReport {
    pub report: PositionReport,
    /// `None` when the device sent no diagnostics or all of them were zero
    pub diagnostics: Option<DiagnosticsSnapshot>,
}

impl DecodedReport {
    pub fn new(report: PositionReport, diagnostics: Option<DiagnosticsSnapshot>) -> Self {
        Self {
            report,
            diagnostics: diagnostics.and_then(DiagnosticsSnapshot::non_empty),
        }
    }
}

/// Everything a single frame decoded into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// Reports in the order the device sent them
    pub reports: Vec<DecodedReport>,

    /// Bytes to write back to the device
    pub reply: Option<Bytes>,

    /// Records that failed to decode and were skipped
    pub skipped: usize,
}

impl Decoded {
    pub fn single(report: DecodedReport) -> Self {
        Self {
            reports: vec![report],
            ..Default::default()
        }
    }

    /// A frame that produced nothing but a reply.
    pub fn reply_only(reply: Bytes) -> Self {
        Self {
            reply: Some(reply),
            ..Default::default()
        }
    }
}

/// Decoder for one wire protocol.
///
/// Implementations are synchronous. Every frame decodes independently;
/// extended-record merges are opened and flushed within a single frame. One
/// instance is owned by exactly one connection worker.
pub trait ProtocolDecoder: Send {
    fn protocol(&self) -> Protocol;

    /// Extract the device identifier carried in `frame`.
    fn device_code(&self, frame: &Frame) -> DecodeResult<String>;

    /// Decode `frame` into reports for `object`.
    fn decode(&mut self, frame: &Frame, object: &TrackedObject) -> DecodeResult<Decoded>;

    /// Reply to send when `frame` could not be decoded because of `err`.
    fn reply_for(&self, _err: &DecodeError) -> Option<Bytes> {
        None
    }
}

/// Build the decoder for `protocol`.
pub fn decoder_for(
    protocol: Protocol,
    catalog: Arc<AlarmCatalog>,
    ruptela: RuptelaConfig,
) -> Box<dyn ProtocolDecoder + Send> {
    match protocol {
        Protocol::Neon => Box::new(NeonDecoder::new(catalog)),
        Protocol::Geneko => Box::new(GenekoDecoder::new(catalog)),
        Protocol::Ruptela => Box::new(RuptelaDecoder::new(catalog, ruptela)),
    }
}

/// Parse a decimal field, naming it in the error.
pub(crate) fn parse_field<T: std::str::FromStr>(field: &'static str, value: &str) -> DecodeResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DecodeError::malformed(field, value))
}

/// Numeric device event id from a text field.
///
/// Non-numeric events still drive alarm assignment through their text; only
/// the numeric id falls back to 0.
pub(crate) fn raw_event_code(protocol: Protocol, value: &str) -> u16 {
    match value.parse() {
        Ok(code) => code,
        Err(_) => {
            tracing::debug!(protocol = %protocol, event = value, "non-numeric event code");
            0
        }
    }
}

/// Convert seconds since the Unix epoch, rejecting values chrono cannot hold.
pub(crate) fn timestamp_from_secs(secs: i64) -> DecodeResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| DecodeError::malformed("timestamp", secs.to_string()))
}

/// Returns `true` if `timestamp` is before the earliest plausible fix time.
///
/// Decoders still emit such reports; the alarm engine drops them. This is
/// used only for logging.
pub(crate) fn before_epoch_floor(timestamp: &DateTime<Utc>) -> bool {
    timestamp.timestamp() < EPOCH_FLOOR_SECS
}
