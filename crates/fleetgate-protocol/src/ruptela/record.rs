//! Record layouts.
//!
//! ```text
//! standard (23 bytes + IO)
//!   ts:u32 ts_ext:u8 priority:u8 lon:i32 lat:i32 alt:u16 angle:u16
//!   satellites:u8 speed:u16 hdop:u8 event_id:u8
//!   IO runs with 1-byte ids
//!
//! extended (25 bytes + IO)
//!   ts:u32 ts_ext:u8 record_ext:u8 priority:u8 lon:i32 lat:i32 alt:u16
//!   angle:u16 satellites:u8 speed:u16 hdop:u8 event_id:u16
//!   IO runs with 2-byte ids
//! ```
//!
//! Each IO run is a `u8` count followed by `count` `(id, value)` pairs.

use super::io::{IoValues, IoWidth};
use super::reader::ByteReader;
use crate::error::DecodeResult;

pub const STANDARD_HEADER_LEN: usize = 23;
pub const EXTENDED_HEADER_LEN: usize = 25;

const COORDINATE_SCALE: f64 = 10_000_000.0;

/// Record layout selected by the packet command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Standard,
    Extended,
}

impl RecordKind {
    #[must_use]
    pub fn header_len(self) -> usize {
        match self {
            RecordKind::Standard => STANDARD_HEADER_LEN,
            RecordKind::Extended => EXTENDED_HEADER_LEN,
        }
    }

    #[must_use]
    pub fn io_id_len(self) -> usize {
        match self {
            RecordKind::Standard => 1,
            RecordKind::Extended => 2,
        }
    }
}

/// Position of an extended record within a split fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPart {
    /// Index of the last part (high nibble of `record_ext`)
    pub last: u8,
    /// Index of this part (low nibble of `record_ext`)
    pub index: u8,
}

impl RecordPart {
    #[must_use]
    pub fn from_byte(record_ext: u8) -> Self {
        Self {
            last: record_ext >> 4,
            index: record_ext & 0x0F,
        }
    }
}

/// One record as read off the wire, before it is tied to a tracked object.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp_secs: u32,
    pub part: Option<RecordPart>,
    pub lat: f64,
    pub lon: f64,
    pub altitude: f32,
    pub heading: f32,
    pub speed_kmh: u16,
    pub event_id: u16,
    pub io: IoValues,
}

/// Read one record of `kind`, leaving the reader positioned after it.
pub fn read_record(reader: &mut ByteReader<'_>, kind: RecordKind) -> DecodeResult<Record> {
    let timestamp_secs = reader.u32("timestamp")?;
    reader.skip(1, "timestamp extension")?;
    let part = match kind {
        RecordKind::Standard => None,
        RecordKind::Extended => Some(RecordPart::from_byte(reader.u8("record extension")?)),
    };
    reader.skip(1, "priority")?;
    let lon = f64::from(reader.i32("longitude")?) / COORDINATE_SCALE;
    let lat = f64::from(reader.i32("latitude")?) / COORDINATE_SCALE;
    let altitude = f32::from(reader.u16("altitude")?) / 10.0;
    let heading = f32::from(reader.u16("angle")?) / 100.0;
    reader.skip(1, "satellites")?;
    let speed_kmh = reader.u16("speed")?;
    reader.skip(1, "hdop")?;
    let event_id = match kind {
        RecordKind::Standard => u16::from(reader.u8("event id")?),
        RecordKind::Extended => reader.u16("event id")?,
    };

    let mut io = IoValues::default();
    for width in IoWidth::ALL {
        let count = reader.u8("io count")?;
        for _ in 0..count {
            let io_id = match kind {
                RecordKind::Standard => u16::from(reader.u8("io id")?),
                RecordKind::Extended => reader.u16("io id")?,
            };
            let value = reader.uint(width.value_len(), "io value")?;
            // 8-byte values carry nothing we use
            if width != IoWidth::Eight {
                io.apply(width, io_id, value, event_id);
            }
        }
    }

    Ok(Record {
        timestamp_secs,
        part,
        lat,
        lon,
        altitude,
        heading,
        speed_kmh,
        event_id,
        io,
    })
}
