//! Shared fixtures for the protocol integration tests.
//!
//! [`RecordBuilder`] and [`packet`] assemble binary frames byte by byte, so
//! tests exercise the decoder against independently built input rather than
//! against anything the crate produces itself.

#![allow(dead_code)]

use fleetgate_core::TrackedObject;
use fleetgate_protocol::crc16;
use fleetgate_protocol::ruptela::{COMMAND_EXTENDED, COMMAND_STANDARD};

pub const TEST_IMEI: u64 = 359_633_100_458_590;

/// 2024-03-15T08:30:15Z
pub const TEST_TS: u32 = 1_710_491_415;

pub fn test_object() -> TrackedObject {
    TrackedObject {
        id: 42,
        label: "BG-042-FG".to_string(),
        speed_limit_kmh: 90,
        stop_dwell_secs: 300,
    }
}

/// Builder for one binary record.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    extended: bool,
    timestamp: u32,
    record_ext: u8,
    lat: f64,
    lon: f64,
    altitude_m: f32,
    speed_kmh: u16,
    event_id: u16,
    io: [Vec<(u16, u64)>; 4],
}

impl RecordBuilder {
    pub fn standard(timestamp: u32) -> Self {
        Self {
            extended: false,
            timestamp,
            record_ext: 0,
            lat: 44.81,
            lon: 20.46,
            altitude_m: 117.0,
            speed_kmh: 0,
            event_id: 0,
            io: Default::default(),
        }
    }

    /// Extended record, part `index` of `0..=last`.
    pub fn extended(timestamp: u32, last: u8, index: u8) -> Self {
        Self {
            extended: true,
            record_ext: (last << 4) | (index & 0x0F),
            ..Self::standard(timestamp)
        }
    }

    pub fn position(mut self, lat: f64, lon: f64) -> Self {
        self.lat = lat;
        self.lon = lon;
        self
    }

    pub fn speed(mut self, speed_kmh: u16) -> Self {
        self.speed_kmh = speed_kmh;
        self
    }

    pub fn event(mut self, event_id: u16) -> Self {
        self.event_id = event_id;
        self
    }

    /// Add an IO element; `width` is the value size in bytes (1, 2, 4 or 8).
    pub fn io(mut self, width: usize, id: u16, value: u64) -> Self {
        let run = match width {
            1 => 0,
            2 => 1,
            4 => 2,
            8 => 3,
            other => panic!("invalid IO width {other}"),
        };
        self.io[run].push((id, value));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.push(0);
        if self.extended {
            out.push(self.record_ext);
        }
        out.push(0);
        out.extend_from_slice(&((self.lon * 1e7).round() as i32).to_be_bytes());
        out.extend_from_slice(&((self.lat * 1e7).round() as i32).to_be_bytes());
        out.extend_from_slice(&((self.altitude_m * 10.0) as u16).to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.push(9);
        out.extend_from_slice(&self.speed_kmh.to_be_bytes());
        out.push(7);
        if self.extended {
            out.extend_from_slice(&self.event_id.to_be_bytes());
        } else {
            out.push(self.event_id as u8);
        }

        for (run, width) in self.io.iter().zip([1usize, 2, 4, 8]) {
            out.push(run.len() as u8);
            for &(id, value) in run {
                if self.extended {
                    out.extend_from_slice(&id.to_be_bytes());
                } else {
                    out.push(id as u8);
                }
                out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
            }
        }
        out
    }

    pub fn command(&self) -> u8 {
        if self.extended {
            COMMAND_EXTENDED
        } else {
            COMMAND_STANDARD
        }
    }
}

/// Complete binary frame: length, IMEI, command, counts, records and CRC.
pub fn packet(imei: u64, records: &[RecordBuilder]) -> Vec<u8> {
    let command = records
        .first()
        .map(RecordBuilder::command)
        .unwrap_or(COMMAND_STANDARD);
    let body: Vec<u8> = records.iter().flat_map(RecordBuilder::build).collect();
    raw_packet(imei, command, records.len() as u8, &body)
}

/// Frame with arbitrary command, record count and record bytes.
pub fn raw_packet(imei: u64, command: u8, num_records: u8, records: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(11 + records.len());
    payload.extend_from_slice(&imei.to_be_bytes());
    payload.extend_from_slice(&[command, 0, num_records]);
    payload.extend_from_slice(records);

    let mut frame = (payload.len() as u16).to_be_bytes().to_vec();
    frame.extend_from_slice(&payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

/// `>`-terminated text frame for `imei` at 2024-03-15 08:30:15.
pub fn neon_frame(imei: &str, speed: u16) -> String {
    format!("<oris,0,{imei},150324,083015,44.812345,20.461234,{speed},90,117,1>")
}

/// `</fox>`-terminated text frame for `device` at 2024-03-15 08:30:15.
pub fn fox_frame(device: &str, speed: u16) -> String {
    format!(
        "<fox><gps id=\"{device}\" data=\"20240315083015,45.25,19.84,80,90,{speed},1,0\"/></fox>"
    )
}
