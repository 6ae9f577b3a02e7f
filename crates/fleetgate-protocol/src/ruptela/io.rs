//! IO element table.
//!
//! Every record carries four runs of IO elements, grouped by value width.
//! Elements are applied in wire order; some depend on values seen earlier in
//! the same record (IO 115 reads the ignition state).

use fleetgate_core::DiagnosticsSnapshot;
use tracing::trace;

/// Event id the device uses for ignition transitions.
pub const IGNITION_EVENT_ID: u16 = 5;

/// Width class of an IO element value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoWidth {
    One,
    Two,
    Four,
    Eight,
}

impl IoWidth {
    /// Wire order of the four runs.
    pub const ALL: [IoWidth; 4] = [IoWidth::One, IoWidth::Two, IoWidth::Four, IoWidth::Eight];

    #[must_use]
    pub fn value_len(self) -> usize {
        match self {
            IoWidth::One => 1,
            IoWidth::Two => 2,
            IoWidth::Four => 4,
            IoWidth::Eight => 8,
        }
    }
}

mod id {
    pub const DIGITAL_INPUT_2: u16 = 2;
    pub const DIGITAL_INPUT_3: u16 = 3;
    pub const SOS: u16 = 4;
    pub const IGNITION: u16 = 5;
    pub const OBD_TEMPERATURE: u16 = 96;
    pub const OBD_FUEL_LEVEL: u16 = 98;
    pub const OBD_ENGINE_LOAD: u16 = 103;
    pub const TEMPERATURE: u16 = 115;
    pub const FUEL_LEVEL: u16 = 207;
    pub const VIRTUAL_IGNITION: u16 = 251;

    pub const BATTERY: u16 = 29;
    pub const OBD_RPM: u16 = 94;
    pub const OBD_AVG_CONSUMPTION: u16 = 100;
    pub const OBD_ENGINE_HOURS: u16 = 107;
    pub const AVG_CONSUMPTION: u16 = 116;
    pub const RPM: u16 = 197;
    pub const TRIP_FUEL: u16 = 205;

    pub const VIRTUAL_ODOMETER: u16 = 65;
    pub const TOTAL_DISTANCE: u16 = 114;
    pub const ENGINE_HOURS: u16 = 203;
    pub const TOTAL_FUEL_USED: u16 = 208;
}

/// Ignition edge reported on [`IGNITION_EVENT_ID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnitionEdge {
    On,
    Off,
}

/// Values collected from one record's IO elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IoValues {
    pub ignition_on: bool,
    pub sos: bool,
    pub ignition_edge: Option<IgnitionEdge>,
    pub virtual_odometer_km: f64,
    pub diagnostics: DiagnosticsSnapshot,
}

impl IoValues {
    /// Apply one element. Unknown ids are traced and ignored.
    pub fn apply(&mut self, width: IoWidth, io_id: u16, value: u64, event_id: u16) {
        let diag = &mut self.diagnostics;
        match (width, io_id) {
            (IoWidth::One, id::DIGITAL_INPUT_2 | id::DIGITAL_INPUT_3) => {
                trace!(io_id, value, "Digital input");
            }
            (IoWidth::One, id::SOS) => {
                if value == 1 {
                    self.sos = true;
                }
            }
            (IoWidth::One, id::IGNITION | id::VIRTUAL_IGNITION) => {
                self.ignition_on = value == 1;
                if event_id == IGNITION_EVENT_ID {
                    self.ignition_edge = Some(if self.ignition_on {
                        IgnitionEdge::On
                    } else {
                        IgnitionEdge::Off
                    });
                }
            }
            (IoWidth::One, id::OBD_TEMPERATURE) => diag.temp_c = value as i32,
            (IoWidth::One, id::OBD_FUEL_LEVEL) => diag.fuel_pct = value as f32,
            (IoWidth::One, id::OBD_ENGINE_LOAD) => diag.engine_load_pct = value as f32,
            (IoWidth::One, id::TEMPERATURE) => {
                diag.temp_c = if self.ignition_on { value as i32 - 40 } else { 0 };
            }
            (IoWidth::One, id::FUEL_LEVEL) => {
                // 251..=255 flag an unavailable sensor
                diag.fuel_pct = if value < 251 { value as f32 * 0.4 } else { 0.0 };
            }

            (IoWidth::Two, id::BATTERY) => diag.battery_v = value as f32 / 1000.0,
            (IoWidth::Two, id::OBD_RPM) => diag.rpm = (value as f64 * 0.25) as u32,
            (IoWidth::Two, id::OBD_AVG_CONSUMPTION) => diag.avg_consumption_lph = value as f32,
            (IoWidth::Two, id::OBD_ENGINE_HOURS) => diag.engine_hours_total = value as f32,
            (IoWidth::Two, id::AVG_CONSUMPTION) => {
                diag.avg_consumption_lph = (value as f64 * 0.05) as f32;
            }
            (IoWidth::Two, id::RPM) => diag.rpm = (value as f64 * 0.125) as u32,
            (IoWidth::Two, id::TRIP_FUEL) => diag.trip_fuel_l = value as f32,

            (IoWidth::Four, id::VIRTUAL_ODOMETER) => {
                self.virtual_odometer_km = value as f64 / 1000.0;
            }
            (IoWidth::Four, id::TOTAL_DISTANCE) => {
                diag.odometer_km_total = (value * 5 / 1000) as u32;
            }
            (IoWidth::Four, id::ENGINE_HOURS) => {
                diag.engine_hours_total = (value as f64 * 0.05) as f32;
            }
            (IoWidth::Four, id::TOTAL_FUEL_USED) => {
                if diag.fuel_total_l == 0.0 {
                    diag.fuel_total_l = (value as f64 * 0.5) as f32;
                }
            }

            _ => trace!(io_id, value, width = width.value_len(), "Unknown IO element"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn applied(width: IoWidth, io_id: u16, value: u64) -> IoValues {
        let mut io = IoValues::default();
        io.apply(width, io_id, value, 0);
        io
    }

    #[rstest]
    #[case(IoWidth::Two, 94, 4800, 1200)]
    #[case(IoWidth::Two, 197, 9600, 1200)]
    fn test_rpm_scaling(
        #[case] width: IoWidth,
        #[case] io_id: u16,
        #[case] raw: u64,
        #[case] rpm: u32,
    ) {
        assert_eq!(applied(width, io_id, raw).diagnostics.rpm, rpm);
    }

    #[rstest]
    #[case(100, 40.0)]
    #[case(250, 100.0)]
    #[case(251, 0.0)]
    #[case(255, 0.0)]
    fn test_fuel_level(#[case] raw: u64, #[case] pct: f32) {
        assert_eq!(applied(IoWidth::One, 207, raw).diagnostics.fuel_pct, pct);
    }

    #[test]
    fn test_distance_and_hours() {
        let mut io = IoValues::default();
        io.apply(IoWidth::Four, 65, 123_456, 0);
        io.apply(IoWidth::Four, 114, 40_000, 0);
        io.apply(IoWidth::Four, 203, 200, 0);
        io.apply(IoWidth::Two, 29, 12_600, 0);

        assert_eq!(io.virtual_odometer_km, 123.456);
        assert_eq!(io.diagnostics.odometer_km_total, 200);
        assert_eq!(io.diagnostics.engine_hours_total, 10.0);
        assert_eq!(io.diagnostics.battery_v, 12.6);
    }

    #[test]
    fn test_total_fuel_is_set_once() {
        let mut io = IoValues::default();
        io.apply(IoWidth::Four, 208, 100, 0);
        io.apply(IoWidth::Four, 208, 300, 0);
        assert_eq!(io.diagnostics.fuel_total_l, 50.0);
    }

    #[test]
    fn test_temperature_depends_on_ignition() {
        let mut io = IoValues::default();
        io.apply(IoWidth::One, 115, 65, 0);
        assert_eq!(io.diagnostics.temp_c, 0);

        io.apply(IoWidth::One, 5, 1, 0);
        io.apply(IoWidth::One, 115, 65, 0);
        assert_eq!(io.diagnostics.temp_c, 25);
    }

    #[rstest]
    #[case(5, 1, Some(IgnitionEdge::On))]
    #[case(5, 0, Some(IgnitionEdge::Off))]
    #[case(0, 1, None)]
    fn test_ignition_edge(
        #[case] event_id: u16,
        #[case] value: u64,
        #[case] edge: Option<IgnitionEdge>,
    ) {
        let mut io = IoValues::default();
        io.apply(IoWidth::One, 251, value, event_id);
        assert_eq!(io.ignition_on, value == 1);
        assert_eq!(io.ignition_edge, edge);
    }

    #[test]
    fn test_width_mismatch_is_ignored() {
        // Id 65 is only meaningful as a 4-byte element.
        let io = applied(IoWidth::One, 65, 7);
        assert_eq!(io, IoValues::default());
    }

    #[test]
    fn test_sos() {
        assert!(applied(IoWidth::One, 4, 1).sos);
        assert!(!applied(IoWidth::One, 4, 0).sos);
    }
}
