//! Ingestion-wide constants.
//!
//! This module centralizes the limits and well-known values shared by the
//! protocol decoders, the alarm engine and the network layer. Listener ports
//! and alarm codes are fixed by the devices deployed in the field; changing
//! them breaks compatibility with already-provisioned hardware.
//!
//! # Categories
//!
//! | Category | Constants |
//! |----------|-----------|
//! | Listener ports | [`NEON_PORT`], [`GENEKO_PORT`], [`RUPTELA_PORT`] |
//! | Data quality | [`EPOCH_FLOOR_SECS`], [`CLOCK_SKEW_SECS`], [`MAX_SPEED_KMH`] |
//! | Alarm thresholds | [`STOP_SPEED_KMH`], [`FUEL_CHECK_MAX_SPEED_KMH`], [`FUEL_THEFT_DROP_PCT`] |
//! | Framing | [`MAX_BINARY_FRAME_LEN`], [`MAX_TEXT_BUFFER_SIZE`], [`MAX_INVALID_FRAMES`] |
//! | Alarm codes | [`ALARM_REGULAR`] and friends |
//!
//! # Usage
//!
//! ```
//! use fleetgate_core::constants::*;
//!
//! fn plausible(speed_kmh: u16) -> bool {
//!     speed_kmh < MAX_SPEED_KMH
//! }
//!
//! assert!(plausible(120));
//! assert!(!plausible(250));
//! ```

// ============================================================================
// Listener Ports
// ============================================================================

/// Default port of the `>`-delimited text protocol listener.
pub const NEON_PORT: u16 = 9000;

/// Default port of the `<fox>` tag-delimited text protocol listener.
pub const GENEKO_PORT: u16 = 9030;

/// Default port of the length-prefixed binary protocol listener.
pub const RUPTELA_PORT: u16 = 9040;

// ============================================================================
// Data Quality
// ============================================================================

/// Earliest acceptable report timestamp: 2019-07-01T00:00:00Z.
///
/// Devices that lost their RTC report dates around the Unix epoch or the GPS
/// week rollover; anything before this floor is dropped.
pub const EPOCH_FLOOR_SECS: i64 = 1_561_939_200;

/// Maximum tolerated clock skew into the future, in seconds.
pub const CLOCK_SKEW_SECS: i64 = 60;

/// Speeds at or above this value (km/h) are GPS noise and are dropped.
pub const MAX_SPEED_KMH: u16 = 250;

// ============================================================================
// Alarm Thresholds
// ============================================================================

/// Speeds above this value (km/h) count as motion and clear the stop anchor.
pub const STOP_SPEED_KMH: u16 = 5;

/// Fuel-theft evaluation only runs below this speed (km/h).
pub const FUEL_CHECK_MAX_SPEED_KMH: u16 = 6;

/// Fuel level drop (percentage points) since the stop anchor that raises a
/// fuel-theft alarm.
pub const FUEL_THEFT_DROP_PCT: f32 = 3.0;

/// Maximum length of an event text after address resolution.
pub const MAX_EVENT_TEXT_LEN: usize = 250;

/// Mean Earth radius in meters, used by the haversine distance.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// ============================================================================
// Framing
// ============================================================================

/// Largest acceptable binary payload length (the value of the 2-byte header).
///
/// Lengths of zero or above this limit mean the stream is desynchronized; the
/// reassembler drops its whole buffer.
pub const MAX_BINARY_FRAME_LEN: usize = 1024;

/// Upper bound for buffered text awaiting a terminator.
///
/// A peer that never sends a terminator would otherwise grow the buffer
/// without limit.
pub const MAX_TEXT_BUFFER_SIZE: usize = 64 * 1024;

/// Consecutive invalid text frames tolerated before the connection is closed.
pub const MAX_INVALID_FRAMES: u32 = 3;

/// Consecutive decode failures tolerated before the connection is closed.
pub const MAX_DECODE_FAILURES: u32 = 3;

/// Read size used by the network layer for each socket read.
pub const READ_BUFFER_SIZE: usize = 1024;

// ============================================================================
// Timeouts
// ============================================================================

/// Socket read timeout in seconds. An idle device is disconnected after this.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Per-listener grace period for workers to finish during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Overall deadline for stopping every listener.
pub const MANAGER_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Alarm Codes
// ============================================================================

/// Regular position report, no alarm.
pub const ALARM_REGULAR: &str = "0";

/// Speed limit exceeded.
pub const ALARM_SPEEDING: &str = "6013";

/// Stationary longer than the configured dwell.
pub const ALARM_STATIONARY: &str = "1095";

/// Fuel level dropped while stopped.
pub const ALARM_FUEL_THEFT: &str = "1111";

/// Left a geofence.
pub const ALARM_ZONE_EXIT: &str = "1100";

/// Entered a geofence.
pub const ALARM_ZONE_ENTRY: &str = "1101";

/// SOS button pressed.
pub const ALARM_SOS: &str = "6022";

/// Ignition on (armed).
pub const ALARM_IGNITION_ON: &str = "1092";

/// Ignition off (disarmed).
pub const ALARM_IGNITION_OFF: &str = "1091";
