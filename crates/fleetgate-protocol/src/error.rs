use thiserror::Error;

/// Errors raised while framing or decoding device traffic.
///
/// The variants fall into the classes the connection worker reacts to
/// differently:
///
/// - **fatal** ([`DecodeError::is_fatal`]): the stream cannot be trusted any
///   more, close the connection.
/// - **domain** ([`DecodeError::is_domain`]): the frame is well formed but
///   refers to something the directory does not know; skip the frame and keep
///   the connection open.
/// - everything else is a **decode** failure: skip the frame and count it
///   toward the consecutive-failure bound.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Declared binary frame length outside `(0, max]`
    #[error("Invalid frame length: {length} (max {max})")]
    InvalidFrameLength { length: usize, max: usize },

    /// Too many consecutive text frames without the protocol prefix
    #[error("Too many invalid frames: {0} in a row")]
    TooManyInvalidFrames(u32),

    /// A record or field ended before its declared size
    #[error("Truncated {what}: need {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// A field is present but cannot be interpreted
    #[error("Malformed {field}: {value}")]
    Malformed { field: &'static str, value: String },

    /// IMEI outside `1..=999_999_999_999_999`
    #[error("Invalid IMEI: {0}")]
    InvalidImei(u64),

    #[error("Unknown command: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Record count outside `1..=255`
    #[error("Invalid record count: {0}")]
    InvalidRecordCount(u8),

    #[error("Checksum mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Device {0} has no linked tracked object")]
    NoTrackedObject(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// Returns `true` if the connection must be closed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecodeError::TooManyInvalidFrames(_) | DecodeError::InvalidImei(_) | DecodeError::Io(_)
        )
    }

    /// Returns `true` for directory misses that leave the connection usable.
    #[must_use]
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            DecodeError::UnknownDevice(_) | DecodeError::NoTrackedObject(_)
        )
    }

    pub(crate) fn malformed(field: &'static str, value: impl Into<String>) -> Self {
        DecodeError::Malformed {
            field,
            value: value.into(),
        }
    }
}

/// Specialized result type for decoding operations
pub type DecodeResult<T> = Result<T, DecodeError>;
