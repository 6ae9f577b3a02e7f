use fleetgate_core::Protocol;
use fleetgate_protocol::DecodeError;
use fleetgate_storage::StorageError;
use thiserror::Error;

/// Errors that can occur while running the listeners or serving a connection
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing or decoding failed
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Device directory lookup failed
    #[error("Directory error: {0}")]
    Directory(#[from] StorageError),

    /// `start` called on a listener that is already accepting
    #[error("Listener for {0} is already running")]
    AlreadyRunning(Protocol),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ServerError {
    /// Returns `true` if the connection that produced this error must be closed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            ServerError::Io(_) => true,
            ServerError::Decode(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Returns `true` for directory misses, which keep the connection open
    /// and do not count toward the failure bound.
    #[must_use]
    pub fn is_domain(&self) -> bool {
        matches!(self, ServerError::Decode(e) if e.is_domain())
    }

    /// Returns `true` for errors that count toward the consecutive decode
    /// failure bound.
    #[must_use]
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, ServerError::Decode(e) if !e.is_fatal() && !e.is_domain())
    }
}

/// Specialized result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
