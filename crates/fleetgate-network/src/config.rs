//! Listener and server configuration.

use fleetgate_core::Protocol;
use fleetgate_core::constants::{DEFAULT_READ_TIMEOUT_SECS, DEFAULT_SHUTDOWN_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ServerError, ServerResult};

/// How accepted sockets reach a connection handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Fixed pool of long-lived workers fed from a bounded queue
    #[default]
    Pooled,
    /// One task per accepted connection
    PerConnection,
}

/// Settings shared by every listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_host: String,

    /// Idle time after which a connection is closed
    pub read_timeout_secs: u64,

    /// How long a listener waits for its workers before aborting them
    pub shutdown_timeout_secs: u64,

    pub dispatch: DispatchMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            dispatch: DispatchMode::Pooled,
        }
    }
}

impl ServerConfig {
    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    pub fn shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.dispatch = mode;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// One listening port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub protocol: Protocol,
    pub enabled: bool,

    /// `0` asks the OS for an ephemeral port
    pub port: u16,

    /// Worker count in pooled mode
    pub workers: usize,

    /// Accepted sockets waiting for a worker
    pub queue_capacity: usize,
}

impl ListenerConfig {
    /// Defaults for `protocol`: its well-known port and a pool sized for the
    /// device population that usually speaks it.
    pub fn for_protocol(protocol: Protocol) -> Self {
        let workers = match protocol {
            Protocol::Neon => 100,
            Protocol::Geneko => 20,
            Protocol::Ruptela => 200,
        };
        Self {
            protocol,
            enabled: true,
            port: protocol.default_port(),
            workers,
            queue_capacity: workers * 4,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.workers == 0 {
            return Err(ServerError::Config(format!(
                "{} listener needs at least one worker",
                self.protocol
            )));
        }
        if self.queue_capacity == 0 {
            return Err(ServerError::Config(format!(
                "{} listener needs a non-empty queue",
                self.protocol
            )));
        }
        Ok(())
    }
}
