//! Configuration file and its merge with the command line.
//!
//! Precedence is command line, then file, then library defaults.
//!
//! ```toml
//! [server]
//! bind_host = "0.0.0.0"
//! read_timeout_secs = 300
//! shutdown_timeout_secs = 5
//! dispatch = "pooled"          # or "per_connection"
//!
//! [listeners.ruptela]
//! port = 9040
//! workers = 200
//!
//! [listeners.geneko]
//! enabled = false
//!
//! [ruptela]
//! checksum_policy = "warn"     # or "reject"
//!
//! [alarms]
//! geofence_entry_requires_exit_flag = true
//!
//! [database]
//! path = "/var/lib/fleetgate/fleetgate.db"
//! max_connections = 16
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use anyhow::Context;
use fleetgate_alarm::EngineConfig;
use fleetgate_core::Protocol;
use fleetgate_network::{ListenerConfig, ServerConfig};
use fleetgate_protocol::RuptelaConfig;
use fleetgate_storage::DatabaseConfig;
use serde::Deserialize;
use std::path::Path;

use crate::args::Args;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub server: ServerConfig,
    pub listeners: ListenersSection,
    pub ruptela: RuptelaConfig,
    pub alarms: EngineConfig,
    pub database: DatabaseSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenersSection {
    pub neon: ListenerSection,
    pub geneko: ListenerSection,
    pub ruptela: ListenerSection,
}

impl ListenersSection {
    fn get(&self, protocol: Protocol) -> &ListenerSection {
        match protocol {
            Protocol::Neon => &self.neon,
            Protocol::Geneko => &self.geneko,
            Protocol::Ruptela => &self.ruptela,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerSection {
    pub enabled: Option<bool>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub path: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub json: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Logging settings after merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub verbose: bool,
    pub json: bool,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub listeners: Vec<ListenerConfig>,
    pub ruptela: RuptelaConfig,
    pub engine: EngineConfig,
    pub database: DatabaseConfig,
    pub logging: LogSettings,
}

impl Settings {
    pub fn resolve(args: &Args, file: ConfigFile) -> Self {
        let mut server = file.server;
        if let Some(host) = &args.bind_host {
            server.bind_host = host.clone();
        }
        if let Some(dispatch) = args.dispatch {
            server.dispatch = dispatch.into();
        }

        let listeners = Protocol::ALL
            .into_iter()
            .map(|protocol| {
                let section = file.listeners.get(protocol);
                let mut config = ListenerConfig::for_protocol(protocol);
                if let Some(enabled) = section.enabled {
                    config = config.enabled(enabled);
                }
                if let Some(workers) = section.workers {
                    config = config.workers(workers);
                }
                if let Some(capacity) = section.queue_capacity {
                    config = config.queue_capacity(capacity);
                }
                if let Some(port) = cli_port(args, protocol).or(section.port) {
                    config = config.port(port);
                }
                config
            })
            .collect();

        let mut database = DatabaseConfig::default();
        if let Some(path) = args
            .database
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .or(file.database.path)
        {
            database.database_path = path;
        }
        if let Some(max) = file.database.max_connections {
            database = database.max_connections(max);
        }

        let logging = LogSettings {
            level: file.logging.level.unwrap_or_else(|| "info".to_string()),
            verbose: args.verbose,
            json: args.json || file.logging.json.unwrap_or(false),
        };

        Self {
            server,
            listeners,
            ruptela: file.ruptela,
            engine: file.alarms,
            database,
            logging,
        }
    }
}

fn cli_port(args: &Args, protocol: Protocol) -> Option<u16> {
    match protocol {
        Protocol::Neon => args.neon_port,
        Protocol::Geneko => args.geneko_port,
        Protocol::Ruptela => args.ruptela_port,
    }
}
