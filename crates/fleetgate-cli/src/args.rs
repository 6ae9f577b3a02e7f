use clap::{Parser, ValueEnum};
use fleetgate_network::DispatchMode;
use std::path::PathBuf;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "fleetgate.toml";

/// fleetgate - telemetry ingestion server for GPS tracking devices
#[derive(Parser, Debug, Default)]
#[command(name = "fleetgate", author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'f', long)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// Host the listeners bind to
    #[arg(long)]
    pub bind_host: Option<String>,

    /// Port for the `>`-delimited text protocol
    #[arg(long)]
    pub neon_port: Option<u16>,

    /// Port for the `</fox>`-delimited text protocol
    #[arg(long)]
    pub geneko_port: Option<u16>,

    /// Port for the binary protocol
    #[arg(long)]
    pub ruptela_port: Option<u16>,

    /// How accepted connections are handed to handlers
    #[arg(long, value_enum)]
    pub dispatch: Option<DispatchArg>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DispatchArg {
    Pooled,
    PerConnection,
}

impl From<DispatchArg> for DispatchMode {
    fn from(arg: DispatchArg) -> Self {
        match arg {
            DispatchArg::Pooled => DispatchMode::Pooled,
            DispatchArg::PerConnection => DispatchMode::PerConnection,
        }
    }
}

impl Args {
    /// Explicit `--config`, else `fleetgate.toml` if it exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            default_path.exists().then_some(default_path)
        })
    }
}
