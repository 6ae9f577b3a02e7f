//! fleetgate: telemetry ingestion server.
//!
//! Wires the SQLite collaborators, the alarm engine and the listeners
//! together, then runs until Ctrl-C or SIGTERM.

use anyhow::Context;
use clap::Parser;
use fleetgate_alarm::{AlarmEngine, Notifier};
use fleetgate_core::AlarmCatalog;
use fleetgate_network::{Pipeline, ServerManager};
use fleetgate_storage::{Database, DeviceDirectory};
use std::sync::Arc;
use tracing::{info, warn};

mod args;
mod config;
mod logging;

use args::Args;
use config::{ConfigFile, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let file = match args.config_path() {
        Some(path) => ConfigFile::load(&path)?,
        None => ConfigFile::default(),
    };
    let settings = Settings::resolve(&args, file);
    logging::init(&settings.logging)?;

    info!(version = fleetgate_core::VERSION, "starting fleetgate");

    let db = Database::new(settings.database.clone())
        .await
        .context("failed to open database")?;
    let directory = Arc::new(db.directory());
    let sink = Arc::new(db.report_sink());

    let catalog = Arc::new(load_catalog(directory.as_ref()).await?);
    let engine = AlarmEngine::with_config(Arc::clone(&catalog), settings.engine);
    let notifier = Notifier::new(sink, catalog);
    let pipeline = Pipeline::new(directory, engine, notifier)
        .with_ruptela(settings.ruptela.clone())
        .with_read_timeout(settings.server.read_timeout());

    let mut manager = ServerManager::new(
        Arc::new(pipeline),
        settings.server.clone(),
        settings.listeners.clone(),
    );
    manager.start_all().await.context("failed to start listeners")?;

    for status in manager.status() {
        if let Some(address) = status.address {
            info!(protocol = %status.protocol, address = %address, "listening");
        }
    }

    shutdown_signal().await?;
    info!("shutdown signal received");

    manager.shutdown_all().await;
    db.close().await;
    Ok(())
}

/// Alarm catalog from the directory, falling back to the built-in codes when
/// the table is empty.
async fn load_catalog<D: DeviceDirectory>(directory: &D) -> anyhow::Result<AlarmCatalog> {
    let types = directory
        .lookup_alarm_types()
        .await
        .context("failed to load alarm types")?;

    if types.is_empty() {
        warn!("alarm type table is empty, using built-in catalog");
        return Ok(AlarmCatalog::with_defaults());
    }
    info!(alarm_types = types.len(), "alarm catalog loaded");
    Ok(AlarmCatalog::new(types))
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl-C"),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")
}
