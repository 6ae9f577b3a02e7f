//! TCP ingestion for fleetgate.
//!
//! One [`Listener`] per protocol accepts device connections and dispatches
//! them to handlers running the shared [`Pipeline`]; the [`ServerManager`]
//! owns the listeners and stops them together.
//!
//! # Example
//!
//! ```no_run
//! use fleetgate_alarm::{AlarmEngine, Notifier};
//! use fleetgate_core::{AlarmCatalog, Protocol};
//! use fleetgate_network::{ListenerConfig, Pipeline, ServerConfig, ServerManager};
//! use fleetgate_storage::{MemoryDirectory, MemorySink};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Arc::new(AlarmCatalog::with_defaults());
//! let pipeline = Pipeline::new(
//!     Arc::new(MemoryDirectory::new()),
//!     AlarmEngine::new(Arc::clone(&catalog)),
//!     Notifier::new(Arc::new(MemorySink::new()), catalog),
//! );
//!
//! let mut manager = ServerManager::new(
//!     Arc::new(pipeline),
//!     ServerConfig::default(),
//!     Protocol::ALL.map(ListenerConfig::for_protocol),
//! );
//! manager.start_all().await?;
//! tokio::signal::ctrl_c().await?;
//! manager.shutdown_all().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod listener;
mod manager;
mod pipeline;
mod tracker;

pub use config::{DispatchMode, ListenerConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use listener::{Listener, ListenerStatus};
pub use manager::ServerManager;
pub use pipeline::{CloseReason, Pipeline};
pub use tracker::{ConnectionGuard, ConnectionTracker};
