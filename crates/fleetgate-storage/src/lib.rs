//! Collaborators behind the ingestion core.
//!
//! The decoders and the alarm engine only see two traits:
//!
//! - [`DeviceDirectory`] - read-only lookups of devices, zones, alarm
//!   subscribers and the alarm type catalog
//! - [`ReportSink`] - persistence, live broadcast and subscriber notification
//!   of accepted reports
//!
//! Two implementations ship with the crate. [`SqliteDirectory`] and
//! [`SqliteReportSink`] sit on a shared [`Database`] pool with embedded
//! migrations; [`MemoryDirectory`] and [`MemorySink`] back tests and demos.
//!
//! # Example
//!
//! ```no_run
//! use fleetgate_storage::{Database, DatabaseConfig, DeviceDirectory, SqliteDirectory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("fleetgate.db")).await?;
//! let directory = SqliteDirectory::new(db.pool().clone());
//!
//! if let Some(device) = directory.lookup_device("359633100458590").await? {
//!     println!("linked: {}", device.tracked_object.is_some());
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryDirectory, MemorySink};
pub use repositories::{DeviceDirectory, ReportSink, SqliteDirectory, SqliteReportSink};
