//! Core domain model for the fleetgate telemetry ingestion service.
//!
//! Everything the protocol decoders, the alarm engine and the storage
//! collaborators exchange lives here: canonical position and diagnostics
//! records, the device/tracked-object/zone catalog entities, alarm codes and
//! the alarm catalog, plus the small amount of geodesy the alarm engine needs.

pub mod catalog;
pub mod constants;
pub mod error;
pub mod geo;
pub mod types;

pub use catalog::AlarmCatalog;
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
