pub mod directory;
pub mod sink;

pub use directory::{DeviceDirectory, SqliteDirectory};
pub use sink::{ReportSink, SqliteReportSink};
