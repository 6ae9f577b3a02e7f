use crate::error::{StorageError, StorageResult};
use crate::repositories::{SqliteDirectory, SqliteReportSink};
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite connection settings for the directory and report history.
///
/// Every listener worker may persist concurrently, so the pool is sized for
/// write bursts rather than for the handful of startup lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, created on first open
    pub database_path: String,

    pub max_connections: u32,
    pub min_connections: u32,

    /// How long a worker waits for a pooled connection before the persist
    /// step fails
    pub acquire_timeout: Duration,

    /// How long SQLite waits on a locked database before giving up
    pub busy_timeout: Duration,

    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "fleetgate.db".to_string(),
            max_connections: 16,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(10),
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }

    fn connect_options(&self) -> StorageResult<SqliteConnectOptions> {
        if self.min_connections > self.max_connections {
            return Err(StorageError::Configuration(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", self.database_path))
            .map_err(|e| StorageError::Configuration(format!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging();
        Ok(options)
    }
}

/// Shared SQLite pool behind [`SqliteDirectory`] and [`SqliteReportSink`].
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and by default migrate) the database described by `config`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use fleetgate_storage::connection::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = DatabaseConfig::new("/var/lib/fleetgate/fleetgate.db").max_connections(32);
    ///
    /// let db = Database::new(config).await?;
    /// let directory = db.directory();
    /// let sink = db.report_sink();
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        let options = config.connect_options()?;

        if let Some(parent) = Path::new(&config.database_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        if config.auto_migrate {
            db.migrate().await?;
        }

        tracing::info!(
            path = %config.database_path,
            max_connections = config.max_connections,
            "database opened"
        );
        Ok(db)
    }

    /// Migrated in-memory database for tests and demos.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Each connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run the embedded migrations from `migrations/`.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Directory lookups over this pool.
    pub fn directory(&self) -> SqliteDirectory {
        SqliteDirectory::new(self.pool.clone())
    }

    /// Report sink over this pool, with its own broadcast channel.
    pub fn report_sink(&self) -> SqliteReportSink {
        SqliteReportSink::new(self.pool.clone())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sized_for_concurrent_workers() {
        let config = DatabaseConfig::default();

        assert_eq!(config.database_path, "fleetgate.db");
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert!(config.auto_migrate);
    }

    #[test]
    fn test_builder_overrides() {
        let config = DatabaseConfig::new("positions.db")
            .max_connections(4)
            .min_connections(1)
            .busy_timeout(Duration::from_secs(1))
            .auto_migrate(false);

        assert_eq!(config.database_path, "positions.db");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(!config.auto_migrate);
        assert!(config.connect_options().is_ok());
    }

    #[test]
    fn test_inverted_pool_bounds_rejected() {
        let config = DatabaseConfig::new("positions.db")
            .max_connections(1)
            .min_connections(4);

        assert!(matches!(
            config.connect_options(),
            Err(StorageError::Configuration(_))
        ));
    }
}
