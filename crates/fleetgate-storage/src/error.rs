use thiserror::Error;

/// Errors raised by the directory and report-sink collaborators.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Collaborator refused the operation
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
