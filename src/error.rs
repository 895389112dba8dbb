//! Error types for dualbase
//!
//! This module defines the error hierarchy used throughout the crate.
//! We use `thiserror` for library-style errors with clear error chains.
//!
//! "Not found" and "not yours" are deliberately absent: repositories report
//! them as empty results or zero affected rows, never as errors.

use std::io;

/// Main error type for dualbase
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Failed to establish or keep a connection to the backend
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement rejected by the backend (syntax, constraint, RPC failure)
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// The backend cannot perform the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Operation attempted on a committed or rolled-back transaction
    #[error("Transaction already completed")]
    TransactionCompleted,

    /// The connection pool has been closed
    #[error("Connection pool is closed")]
    PoolClosed,

    /// Checkout or connect exceeded the pool's connect timeout
    #[error("Operation timed out")]
    Timeout,

    /// A returned row could not be mapped to the expected shape
    #[error("Failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Input rejected before it reached the backend
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DbError {
    /// True for failures that originate at the backend or its transport.
    pub fn is_backend_error(&self) -> bool {
        matches!(
            self,
            DbError::ConnectionFailed(_)
                | DbError::QueryFailed(_)
                | DbError::PoolClosed
                | DbError::Timeout
        )
    }

    pub(crate) fn decode(column: &str, message: impl Into<String>) -> Self {
        DbError::Decode {
            column: column.to_string(),
            message: message.into(),
        }
    }
}

impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            DbError::ConnectionFailed(err.to_string())
        } else {
            // Display of a DbError from the server is just "db error"; the
            // underlying source carries the message and SQLSTATE.
            match err.as_db_error() {
                Some(db) => DbError::QueryFailed(format!("{} ({})", db.message(), db.code().code())),
                None => DbError::QueryFailed(err.to_string()),
            }
        }
    }
}

impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        use deadpool_postgres::PoolError;
        match err {
            PoolError::Timeout(_) => DbError::Timeout,
            PoolError::Closed => DbError::PoolClosed,
            PoolError::Backend(e) => DbError::ConnectionFailed(e.to_string()),
            other => DbError::ConnectionFailed(other.to_string()),
        }
    }
}

/// Configuration loading/parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A required setting is absent
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Specialized Result type for dualbase operations
pub type Result<T> = std::result::Result<T, Error>;

/// Specialized Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Specialized Result type for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
