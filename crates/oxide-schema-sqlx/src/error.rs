//! Error types for the sqlx driver.

use oxide_schema_core::SchemaError;

/// Errors raised by the driver layer.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Database error reported by sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid connection configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The configured backend cannot be served by this driver.
    #[error("Backend '{0}' is not supported by the sqlx driver")]
    UnsupportedBackend(String),

    /// A parameter cannot be represented by the database.
    #[error("Cannot bind value: {0}")]
    Bind(String),
}

impl From<DriverError> for SchemaError {
    fn from(err: DriverError) -> Self {
        Self::driver(err)
    }
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
