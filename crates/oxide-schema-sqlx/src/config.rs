//! Connection configuration.

use std::env;

use oxide_schema_core::backend::{registry, Backend};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::connection::SqlxConnection;
use crate::error::{DriverError, Result};

/// Default database URL.
pub const DEFAULT_URL: &str = "sqlite:db.sqlite3";

/// Default pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: String,
    /// Maximum pool size.
    pub max_connections: u32,
    /// Registered backend name used to render SQL.
    pub backend: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            backend: "sqlite".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Reads `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS` and
    /// `DATABASE_BACKEND`, falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] when `DATABASE_MAX_CONNECTIONS` is
    /// not a positive integer.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = env::var("DATABASE_URL") {
            config.url = url;
        }
        if let Ok(max) = env::var("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = max
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    DriverError::Config(format!("DATABASE_MAX_CONNECTIONS must be positive, got '{max}'"))
                })?;
        }
        if let Ok(backend) = env::var("DATABASE_BACKEND") {
            config.backend = backend;
        }
        Ok(config)
    }

    /// Resolves the configured backend through the global registry.
    ///
    /// # Errors
    ///
    /// Returns [`oxide_schema_core::SchemaError::UnknownBackend`] for an
    /// unregistered name.
    pub fn backend(&self) -> oxide_schema_core::Result<&'static dyn Backend> {
        registry::lookup(&self.backend)
    }

    /// Opens a pool, creating the database file when missing. Only the
    /// SQLite backend is served.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::UnsupportedBackend`] for other backends and
    /// [`DriverError::Database`] when the pool cannot connect.
    pub async fn connect(&self) -> Result<SqlxConnection> {
        if self.backend != "sqlite" {
            return Err(DriverError::UnsupportedBackend(self.backend.clone()));
        }
        let options = self
            .url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .with_regexp();
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await?;
        Ok(SqlxConnection::new(pool))
    }
}
