//! # oxide-schema-sqlx
//!
//! sqlx driver for `oxide-schema-core`.
//!
//! [`SqlxConnection`] implements the core's `Connection` trait over a
//! SQLite pool, so table specifications can be synced and queries run
//! against a live database:
//!
//! ```rust,no_run
//! use oxide_schema_core::backend::SQLITE;
//! use oxide_schema_core::sync::SyncOptions;
//! use oxide_schema_core::table::TableSpec;
//! use oxide_schema_derive::Table;
//! use oxide_schema_sqlx::DatabaseConfig;
//!
//! #[derive(Table)]
//! struct Ticket {
//!     #[column(auto_increment)]
//!     id: i64,
//!     #[column(width = 128, charset = "ascii")]
//!     user_id: String,
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = DatabaseConfig::from_env()?.connect().await?;
//! let tickets = TableSpec::from_decl::<Ticket>(&SQLITE)?;
//! let outcome = tickets.sync(&conn, &SyncOptions::default()).await?;
//! assert!(outcome.after.is_in_sync());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod demo;
pub mod error;

pub use config::DatabaseConfig;
pub use connection::SqlxConnection;
pub use error::{DriverError, Result};
