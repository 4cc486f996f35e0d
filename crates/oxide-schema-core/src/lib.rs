//! # oxide-schema-core
//!
//! Backend-agnostic SQL schema derivation, schema sync and query
//! construction.
//!
//! This crate provides:
//! - A column type system that maps struct fields plus declarative tags to
//!   backend column definitions, with value conversion both ways
//! - Table specifications with tag-declared indexes
//! - Live schema introspection and a diff that emits the ALTER/CREATE/DROP
//!   statements needed to reconcile a table with its specification
//! - A parameterized query builder with joins, subqueries and unions
//! - MySQL, SQLite and ClickHouse backends behind one [`backend::Backend`]
//!   trait, plus a registry to look them up by name
//!
//! The crate does not talk to databases itself. Anything that runs SQL
//! goes through [`connection::Connection`], implemented by a driver crate.
//!
//! ## Declaring a table
//!
//! ```rust
//! use oxide_schema_core::backend::MYSQL;
//! use oxide_schema_core::table::TableSpec;
//! use oxide_schema_derive::Table;
//!
//! #[derive(Table)]
//! #[table(name = "users")]
//! struct User {
//!     #[column(primary, auto_increment)]
//!     id: u64,
//!     #[column(width = 64, nullable = false, index)]
//!     name: String,
//!     age: Option<i32>,
//! }
//!
//! let users = TableSpec::from_decl::<User>(&MYSQL).unwrap();
//! let statements = users.create_sql();
//! assert_eq!(
//!     statements[0],
//!     "CREATE TABLE IF NOT EXISTS `users` (\n    \
//!      `id` BIGINT(20) UNSIGNED NOT NULL AUTO_INCREMENT,\n    \
//!      `name` VARCHAR(64) CHARACTER SET 'utf8mb4' COLLATE 'utf8mb4_unicode_ci' NOT NULL,\n    \
//!      `age` INT(11),\n    \
//!      PRIMARY KEY (`id`)\n\
//!      ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;"
//! );
//! assert_eq!(statements[1], "CREATE INDEX `ix_users_name` ON `users` (`name`);");
//! ```
//!
//! ## Building a query
//!
//! All values are bound as parameters:
//!
//! ```rust
//! # use oxide_schema_core::backend::MYSQL;
//! # use oxide_schema_core::table::TableSpec;
//! # use oxide_schema_derive::Table;
//! # #[derive(Table)]
//! # #[table(name = "users")]
//! # struct User {
//! #     #[column(primary, auto_increment)]
//! #     id: u64,
//! #     #[column(width = 64)]
//! #     name: String,
//! # }
//! let users = TableSpec::from_decl::<User>(&MYSQL).unwrap().instance();
//! let user_input = "'; DROP TABLE users; --";
//! let (sql, params) = users
//!     .query()
//!     .select([users.field("id").unwrap()])
//!     .filter(users.field("name").unwrap().eq(user_input))
//!     .to_sql()
//!     .unwrap();
//!
//! assert_eq!(sql, "SELECT `t1`.`id` FROM `users` AS `t1` WHERE `t1`.`name` = ?");
//! assert_eq!(params.len(), 1);
//! ```

pub mod backend;
pub mod columns;
pub mod connection;
pub mod dml;
pub mod error;
pub mod query;
pub mod sync;
pub mod table;
pub mod tristate;
pub mod value;

pub use backend::Backend;
pub use columns::{ColumnDecl, ColumnKind, ColumnSpec};
pub use connection::{Connection, StringMap};
pub use error::{DeclarationError, Result, SchemaError};
pub use query::{Condition, Field, Query, SubQuery, TableRef, Union};
pub use sync::{SyncOptions, SyncOutcome, SyncReport};
pub use table::{IndexSpec, TableDecl, TableSpec};
pub use tristate::TriState;
pub use value::{SqlValue, ToSqlValue, Value};
