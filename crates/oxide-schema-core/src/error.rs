//! Error types for schema declaration, query construction and schema sync.

use thiserror::Error;

/// A malformed column or table declaration.
///
/// These errors describe a bug in the schema declaration itself, not a
/// runtime condition. They are surfaced while table specifications are
/// built, which normally happens once at process start, and callers are
/// expected to abort setup when they see one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// The column kind or indirection does not allow a default value.
    #[error("column `{column}` cannot have a default value: {reason}")]
    DefaultNotAllowed {
        /// Column name.
        column: String,
        /// Why the default is rejected.
        reason: String,
    },

    /// A recognized tag carries a value that cannot be interpreted.
    #[error("column `{column}` has invalid `{tag}` tag value `{value}`")]
    InvalidTag {
        /// Column name.
        column: String,
        /// Tag key.
        tag: String,
        /// Offending value.
        value: String,
    },

    /// The Rust type of a declared field has no column mapping.
    #[error("column `{column}` has unsupported type `{rust_type}`")]
    UnsupportedType {
        /// Column name.
        column: String,
        /// Rust type as written in the declaration.
        rust_type: String,
    },

    /// Two columns of one table share a name.
    #[error("table `{table}` declares column `{column}` more than once")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// An index refers to a column the table does not declare.
    #[error("index on table `{table}` refers to unknown column `{column}`")]
    UnknownIndexColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
}

/// Errors raised by query construction, value conversion and schema sync.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Malformed schema declaration.
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    /// A field name was looked up in a scope that does not provide it.
    #[error("unknown field `{field}` in {scope}")]
    UnknownField {
        /// Human readable description of the scope searched.
        scope: String,
        /// The missing field name.
        field: String,
    },

    /// Queries combined by UNION project a different number of fields.
    #[error("union member projects {found} fields, expected {expected}")]
    UnionFieldCount {
        /// Field count of the first member.
        expected: usize,
        /// Field count of the offending member.
        found: usize,
    },

    /// A UNION was requested over no queries.
    #[error("union requires at least one query")]
    EmptyUnion,

    /// A function template does not have one `{}` per argument.
    #[error("function template `{template}` expects {placeholders} arguments, got {args}")]
    InvalidFunctionTemplate {
        /// The template text.
        template: String,
        /// Number of `{}` substitution points found.
        placeholders: usize,
        /// Number of arguments supplied.
        args: usize,
    },

    /// No backend is registered under the requested name.
    #[error("no backend registered as `{0}`")]
    UnknownBackend(String),

    /// A value could not be converted for a column.
    #[error("cannot convert `{value}` for column `{column}`: {reason}")]
    Conversion {
        /// Column name.
        column: String,
        /// The offending value, rendered for diagnostics.
        value: String,
        /// Why the conversion failed.
        reason: String,
    },

    /// A row lookup that expects a result matched nothing.
    #[error("no matching row found")]
    NotFound,

    /// An update or delete lacks a value for a primary key column.
    #[error("missing primary key column `{column}` for table `{table}`")]
    MissingPrimaryKey {
        /// Table name.
        table: String,
        /// Primary key column without a value.
        column: String,
    },

    /// An update carries no column to set.
    #[error("nothing to update in table `{table}`")]
    EmptyUpdate {
        /// Table name.
        table: String,
    },

    /// The live primary key differs and the backend cannot alter it.
    #[error("primary key of table `{table}` differs from the live schema and cannot be altered")]
    PrimaryKeyChange {
        /// Table name.
        table: String,
    },

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reported by the database driver, passed through verbatim.
    #[error("driver error: {0}")]
    Driver(Box<dyn std::error::Error + Send + Sync>),
}

impl SchemaError {
    /// Wraps a driver error.
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Driver(Box::new(err))
    }

    /// Returns `true` for the "no matching row" outcome.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Result type alias for schema operations.
pub type Result<T, E = SchemaError> = std::result::Result<T, E>;
