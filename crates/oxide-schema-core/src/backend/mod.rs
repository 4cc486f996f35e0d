//! Backend dialects.
//!
//! A [`Backend`] carries every database-specific rule: identifier and
//! string quoting, column rendering, DDL generation, live schema
//! introspection and the handful of SQL functions whose syntax differs
//! between databases. Backends are stateless unit structs with a
//! `'static` instance, so they can be shared freely across threads.

pub mod clickhouse;
pub mod mysql;
pub mod registry;
pub mod sqlite;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::columns::{ColumnDecl, ColumnKind, ColumnSpec};
use crate::connection::StringMap;
use crate::error::{DeclarationError, Result};
use crate::sync::{LiveTable, TableChanges};
use crate::table::{IndexSpec, TableSpec};
use crate::value::SqlValue;

pub use clickhouse::{ClickHouseBackend, CLICKHOUSE};
pub use mysql::{MySqlBackend, MYSQL};
pub use sqlite::{SqliteBackend, SQLITE};

/// Matches a backtick-quoted identifier.
static QUOTED_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid identifier regex"));

/// Trait implemented by every database dialect.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Registry key of the backend.
    fn name(&self) -> &'static str;

    /// Quotes an identifier (table, column, alias).
    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Quotes a string literal.
    fn quote_string(&self, s: &str) -> String {
        SqlValue::Text(s.to_string()).to_sql_inline()
    }

    // ================================================================
    // Column type system
    // ================================================================

    /// Builds a column from a declaration, choosing the SQL type.
    ///
    /// # Errors
    ///
    /// Returns a [`DeclarationError`] for unsupported types and illegal
    /// tag combinations.
    fn column_from_decl(&'static self, decl: &ColumnDecl) -> Result<ColumnSpec, DeclarationError>;

    /// Backend specific declaration checks, run after generic validation.
    ///
    /// # Errors
    ///
    /// Returns a [`DeclarationError`] describing the rejected attribute.
    fn validate_column(&self, _column: &ColumnSpec) -> Result<(), DeclarationError> {
        Ok(())
    }

    /// Renders the column definition used in CREATE and ALTER statements.
    fn column_definition(&self, column: &ColumnSpec) -> String;

    /// Whether a live column already satisfies a desired one.
    fn columns_equivalent(&self, a: &ColumnSpec, b: &ColumnSpec) -> bool {
        self.column_definition(a) == self.column_definition(b)
    }

    /// Renders the `DEFAULT` operand of a column, if any.
    fn default_literal(&self, column: &ColumnSpec) -> Option<String> {
        let value = column.default_value()?;
        if column.kind().is_numeric() || is_sql_expression(value) {
            Some(value.to_string())
        } else {
            Some(self.quote_string(value))
        }
    }

    /// SQL expression yielding the current UTC time.
    fn current_time_sql(&self) -> &'static str;

    // ================================================================
    // DDL
    // ================================================================

    /// Whether secondary indexes are managed for this backend.
    fn supports_indexes(&self) -> bool {
        true
    }

    /// Columns the database reports as the primary key once `table` is
    /// created.
    fn effective_primary_key(&self, table: &TableSpec) -> Vec<String> {
        table.primary_key_names()
    }

    /// Statements creating the table and its indexes.
    fn create_table_sql(&self, table: &TableSpec) -> Vec<String>;

    /// Statement creating one index.
    fn create_index_sql(&self, table: &str, index: &IndexSpec) -> String {
        let unique = if index.is_unique() { "UNIQUE " } else { "" };
        format!(
            "CREATE {unique}INDEX {} ON {} ({});",
            self.quote_identifier(index.name()),
            self.quote_identifier(table),
            self.column_list(index.columns())
        )
    }

    /// Statement dropping one index.
    fn drop_index_sql(&self, table: &str, index: &IndexSpec) -> String;

    /// Statements applying a computed set of changes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SchemaError::PrimaryKeyChange`] when the change
    /// alters the primary key and the backend cannot express that.
    fn commit_table_change_sql(
        &self,
        table: &TableSpec,
        changes: &TableChanges,
    ) -> Result<Vec<String>>;

    /// Comma separated quoted column names.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ================================================================
    // Introspection
    // ================================================================

    /// Query listing the live columns of a table. Returns no rows when the
    /// table does not exist.
    fn columns_query(&self, table: &str) -> (String, Vec<SqlValue>);

    /// Query returning the DDL of a table and, where applicable, its indexes.
    fn ddl_query(&self, table: &str) -> (String, Vec<SqlValue>);

    /// Builds the live view of a table from introspection rows.
    ///
    /// Returns `None` when `columns` is empty. Index and constraint
    /// definitions the parser does not recognize are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error when a column row is missing required fields.
    fn parse_live_table(
        &'static self,
        table: &str,
        columns: &[StringMap],
        ddl: &[StringMap],
    ) -> Result<Option<LiveTable>>;

    // ================================================================
    // Data manipulation
    // ================================================================

    /// INSERT of a row that takes every column default.
    fn insert_defaults_sql(&self, table: &str) -> String {
        format!("INSERT INTO {} () VALUES ()", self.quote_identifier(table))
    }

    // ================================================================
    // Query functions
    // ================================================================

    /// Regular expression match of an expression against one bound pattern.
    fn regexp_sql(&self, expr: &str) -> String {
        format!("{expr} REGEXP ?")
    }

    /// A UNION member carrying ORDER BY, LIMIT or OFFSET.
    fn paged_union_member(&self, sql: &str) -> String {
        format!("({sql})")
    }

    /// Text before and after the argument of a grouped concatenation.
    fn group_concat_parts(&self, separator: &str) -> (String, String);

    /// LIMIT/OFFSET clause.
    fn limit_sql(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {l}")),
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
            (None, Some(o)) => Some(format!("LIMIT {} OFFSET {o}", u64::MAX)),
        }
    }
}

/// Returns `true` for defaults that are SQL expressions rather than literals.
pub(crate) fn is_sql_expression(value: &str) -> bool {
    let upper = value.trim().to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "CURRENT_TIMESTAMP" | "CURRENT_DATE" | "CURRENT_TIME" | "NULL"
    ) || upper.ends_with("()")
}

/// Extracts backtick-quoted identifiers in order of appearance.
pub(crate) fn quoted_identifiers(text: &str) -> Vec<String> {
    QUOTED_IDENT
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Removes one level of single quotes from a default reported by a
/// database, undoing doubled quotes.
pub(crate) fn unquote_default(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        trimmed[1..trimmed.len() - 1]
            .replace("''", "'")
            .replace("\\'", "'")
    } else {
        trimmed.to_string()
    }
}

/// Reads a field of an introspection row, matching the key case-insensitively.
pub(crate) fn row_field<'a>(row: &'a StringMap, key: &str) -> Option<&'a str> {
    row.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .and_then(|(_, v)| v.as_deref())
}

/// Textual kinds pick VARCHAR when a width is declared.
pub(crate) fn text_type(decl: &ColumnDecl) -> &'static str {
    if decl.tags.contains_key(crate::columns::tags::WIDTH) {
        "VARCHAR"
    } else {
        "TEXT"
    }
}

/// Whether a rendered definition should carry the declared width.
pub(crate) const fn renders_width(kind: ColumnKind) -> bool {
    !matches!(kind, ColumnKind::Boolean | ColumnKind::TriState)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_default_expressions() {
        assert!(is_sql_expression("CURRENT_TIMESTAMP"));
        assert!(is_sql_expression("now()"));
        assert!(!is_sql_expression("male"));
    }

    #[test]
    fn extracts_quoted_identifiers() {
        assert_eq!(
            quoted_identifiers("(`image_id`(10), `name`)"),
            vec!["image_id".to_string(), "name".to_string()]
        );
    }

    #[test]
    fn unquotes_reported_defaults() {
        assert_eq!(unquote_default("'new!'"), "new!");
        assert_eq!(unquote_default("'it''s'"), "it's");
        assert_eq!(unquote_default("12"), "12");
    }
}
