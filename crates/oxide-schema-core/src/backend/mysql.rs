//! MySQL backend.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use super::{
    quoted_identifiers, renders_width, row_field, text_type, unquote_default, Backend,
};
use crate::columns::{tags, ColumnDecl, ColumnKind, ColumnSpec, NativeType};
use crate::connection::StringMap;
use crate::error::{DeclarationError, Result, SchemaError};
use crate::sync::{ColumnChange, Constraint, ConstraintKind, LiveTable, TableChanges};
use crate::table::{IndexSpec, TableSpec};
use crate::value::SqlValue;

static INDEX_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(UNIQUE\s+)?KEY\s+`([^`]+)`\s*\((.+)\)").expect("valid index regex")
});

static FOREIGN_KEY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*CONSTRAINT\s+`([^`]+)`\s+FOREIGN\s+KEY\s*\(([^)]*)\)\s*REFERENCES\s+`([^`]+)`\s*\(([^)]*)\)",
    )
    .expect("valid constraint regex")
});

static COLUMN_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\w+)(?:\((\d+)(?:,\s*\d+)?\))?(\s+unsigned)?")
        .expect("valid column type regex")
});

/// MySQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlBackend;

/// Shared MySQL backend instance.
pub static MYSQL: MySqlBackend = MySqlBackend;

/// Default display width MySQL reports for an integer type.
fn default_display_width(sql_type: &str, unsigned: bool) -> u32 {
    match (sql_type, unsigned) {
        ("TINYINT", false) => 4,
        ("TINYINT", true) => 3,
        ("SMALLINT", false) => 6,
        ("SMALLINT", true) => 5,
        ("MEDIUMINT", false) => 9,
        ("MEDIUMINT", true) => 8,
        ("INT", false) => 11,
        ("INT", true) => 10,
        _ => 20,
    }
}

/// Maps a declared charset to the charset and collation MySQL stores.
fn resolve_charset(charset: Option<&str>, collation: Option<&str>) -> (String, String) {
    let cs = charset.map_or_else(|| "utf8".to_string(), str::to_ascii_lowercase);
    let (cs, default_collation) = match cs.as_str() {
        "utf8" | "utf8mb4" => ("utf8mb4".to_string(), "utf8mb4_unicode_ci".to_string()),
        "ascii" => ("ascii".to_string(), "ascii_general_ci".to_string()),
        other => (other.to_string(), format!("{other}_general_ci")),
    };
    let collation = collation.map_or(default_collation, |c| {
        // `utf8` is widened to `utf8mb4`, so its collations follow.
        match c.to_ascii_lowercase().strip_prefix("utf8_") {
            Some(rest) if cs == "utf8mb4" => format!("utf8mb4_{rest}"),
            _ => c.to_string(),
        }
    });
    (cs, collation)
}

fn with_charset(mut col: ColumnSpec) -> ColumnSpec {
    let (charset, collation) = resolve_charset(col.charset(), col.collation());
    col.charset = Some(charset);
    col.collation = Some(collation);
    col
}

/// Builds a `TINYINT` boolean column.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn boolean_column(
    name: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&MYSQL, name, ColumnKind::Boolean, "TINYINT", tags, is_pointer)
}

/// Builds a `TINYINT` tri-state column.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn tristate_column(
    name: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&MYSQL, name, ColumnKind::TriState, "TINYINT", tags, is_pointer)
}

/// Builds an integer column of the given SQL type.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn integer_column(
    name: &str,
    sql_type: &str,
    unsigned: bool,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&MYSQL, name, ColumnKind::Integer { unsigned }, sql_type, tags, is_pointer)
}

/// Builds a `FLOAT` or `DOUBLE` column.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn float_column(
    name: &str,
    sql_type: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&MYSQL, name, ColumnKind::Float, sql_type, tags, is_pointer)
}

/// Builds a `VARCHAR` or `TEXT` column with a resolved charset.
///
/// # Errors
///
/// Rejects a default on `TEXT`, see also [`ColumnSpec::new`].
pub fn text_column(
    name: &str,
    sql_type: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&MYSQL, name, ColumnKind::Text, sql_type, tags, is_pointer).map(with_charset)
}

/// Builds a `DATETIME` column.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn datetime_column(
    name: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&MYSQL, name, ColumnKind::DateTime, "DATETIME", tags, is_pointer)
}

/// Builds a JSON-serialized column stored as text.
///
/// # Errors
///
/// Rejects a default on `TEXT`, see also [`ColumnSpec::new`].
pub fn compound_column(
    name: &str,
    sql_type: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&MYSQL, name, ColumnKind::Compound, sql_type, tags, is_pointer)
        .map(with_charset)
}

/// Extracts secondary indexes from `SHOW CREATE TABLE` output.
///
/// Index prefix lengths such as `` `name`(10) `` are dropped.
#[must_use]
pub fn parse_indexes(ddl: &str) -> Vec<IndexSpec> {
    INDEX_LINE
        .captures_iter(ddl)
        .filter_map(|caps| {
            let columns = quoted_identifiers(&caps[3]);
            if columns.is_empty() {
                return None;
            }
            Some(IndexSpec::new(&caps[2], &columns, caps.get(1).is_some()))
        })
        .collect()
}

/// Extracts foreign key constraints from `SHOW CREATE TABLE` output.
#[must_use]
pub fn parse_constraints(ddl: &str) -> Vec<Constraint> {
    FOREIGN_KEY_LINE
        .captures_iter(ddl)
        .map(|caps| Constraint {
            name: Some(caps[1].to_string()),
            columns: quoted_identifiers(&caps[2]),
            kind: ConstraintKind::ForeignKey {
                references_table: caps[3].to_string(),
                references_columns: quoted_identifiers(&caps[4]),
            },
        })
        .collect()
}

fn parse_column_row(table: &str, row: &StringMap) -> Result<ColumnSpec> {
    let missing = |field: &str| SchemaError::Conversion {
        column: table.to_string(),
        value: format!("{row:?}"),
        reason: format!("introspection row lacks `{field}`"),
    };
    let name = row_field(row, "Field").ok_or_else(|| missing("Field"))?;
    let column_type = row_field(row, "Type").ok_or_else(|| missing("Type"))?;
    let caps = COLUMN_TYPE
        .captures(column_type)
        .ok_or_else(|| missing("Type"))?;
    let base = caps[1].to_ascii_uppercase();
    let width = caps.get(2).map(|m| m.as_str().to_string());
    let unsigned = caps.get(3).is_some();

    let (kind, sql_type) = match base.as_str() {
        "TINYINT" if width.as_deref() == Some("1") => (ColumnKind::Boolean, base),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            (ColumnKind::Integer { unsigned }, base)
        }
        "INTEGER" => (ColumnKind::Integer { unsigned }, "INT".to_string()),
        "FLOAT" | "DOUBLE" | "REAL" | "DECIMAL" => (ColumnKind::Float, base),
        "DATETIME" | "TIMESTAMP" | "DATE" => (ColumnKind::DateTime, base),
        _ => (ColumnKind::Text, base),
    };

    let mut tag_map = BTreeMap::new();
    if let Some(width) = width.filter(|_| renders_width(kind)) {
        tag_map.insert(tags::WIDTH.to_string(), width);
    }
    let nullable = row_field(row, "Null").is_some_and(|v| v.eq_ignore_ascii_case("YES"));
    tag_map.insert(tags::NULLABLE.to_string(), nullable.to_string());
    if row_field(row, "Key").is_some_and(|k| k.eq_ignore_ascii_case("PRI")) {
        tag_map.insert(tags::PRIMARY.to_string(), "true".to_string());
    }
    if row_field(row, "Extra").is_some_and(|e| e.to_ascii_lowercase().contains("auto_increment")) {
        tag_map.insert(tags::AUTO_INCREMENT.to_string(), "true".to_string());
    }
    if let Some(default) = row_field(row, "Default") {
        if !default.eq_ignore_ascii_case("NULL") {
            tag_map.insert(tags::DEFAULT.to_string(), unquote_default(default));
        }
    }
    if let Some(collation) = row_field(row, "Collation") {
        let charset = collation.split('_').next().unwrap_or(collation);
        tag_map.insert(tags::CHARSET.to_string(), charset.to_string());
        tag_map.insert(tags::COLLATION.to_string(), collation.to_string());
    }

    Ok(ColumnSpec::from_tags(&MYSQL, name, kind, &sql_type, &tag_map, true)?)
}

impl Backend for MySqlBackend {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn column_from_decl(&'static self, decl: &ColumnDecl) -> Result<ColumnSpec, DeclarationError> {
        let name = decl.column_name();
        let ptr = decl.is_pointer;
        match decl.native_type()? {
            NativeType::Bool => boolean_column(&name, &decl.tags, ptr),
            NativeType::TriState => tristate_column(&name, &decl.tags, ptr),
            NativeType::Int { bits, unsigned } => {
                let sql_type = match bits {
                    8 => "TINYINT",
                    16 => "SMALLINT",
                    32 => "INT",
                    _ => "BIGINT",
                };
                let mut tag_map = decl.tags.clone();
                tag_map
                    .entry(tags::WIDTH.to_string())
                    .or_insert_with(|| default_display_width(sql_type, unsigned).to_string());
                integer_column(&name, sql_type, unsigned, &tag_map, ptr)
            }
            NativeType::Float { double } => {
                float_column(&name, if double { "DOUBLE" } else { "FLOAT" }, &decl.tags, ptr)
            }
            NativeType::Text => text_column(&name, text_type(decl), &decl.tags, ptr),
            NativeType::DateTime => datetime_column(&name, &decl.tags, ptr),
            NativeType::Compound => compound_column(&name, text_type(decl), &decl.tags, ptr),
        }
    }

    fn validate_column(&self, column: &ColumnSpec) -> Result<(), DeclarationError> {
        if column.is_text_blob() && column.default_value().is_some() {
            return Err(DeclarationError::DefaultNotAllowed {
                column: column.name().to_string(),
                reason: format!("MySQL does not allow a default on {}", column.sql_type()),
            });
        }
        Ok(())
    }

    fn column_definition(&self, column: &ColumnSpec) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(column.name()),
            column.sql_type()
        );
        if let Some(width) = column.width().filter(|_| renders_width(column.kind())) {
            let _ = write!(sql, "({width})");
        }
        if matches!(column.kind(), ColumnKind::Integer { unsigned: true }) {
            sql.push_str(" UNSIGNED");
        }
        if column.kind().is_textual() {
            if let (Some(charset), Some(collation)) = (column.charset(), column.collation()) {
                let _ = write!(sql, " CHARACTER SET '{charset}' COLLATE '{collation}'");
            }
        }
        if !column.is_nullable() {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default_literal(column) {
            let _ = write!(sql, " DEFAULT {default}");
        }
        if column.is_auto_increment() {
            sql.push_str(" AUTO_INCREMENT");
        }
        sql
    }

    /// Integer display widths are cosmetic and newer servers stop
    /// reporting them, so they do not count as a difference.
    fn columns_equivalent(&self, a: &ColumnSpec, b: &ColumnSpec) -> bool {
        let comparable = |c: &ColumnSpec| {
            if matches!(c.kind(), ColumnKind::Integer { .. }) {
                let mut c = c.clone();
                c.width = None;
                self.column_definition(&c)
            } else {
                self.column_definition(c)
            }
        };
        comparable(a) == comparable(b)
    }

    fn current_time_sql(&self) -> &'static str {
        "UTC_TIMESTAMP()"
    }

    fn create_table_sql(&self, table: &TableSpec) -> Vec<String> {
        let mut defs: Vec<String> = table
            .columns()
            .iter()
            .map(|c| format!("    {}", self.column_definition(c)))
            .collect();
        let primary = table.primary_key_names();
        if !primary.is_empty() {
            defs.push(format!("    PRIMARY KEY ({})", self.column_list(&primary)));
        }
        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;",
            table.quoted_name(),
            defs.join(",\n")
        )];
        statements.extend(
            table
                .indexes()
                .iter()
                .map(|idx| self.create_index_sql(table.name(), idx)),
        );
        statements
    }

    fn drop_index_sql(&self, table: &str, index: &IndexSpec) -> String {
        format!(
            "DROP INDEX {} ON {};",
            self.quote_identifier(index.name()),
            self.quote_identifier(table)
        )
    }

    fn commit_table_change_sql(
        &self,
        table: &TableSpec,
        changes: &TableChanges,
    ) -> Result<Vec<String>> {
        let mut statements: Vec<String> = changes
            .removed_indexes
            .iter()
            .map(|idx| self.drop_index_sql(table.name(), idx))
            .collect();

        let mut fragments: Vec<String> = changes
            .columns
            .iter()
            .map(|change| match change {
                ColumnChange::Add(c) => format!("ADD COLUMN {}", self.column_definition(c)),
                ColumnChange::Modify { new, .. } => {
                    format!("MODIFY COLUMN {}", self.column_definition(new))
                }
                ColumnChange::Drop(c) => {
                    format!("DROP COLUMN {}", self.quote_identifier(c.name()))
                }
            })
            .collect();
        if let Some((live, desired)) = &changes.primary_key {
            if !live.is_empty() {
                fragments.push("DROP PRIMARY KEY".to_string());
            }
            if !desired.is_empty() {
                fragments.push(format!("ADD PRIMARY KEY ({})", self.column_list(desired)));
            }
        }
        if !fragments.is_empty() {
            statements.push(format!(
                "ALTER TABLE {} {};",
                table.quoted_name(),
                fragments.join(", ")
            ));
        }

        statements.extend(
            changes
                .added_indexes
                .iter()
                .map(|idx| self.create_index_sql(table.name(), idx)),
        );
        Ok(statements)
    }

    fn columns_query(&self, table: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT COLUMN_NAME AS `Field`, COLUMN_TYPE AS `Type`, COLLATION_NAME AS `Collation`, \
             IS_NULLABLE AS `Null`, COLUMN_KEY AS `Key`, COLUMN_DEFAULT AS `Default`, EXTRA AS `Extra` \
             FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION"
                .to_string(),
            vec![SqlValue::Text(table.to_string())],
        )
    }

    fn ddl_query(&self, table: &str) -> (String, Vec<SqlValue>) {
        (
            format!("SHOW CREATE TABLE {}", self.quote_identifier(table)),
            Vec::new(),
        )
    }

    fn parse_live_table(
        &'static self,
        table: &str,
        columns: &[StringMap],
        ddl: &[StringMap],
    ) -> Result<Option<LiveTable>> {
        if columns.is_empty() {
            return Ok(None);
        }
        let columns = columns
            .iter()
            .map(|row| parse_column_row(table, row))
            .collect::<Result<Vec<_>>>()?;
        let ddl = ddl
            .first()
            .and_then(|row| row_field(row, "Create Table"))
            .unwrap_or_default()
            .to_string();
        Ok(Some(LiveTable {
            name: table.to_string(),
            indexes: parse_indexes(&ddl),
            constraints: parse_constraints(&ddl),
            columns,
            ddl,
        }))
    }

    fn group_concat_parts(&self, separator: &str) -> (String, String) {
        (
            "GROUP_CONCAT(".to_string(),
            format!(" SEPARATOR {})", self.quote_string(separator)),
        )
    }
}
