//! SQLite backend.
//!
//! SQLite cannot modify or drop columns in place, so any change other
//! than adding a column rebuilds the table: the live table is renamed,
//! the desired table is created, common columns are copied over and the
//! old table is dropped before indexes are recreated.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use super::{is_sql_expression, quoted_identifiers, row_field, unquote_default, Backend};
use crate::columns::{tags, ColumnDecl, ColumnKind, ColumnSpec, NativeType};
use crate::connection::StringMap;
use crate::error::{DeclarationError, Result, SchemaError};
use crate::sync::{ColumnChange, Constraint, ConstraintKind, LiveTable, TableChanges};
use crate::table::{IndexSpec, TableSpec};
use crate::value::SqlValue;

static INDEX_SQL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"CREATE\s+(UNIQUE\s+)?INDEX\s+`(\w+)`\s+ON\s+`(\w+)`\s*\((`\w+`(?:,\s*`\w+`)*)\)",
    )
    .expect("valid index regex")
});

static UNIQUE_CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:CONSTRAINT\s+[`\x22]?(\w+)[`\x22]?\s+)?UNIQUE\s*\(([^)]*)\)")
        .expect("valid unique regex")
});

static FOREIGN_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:CONSTRAINT\s+[`\x22]?(\w+)[`\x22]?\s+)?FOREIGN\s+KEY\s*\(([^)]*)\)\s*REFERENCES\s+[`\x22]?(\w+)[`\x22]?\s*\(([^)]*)\)",
    )
    .expect("valid foreign key regex")
});

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBackend;

/// Shared SQLite backend instance.
pub static SQLITE: SqliteBackend = SqliteBackend;

const DEFAULT_COLLATION: &str = "NOCASE";

fn with_collation(mut col: ColumnSpec) -> ColumnSpec {
    if col.collation.is_none() {
        col.collation = Some(DEFAULT_COLLATION.to_string());
    }
    col.charset = None;
    col
}

/// Builds an `INTEGER` boolean column.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn boolean_column(
    name: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&SQLITE, name, ColumnKind::Boolean, "INTEGER", tags, is_pointer)
}

/// Builds an `INTEGER` tri-state column. Tri-states are always nullable.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn tristate_column(
    name: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&SQLITE, name, ColumnKind::TriState, "INTEGER", tags, is_pointer)
}

/// Builds an `INTEGER` column.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn integer_column(
    name: &str,
    unsigned: bool,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&SQLITE, name, ColumnKind::Integer { unsigned }, "INTEGER", tags, is_pointer)
}

/// Builds a `REAL` column.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn float_column(
    name: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&SQLITE, name, ColumnKind::Float, "REAL", tags, is_pointer)
}

/// Builds a `TEXT` column, `NOCASE` collated unless a collation is tagged.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn text_column(
    name: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&SQLITE, name, ColumnKind::Text, "TEXT", tags, is_pointer).map(with_collation)
}

/// Builds a timestamp column stored as `TEXT`.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn datetime_column(
    name: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&SQLITE, name, ColumnKind::DateTime, "TEXT", tags, is_pointer)
        .map(with_collation)
}

/// Builds a JSON-serialized column stored as `TEXT`.
///
/// # Errors
///
/// See [`ColumnSpec::new`].
pub fn compound_column(
    name: &str,
    tags: &BTreeMap<String, String>,
    is_pointer: bool,
) -> Result<ColumnSpec, DeclarationError> {
    ColumnSpec::new(&SQLITE, name, ColumnKind::Compound, "TEXT", tags, is_pointer)
        .map(with_collation)
}

/// Parses a `CREATE [UNIQUE] INDEX` statement from `sqlite_master`.
#[must_use]
pub fn parse_index(sql: &str) -> Option<IndexSpec> {
    let caps = INDEX_SQL.captures(sql)?;
    let columns = quoted_identifiers(&caps[4]);
    Some(IndexSpec::new(&caps[2], &columns, caps.get(1).is_some()))
}

fn plain_identifiers(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| c.trim().trim_matches(|ch| ch == '`' || ch == '"').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Extracts unique and foreign key constraints from a table's DDL.
#[must_use]
pub fn parse_constraints(ddl: &str) -> Vec<Constraint> {
    let unique = UNIQUE_CONSTRAINT.captures_iter(ddl).map(|caps| Constraint {
        name: caps.get(1).map(|m| m.as_str().to_string()),
        columns: plain_identifiers(&caps[2]),
        kind: ConstraintKind::Unique,
    });
    let foreign = FOREIGN_KEY.captures_iter(ddl).map(|caps| Constraint {
        name: caps.get(1).map(|m| m.as_str().to_string()),
        columns: plain_identifiers(&caps[2]),
        kind: ConstraintKind::ForeignKey {
            references_table: caps[3].to_string(),
            references_columns: plain_identifiers(&caps[4]),
        },
    });
    unique.chain(foreign).collect()
}

/// Finds the clause a column definition carries in the table DDL, such as
/// its collation.
fn column_clause(ddl: &str, column: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r"(?i)`{}`[^`]*?{pattern}",
        regex::escape(column)
    ))
    .ok()?;
    re.captures(ddl)
        .map(|caps| caps.get(1).map_or_else(String::new, |m| m.as_str().to_string()))
}

fn parse_column_row(table: &str, ddl: &str, row: &StringMap) -> Result<ColumnSpec> {
    let missing = |field: &str| SchemaError::Conversion {
        column: table.to_string(),
        value: format!("{row:?}"),
        reason: format!("introspection row lacks `{field}`"),
    };
    let name = row_field(row, "name").ok_or_else(|| missing("name"))?;
    let declared = row_field(row, "type").unwrap_or_default().to_ascii_uppercase();

    // Type affinity rules, in SQLite's own precedence.
    let (kind, sql_type, textual) = if declared.contains("INT") {
        (ColumnKind::Integer { unsigned: false }, "INTEGER".to_string(), false)
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| declared.contains(t)) {
        (ColumnKind::Text, "TEXT".to_string(), true)
    } else if declared.is_empty() || declared.contains("BLOB") {
        (ColumnKind::Text, "BLOB".to_string(), false)
    } else if ["REAL", "FLOA", "DOUB"].iter().any(|t| declared.contains(t)) {
        (ColumnKind::Float, "REAL".to_string(), false)
    } else {
        (ColumnKind::Text, declared, false)
    };

    let mut tag_map = BTreeMap::new();
    let not_null = row_field(row, "notnull").is_some_and(|v| v != "0");
    tag_map.insert(tags::NULLABLE.to_string(), (!not_null).to_string());
    if row_field(row, "pk").is_some_and(|v| v != "0") {
        tag_map.insert(tags::PRIMARY.to_string(), "true".to_string());
    }
    if column_clause(ddl, name, r"PRIMARY\s+KEY\s+AUTOINCREMENT()").is_some() {
        tag_map.insert(tags::AUTO_INCREMENT.to_string(), "true".to_string());
    }
    if let Some(default) = row_field(row, "dflt_value") {
        if !default.eq_ignore_ascii_case("NULL") {
            tag_map.insert(tags::DEFAULT.to_string(), unquote_default(default));
        }
    }
    if textual {
        let collation = column_clause(ddl, name, r"COLLATE\s+(\w+)")
            .map_or_else(|| "BINARY".to_string(), |c| c.to_ascii_uppercase());
        tag_map.insert(tags::COLLATION.to_string(), collation);
    }

    Ok(ColumnSpec::from_tags(&SQLITE, name, kind, &sql_type, &tag_map, true)?)
}

/// Whether `ALTER TABLE ... ADD COLUMN` accepts the column.
fn addable(column: &ColumnSpec) -> bool {
    !column.is_primary()
        && column
            .default_value()
            .map_or(column.is_nullable(), |d| !is_sql_expression(d))
}

impl SqliteBackend {
    fn create_table_statement(&self, name: &str, columns: &[ColumnSpec]) -> String {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| format!("    {}", self.column_definition(c)))
            .collect();
        let primary: Vec<String> = columns
            .iter()
            .filter(|c| c.is_primary())
            .map(|c| c.name().to_string())
            .collect();
        if !primary.is_empty() && !columns.iter().any(ColumnSpec::is_auto_increment) {
            defs.push(format!("    PRIMARY KEY ({})", self.column_list(&primary)));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
            self.quote_identifier(name),
            defs.join(",\n")
        )
    }

    fn rebuild_sql(&self, table: &TableSpec, changes: &TableChanges) -> Vec<String> {
        let old = format!("{}__old", table.name());
        let mut columns = table.columns().to_vec();
        columns.extend(changes.retained_columns.iter().cloned());

        let added: BTreeSet<&str> = changes.added().map(ColumnSpec::name).collect();
        let common: Vec<String> = columns
            .iter()
            .filter(|c| !added.contains(c.name()))
            .map(|c| c.name().to_string())
            .collect();
        let common = self.column_list(&common);

        let mut statements = vec![
            format!(
                "ALTER TABLE {} RENAME TO {};",
                table.quoted_name(),
                self.quote_identifier(&old)
            ),
            self.create_table_statement(table.name(), &columns),
            format!(
                "INSERT INTO {} ({common}) SELECT {common} FROM {};",
                table.quoted_name(),
                self.quote_identifier(&old)
            ),
            format!("DROP TABLE {};", self.quote_identifier(&old)),
        ];
        let names: BTreeSet<&str> = columns.iter().map(ColumnSpec::name).collect();
        statements.extend(
            table
                .indexes()
                .iter()
                .chain(&changes.retained_indexes)
                .filter(|idx| idx.columns().iter().all(|c| names.contains(c.as_str())))
                .map(|idx| self.create_index_sql(table.name(), idx)),
        );
        statements
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn column_from_decl(&'static self, decl: &ColumnDecl) -> Result<ColumnSpec, DeclarationError> {
        let name = decl.column_name();
        let ptr = decl.is_pointer;
        match decl.native_type()? {
            NativeType::Bool => boolean_column(&name, &decl.tags, ptr),
            NativeType::TriState => tristate_column(&name, &decl.tags, ptr),
            NativeType::Int { unsigned, .. } => integer_column(&name, unsigned, &decl.tags, ptr),
            NativeType::Float { .. } => float_column(&name, &decl.tags, ptr),
            NativeType::Text => text_column(&name, &decl.tags, ptr),
            NativeType::DateTime => datetime_column(&name, &decl.tags, ptr),
            NativeType::Compound => compound_column(&name, &decl.tags, ptr),
        }
    }

    fn column_definition(&self, column: &ColumnSpec) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(column.name()),
            column.sql_type()
        );
        if column.is_auto_increment() {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
            return sql;
        }
        if !column.is_nullable() {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default_literal(column) {
            let _ = write!(sql, " DEFAULT {default}");
        }
        if let Some(collation) = column.collation() {
            let _ = write!(sql, " COLLATE {collation}");
        }
        sql
    }

    fn current_time_sql(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn create_table_sql(&self, table: &TableSpec) -> Vec<String> {
        let mut statements = vec![self.create_table_statement(table.name(), table.columns())];
        statements.extend(
            table
                .indexes()
                .iter()
                .map(|idx| self.create_index_sql(table.name(), idx)),
        );
        statements
    }

    fn insert_defaults_sql(&self, table: &str) -> String {
        format!("INSERT INTO {} DEFAULT VALUES", self.quote_identifier(table))
    }

    fn drop_index_sql(&self, _table: &str, index: &IndexSpec) -> String {
        format!("DROP INDEX IF EXISTS {};", self.quote_identifier(index.name()))
    }

    fn commit_table_change_sql(
        &self,
        table: &TableSpec,
        changes: &TableChanges,
    ) -> Result<Vec<String>> {
        let rebuild = changes.primary_key.is_some()
            || changes.columns.iter().any(|change| match change {
                ColumnChange::Add(col) => !addable(col),
                ColumnChange::Modify { .. } | ColumnChange::Drop(_) => true,
            });
        if rebuild {
            return Ok(self.rebuild_sql(table, changes));
        }

        let mut statements: Vec<String> = changes
            .removed_indexes
            .iter()
            .map(|idx| self.drop_index_sql(table.name(), idx))
            .collect();
        statements.extend(changes.added().map(|col| {
            format!(
                "ALTER TABLE {} ADD COLUMN {};",
                table.quoted_name(),
                self.column_definition(col)
            )
        }));
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
            "SELECT * FROM pragma_table_info(?) ORDER BY cid".to_string(),
            vec![SqlValue::Text(table.to_string())],
        )
    }

    fn ddl_query(&self, table: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT type, name, sql FROM sqlite_master WHERE tbl_name = ?".to_string(),
            vec![SqlValue::Text(table.to_string())],
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
        let table_sql = ddl
            .iter()
            .find(|row| row_field(row, "type") == Some("table"))
            .and_then(|row| row_field(row, "sql"))
            .unwrap_or_default()
            .to_string();
        let indexes = ddl
            .iter()
            .filter(|row| row_field(row, "type") == Some("index"))
            .filter_map(|row| row_field(row, "sql"))
            .filter_map(parse_index)
            .collect();
        let columns = columns
            .iter()
            .map(|row| parse_column_row(table, &table_sql, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(LiveTable {
            name: table.to_string(),
            columns,
            indexes,
            constraints: parse_constraints(&table_sql),
            ddl: table_sql,
        }))
    }

    fn group_concat_parts(&self, separator: &str) -> (String, String) {
        (
            "GROUP_CONCAT(".to_string(),
            format!(", {})", self.quote_string(separator)),
        )
    }

    fn limit_sql(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {l}")),
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
            (None, Some(o)) => Some(format!("LIMIT -1 OFFSET {o}")),
        }
    }
    // Compound selects take no parenthesized members.
    fn paged_union_member(&self, sql: &str) -> String {
        format!("SELECT * FROM ({sql})")
    }
}
