//! ClickHouse backend.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::{row_field, unquote_default, Backend};
use crate::columns::{parse_bool_text, tags, ColumnDecl, ColumnKind, ColumnSpec, NativeType};
use crate::connection::StringMap;
use crate::error::{DeclarationError, Result, SchemaError};
use crate::sync::{ColumnChange, LiveTable, TableChanges};
use crate::table::{IndexSpec, TableSpec};
use crate::value::SqlValue;

/// ClickHouse dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHouseBackend;

/// Shared ClickHouse backend instance.
pub static CLICKHOUSE: ClickHouseBackend = ClickHouseBackend;

fn native_sql_type(native: NativeType) -> (ColumnKind, &'static str) {
    match native {
        NativeType::Bool => (ColumnKind::Boolean, "UInt8"),
        NativeType::TriState => (ColumnKind::TriState, "UInt8"),
        NativeType::Int { bits, unsigned } => {
            let sql_type = match (bits, unsigned) {
                (8, false) => "Int8",
                (16, false) => "Int16",
                (32, false) => "Int32",
                (_, false) => "Int64",
                (8, true) => "UInt8",
                (16, true) => "UInt16",
                (32, true) => "UInt32",
                (_, true) => "UInt64",
            };
            (ColumnKind::Integer { unsigned }, sql_type)
        }
        NativeType::Float { double: false } => (ColumnKind::Float, "Float32"),
        NativeType::Float { double: true } => (ColumnKind::Float, "Float64"),
        NativeType::Text => (ColumnKind::Text, "String"),
        NativeType::DateTime => (ColumnKind::DateTime, "DateTime"),
        NativeType::Compound => (ColumnKind::Compound, "String"),
    }
}

fn live_kind(sql_type: &str) -> ColumnKind {
    if sql_type.starts_with("UInt") {
        ColumnKind::Integer { unsigned: true }
    } else if sql_type.starts_with("Int") {
        ColumnKind::Integer { unsigned: false }
    } else if sql_type.starts_with("Float") || sql_type.starts_with("Decimal") {
        ColumnKind::Float
    } else if sql_type.starts_with("DateTime") || sql_type == "Date" {
        ColumnKind::DateTime
    } else {
        ColumnKind::Text
    }
}

fn parse_column_row(table: &str, row: &StringMap) -> Result<ColumnSpec> {
    let missing = |field: &str| SchemaError::Conversion {
        column: table.to_string(),
        value: format!("{row:?}"),
        reason: format!("introspection row lacks `{field}`"),
    };
    let name = row_field(row, "name").ok_or_else(|| missing("name"))?;
    let declared = row_field(row, "type").ok_or_else(|| missing("type"))?;
    let (nullable, sql_type) = declared
        .strip_prefix("Nullable(")
        .and_then(|rest| rest.strip_suffix(')'))
        .map_or((false, declared), |inner| (true, inner));

    let mut tag_map = BTreeMap::new();
    tag_map.insert(tags::NULLABLE.to_string(), nullable.to_string());
    if row_field(row, "is_in_primary_key").and_then(parse_bool_text) == Some(true) {
        tag_map.insert(tags::PRIMARY.to_string(), "true".to_string());
    }
    if row_field(row, "default_kind") == Some("DEFAULT") {
        if let Some(expr) = row_field(row, "default_expression") {
            tag_map.insert(tags::DEFAULT.to_string(), unquote_default(expr));
        }
    }
    Ok(ColumnSpec::from_tags(
        &CLICKHOUSE,
        name,
        live_kind(sql_type),
        sql_type,
        &tag_map,
        true,
    )?)
}

impl ClickHouseBackend {
    fn sorting_key(table: &TableSpec) -> Vec<String> {
        let tagged: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| c.tag(tags::CLICKHOUSE_ORDER_BY).and_then(parse_bool_text) == Some(true))
            .map(|c| c.name().to_string())
            .collect();
        if tagged.is_empty() {
            table.primary_key_names()
        } else {
            tagged
        }
    }
}

impl Backend for ClickHouseBackend {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn column_from_decl(&'static self, decl: &ColumnDecl) -> Result<ColumnSpec, DeclarationError> {
        let (kind, sql_type) = native_sql_type(decl.native_type()?);
        // Sorting key columns cannot be Nullable.
        let mut column_tags = decl.tags.clone();
        if column_tags
            .get(tags::CLICKHOUSE_ORDER_BY)
            .map(String::as_str)
            .and_then(parse_bool_text)
            == Some(true)
        {
            column_tags.insert(tags::NULLABLE.to_string(), "false".to_string());
        }
        ColumnSpec::new(
            self,
            &decl.column_name(),
            kind,
            sql_type,
            &column_tags,
            decl.is_pointer,
        )
    }

    fn column_definition(&self, column: &ColumnSpec) -> String {
        let mut sql = if column.is_nullable() {
            format!(
                "{} Nullable({})",
                self.quote_identifier(column.name()),
                column.sql_type()
            )
        } else {
            format!(
                "{} {}",
                self.quote_identifier(column.name()),
                column.sql_type()
            )
        };
        if let Some(default) = self.default_literal(column) {
            let _ = write!(sql, " DEFAULT {default}");
        }
        sql
    }

    fn current_time_sql(&self) -> &'static str {
        "now()"
    }

    fn supports_indexes(&self) -> bool {
        false
    }

    fn effective_primary_key(&self, table: &TableSpec) -> Vec<String> {
        Self::sorting_key(table)
    }

    fn create_table_sql(&self, table: &TableSpec) -> Vec<String> {
        let defs: Vec<String> = table
            .columns()
            .iter()
            .map(|c| format!("    {}", self.column_definition(c)))
            .collect();
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n) ENGINE = MergeTree()",
            table.quoted_name(),
            defs.join(",\n")
        );
        if let Some(partition) = table
            .columns()
            .iter()
            .find_map(|c| c.tag(tags::CLICKHOUSE_PARTITION_BY))
        {
            let _ = write!(sql, " PARTITION BY {partition}");
        }
        let order = Self::sorting_key(table);
        if order.is_empty() {
            sql.push_str(" ORDER BY tuple()");
        } else {
            let _ = write!(sql, " ORDER BY ({})", self.column_list(&order));
        }
        sql.push(';');
        vec![sql]
    }

    fn drop_index_sql(&self, table: &str, index: &IndexSpec) -> String {
        format!(
            "ALTER TABLE {} DROP INDEX {};",
            self.quote_identifier(table),
            self.quote_identifier(index.name())
        )
    }

    fn commit_table_change_sql(
        &self,
        table: &TableSpec,
        changes: &TableChanges,
    ) -> Result<Vec<String>> {
        if changes.primary_key.is_some() {
            return Err(SchemaError::PrimaryKeyChange {
                table: table.name().to_string(),
            });
        }
        let fragments: Vec<String> = changes
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
        if fragments.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![format!(
            "ALTER TABLE {} {};",
            table.quoted_name(),
            fragments.join(", ")
        )])
    }

    fn columns_query(&self, table: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT name, type, default_kind, default_expression, is_in_primary_key \
             FROM system.columns WHERE database = currentDatabase() AND table = ? \
             ORDER BY position"
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
            .and_then(|row| row_field(row, "statement"))
            .unwrap_or_default()
            .to_string();
        Ok(Some(LiveTable {
            name: table.to_string(),
            columns,
            indexes: Vec::new(),
            constraints: Vec::new(),
            ddl,
        }))
    }

    fn regexp_sql(&self, expr: &str) -> String {
        format!("match({expr}, ?)")
    }

    fn group_concat_parts(&self, separator: &str) -> (String, String) {
        (
            "arrayStringConcat(groupArray(".to_string(),
            format!("), {})", self.quote_string(separator)),
        )
    }
}
