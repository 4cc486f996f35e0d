//! Row-level INSERT, UPDATE and DELETE driven by a table specification.
//!
//! Rows are maps from column name to [`Value`]. Columns tagged
//! `created_at`, `updated_at` and `auto_version` are maintained here:
//! timestamps default to the backend's current time and the version
//! column starts at zero and is incremented on every update.

use std::collections::BTreeMap;

use tracing::debug;

use crate::connection::Connection;
use crate::error::{Result, SchemaError};
use crate::table::TableSpec;
use crate::value::{SqlValue, Value};

/// A row keyed by column name.
pub type Row = BTreeMap<String, Value>;

impl TableSpec {
    /// Re-keys `row` by canonical column name. Keys match columns
    /// case-insensitively; two keys naming the same column are refused.
    fn canonical_row<'a>(&self, row: &'a Row) -> Result<BTreeMap<&str, &'a Value>> {
        let mut canonical = BTreeMap::new();
        for (key, value) in row {
            let unknown = || SchemaError::UnknownField {
                scope: format!("table `{}`", self.name()),
                field: key.clone(),
            };
            let column = self.column(key).ok_or_else(unknown)?;
            if canonical.insert(column.name(), value).is_some() {
                return Err(SchemaError::Conversion {
                    column: column.name().to_string(),
                    value: format!("{value:?}"),
                    reason: "column given more than once".to_string(),
                });
            }
        }
        Ok(canonical)
    }

    /// WHERE clause matching the row's primary key.
    fn key_filter(
        &self,
        row: &BTreeMap<&str, &Value>,
        params: &mut Vec<SqlValue>,
    ) -> Result<String> {
        let missing = |column: &str| SchemaError::MissingPrimaryKey {
            table: self.name().to_string(),
            column: column.to_string(),
        };
        let mut terms = Vec::new();
        for column in self.primary_key() {
            let value = row
                .get(column.name())
                .copied()
                .filter(|v| !v.is_null())
                .ok_or_else(|| missing(column.name()))?;
            params.push(column.convert_from_value(value)?);
            terms.push(format!("{} = ?", column.quoted_name()));
        }
        if terms.is_empty() {
            return Err(missing("(none)"));
        }
        Ok(terms.join(" AND "))
    }

    /// Renders an INSERT for `row`.
    ///
    /// Absent or null auto-increment columns are left to the database.
    /// Absent timestamp columns get the current time, an absent version
    /// column gets zero.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] for keys that are not columns
    /// and [`SchemaError::Conversion`] for values a column cannot hold or
    /// a column given twice under different casings.
    pub fn insert_sql(&self, row: &Row) -> Result<(String, Vec<SqlValue>)> {
        let row = self.canonical_row(row)?;
        let backend = self.backend();
        let mut names = Vec::new();
        let mut values = Vec::new();
        let mut params = Vec::new();
        for column in self.columns() {
            match row.get(column.name()) {
                Some(v) if v.is_null() && column.is_auto_increment() => {}
                Some(v) => {
                    names.push(column.quoted_name());
                    values.push("?".to_string());
                    params.push(column.convert_from_value(v)?);
                }
                None if column.is_created_at() || column.is_updated_at() => {
                    names.push(column.quoted_name());
                    values.push(backend.current_time_sql().to_string());
                }
                None if column.is_auto_version() => {
                    names.push(column.quoted_name());
                    values.push("?".to_string());
                    params.push(SqlValue::Int(0));
                }
                None => {}
            }
        }
        if names.is_empty() {
            return Ok((backend.insert_defaults_sql(self.name()), params));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quoted_name(),
            names.join(", "),
            values.join(", ")
        );
        Ok((sql, params))
    }

    /// Renders an UPDATE of the row identified by its primary key values.
    ///
    /// Every non-key column present in `row` is set. Timestamp columns
    /// tagged `updated_at` are refreshed unless given, and the version
    /// column is incremented.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingPrimaryKey`] when a key column has no
    /// value, plus the errors of [`TableSpec::insert_sql`].
    pub fn update_sql(&self, row: &Row) -> Result<(String, Vec<SqlValue>)> {
        let row = self.canonical_row(row)?;
        let backend = self.backend();
        let mut sets = Vec::new();
        let mut params = Vec::new();
        for column in self.columns().iter().filter(|c| !c.is_primary()) {
            let name = column.quoted_name();
            if column.is_auto_version() {
                sets.push(format!("{name} = {name} + 1"));
                continue;
            }
            match row.get(column.name()) {
                Some(v) => {
                    sets.push(format!("{name} = ?"));
                    params.push(column.convert_from_value(v)?);
                }
                None if column.is_updated_at() => {
                    sets.push(format!("{name} = {}", backend.current_time_sql()));
                }
                None => {}
            }
        }
        if sets.is_empty() {
            return Err(SchemaError::EmptyUpdate {
                table: self.name().to_string(),
            });
        }
        let filter = self.key_filter(&row, &mut params)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {filter}",
            self.quoted_name(),
            sets.join(", ")
        );
        Ok((sql, params))
    }

    /// Renders a DELETE of the row identified by its primary key values.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingPrimaryKey`] when a key column has no
    /// value and [`SchemaError::UnknownField`] for keys that are not
    /// columns.
    pub fn delete_sql(&self, row: &Row) -> Result<(String, Vec<SqlValue>)> {
        let row = self.canonical_row(row)?;
        let mut params = Vec::new();
        let filter = self.key_filter(&row, &mut params)?;
        Ok((
            format!("DELETE FROM {} WHERE {filter}", self.quoted_name()),
            params,
        ))
    }

    /// Inserts `row` and returns the affected row count.
    ///
    /// # Errors
    ///
    /// See [`TableSpec::insert_sql`]; driver errors pass through.
    pub async fn insert<C: Connection>(&self, conn: &C, row: &Row) -> Result<u64> {
        let (sql, params) = self.insert_sql(row)?;
        debug!(table = %self.name(), sql = %sql, "inserting row");
        conn.execute(&sql, &params).await
    }

    /// Updates the row identified by `row`'s primary key.
    ///
    /// # Errors
    ///
    /// See [`TableSpec::update_sql`]; driver errors pass through.
    pub async fn update<C: Connection>(&self, conn: &C, row: &Row) -> Result<u64> {
        let (sql, params) = self.update_sql(row)?;
        debug!(table = %self.name(), sql = %sql, "updating row");
        conn.execute(&sql, &params).await
    }

    /// Deletes the row identified by `row`'s primary key.
    ///
    /// # Errors
    ///
    /// See [`TableSpec::delete_sql`]; driver errors pass through.
    pub async fn delete<C: Connection>(&self, conn: &C, row: &Row) -> Result<u64> {
        let (sql, params) = self.delete_sql(row)?;
        debug!(table = %self.name(), sql = %sql, "deleting row");
        conn.execute(&sql, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MYSQL, SQLITE};
    use crate::columns::ColumnDecl;
    use crate::connection::mock::MockConnection;

    fn docs() -> TableSpec {
        let columns = [
            ColumnDecl::new("id", "u64").tag("auto_increment", "true"),
            ColumnDecl::new("title", "String").tag("width", "32"),
            ColumnDecl::new("version", "i32").tag("auto_version", "true"),
            ColumnDecl::new("created", "NaiveDateTime").tag("created_at", "true"),
            ColumnDecl::new("updated", "NaiveDateTime").tag("updated_at", "true"),
        ]
        .iter()
        .map(|d| MYSQL.column_from_decl(d).unwrap())
        .collect();
        TableSpec::new("docs", &MYSQL, columns).unwrap()
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn insert_fills_maintained_columns() {
        let (sql, params) = docs()
            .insert_sql(&row(&[("title", Value::from("a"))]))
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO `docs` (`title`, `version`, `created`, `updated`) \
             VALUES (?, ?, UTC_TIMESTAMP(), UTC_TIMESTAMP())"
        );
        assert_eq!(params, vec![SqlValue::Text("a".to_string()), SqlValue::Int(0)]);
    }

    #[test]
    fn insert_skips_null_auto_increment() {
        let (sql, _) = docs()
            .insert_sql(&row(&[("id", Value::Null), ("title", Value::from("a"))]))
            .unwrap();
        assert!(sql.starts_with("INSERT INTO `docs` (`title`,"));
    }

    #[test]
    fn insert_rejects_unknown_columns() {
        let err = docs()
            .insert_sql(&row(&[("nope", Value::from(1))]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField { .. }));
    }

    #[test]
    fn row_keys_match_columns_ignoring_case() {
        let (sql, params) = docs()
            .insert_sql(&row(&[("Title", Value::from("a"))]))
            .unwrap();
        assert!(sql.starts_with("INSERT INTO `docs` (`title`, `version`,"), "{sql}");
        assert_eq!(params[0], SqlValue::Text("a".to_string()));

        let (sql, _) = docs()
            .update_sql(&row(&[("ID", Value::from(7_u64)), ("TITLE", Value::from("b"))]))
            .unwrap();
        assert!(sql.starts_with("UPDATE `docs` SET `title` = ?,"), "{sql}");
        assert!(sql.ends_with("WHERE `id` = ?"));
    }

    #[test]
    fn column_given_twice_is_refused() {
        let err = docs()
            .insert_sql(&row(&[("title", Value::from("a")), ("Title", Value::from("b"))]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::Conversion { ref column, .. } if column == "title"));
    }

    #[test]
    fn insert_of_defaults_only() {
        let spec = TableSpec::new(
            "counters",
            &SQLITE,
            vec![SQLITE
                .column_from_decl(&ColumnDecl::new("id", "i64").tag("auto_increment", "true"))
                .unwrap()],
        )
        .unwrap();
        let (sql, params) = spec.insert_sql(&Row::new()).unwrap();
        assert_eq!(sql, "INSERT INTO `counters` DEFAULT VALUES");
        assert!(params.is_empty());
    }

    #[test]
    fn update_bumps_version_and_timestamp() {
        let (sql, params) = docs()
            .update_sql(&row(&[("id", Value::from(7_u64)), ("title", Value::from("b"))]))
            .unwrap();
        assert_eq!(
            sql,
            "UPDATE `docs` SET `title` = ?, `version` = `version` + 1, \
             `updated` = UTC_TIMESTAMP() WHERE `id` = ?"
        );
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], SqlValue::Text("b".to_string()));
    }

    #[test]
    fn update_requires_primary_key() {
        let err = docs()
            .update_sql(&row(&[("title", Value::from("b"))]))
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingPrimaryKey { ref column, .. } if column == "id"
        ));
    }

    #[test]
    fn update_without_columns_is_refused() {
        let spec = TableSpec::new(
            "tags",
            &MYSQL,
            vec![
                MYSQL
                    .column_from_decl(&ColumnDecl::new("id", "u64").tag("primary", "true"))
                    .unwrap(),
                MYSQL
                    .column_from_decl(&ColumnDecl::new("label", "String").tag("width", "16"))
                    .unwrap(),
            ],
        )
        .unwrap();
        let err = spec
            .update_sql(&row(&[("id", Value::from(1_u64))]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::EmptyUpdate { .. }));
    }

    #[tokio::test]
    async fn delete_executes_by_key() {
        let conn = MockConnection::default();
        docs()
            .delete(&conn, &row(&[("id", Value::from(3_u64))]))
            .await
            .unwrap();
        assert_eq!(conn.statements(), ["DELETE FROM `docs` WHERE `id` = ?"]);
    }
}
