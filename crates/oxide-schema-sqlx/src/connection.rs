//! [`Connection`] over a sqlx SQLite pool.

use oxide_schema_core::connection::{Connection, StringMap};
use oxide_schema_core::value::SqlValue;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use tracing::debug;

use crate::error::{DriverError, Result};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Runs the statements the core renders on a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqlxConnection {
    pool: SqlitePool,
}

impl SqlxConnection {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!(sql = %sql, params = params.len(), "Executing SQL");
        let result = bind_all(sqlx::query(sql), params)?
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<StringMap>> {
        debug!(sql = %sql, params = params.len(), "Fetching rows");
        let rows = bind_all(sqlx::query(sql), params)?
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_map).collect()
    }

    async fn run_batch(&self, statements: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for sql in statements {
            debug!(sql = %sql, "Executing SQL");
            sqlx::query(sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &'q [SqlValue]) -> Result<SqliteQuery<'q>> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::UInt(u) => {
                let signed = i64::try_from(*u)
                    .map_err(|_| DriverError::Bind(format!("{u} exceeds the SQLite integer range")))?;
                query.bind(signed)
            }
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Blob(b) => query.bind(b.as_slice()),
        };
    }
    Ok(query)
}

/// Renders every column of a row as text, following the value's storage
/// class rather than the declared column type.
fn row_to_map(row: &SqliteRow) -> Result<StringMap> {
    let mut map = StringMap::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let text = if raw.is_null() {
            None
        } else {
            let storage = raw.type_info().name().to_ascii_uppercase();
            Some(match storage.as_str() {
                "INTEGER" => row.try_get_unchecked::<i64, _>(i)?.to_string(),
                "REAL" => row.try_get_unchecked::<f64, _>(i)?.to_string(),
                "BLOB" => String::from_utf8_lossy(&row.try_get_unchecked::<Vec<u8>, _>(i)?)
                    .into_owned(),
                _ => row.try_get_unchecked::<String, _>(i)?,
            })
        };
        map.insert(column.name().to_string(), text);
    }
    Ok(map)
}

impl Connection for SqlxConnection {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> oxide_schema_core::Result<u64> {
        Ok(self.run(sql, params).await?)
    }

    async fn fetch_rows(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> oxide_schema_core::Result<Vec<StringMap>> {
        Ok(self.fetch(sql, params).await?)
    }

    async fn execute_batch(&self, statements: &[String]) -> oxide_schema_core::Result<()> {
        Ok(self.run_batch(statements).await?)
    }
}
