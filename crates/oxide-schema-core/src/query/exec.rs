//! Running queries through a [`Connection`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use tracing::debug;

use super::field::Field;
use super::Query;
use crate::connection::{Connection, StringMap};
use crate::error::{Result, SchemaError};
use crate::value::Value;

/// A fetched row decoded through the projected fields' column metadata.
pub type ValueMap = BTreeMap<String, Value>;

fn decode_row(fields: &[Field], row: StringMap) -> Result<ValueMap> {
    row.into_iter()
        .map(|(key, text)| {
            let value = match fields
                .iter()
                .find(|f| f.name() == key)
                .and_then(Field::column_spec)
            {
                Some(spec) => spec.parse_optional(text.as_deref())?,
                None => text.map_or(Value::Null, Value::Text),
            };
            Ok((key, value))
        })
        .collect()
}

fn to_struct<T: DeserializeOwned>(row: &ValueMap) -> Result<T> {
    let object: serde_json::Map<String, serde_json::Value> = row
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    Ok(serde_json::from_value(serde_json::Value::Object(object))?)
}

impl Query {
    async fn fetch<C: Connection>(&self, conn: &C) -> Result<Vec<StringMap>> {
        let (sql, params) = self.to_sql()?;
        debug!(sql = %sql, params = params.len(), "running query");
        conn.fetch_rows(&sql, &params).await
    }

    /// Number of rows the query yields.
    ///
    /// # Errors
    ///
    /// Propagates driver errors; returns [`SchemaError::Conversion`] when
    /// the count is not an integer.
    pub async fn count<C: Connection>(&self, conn: &C) -> Result<u64> {
        let rows = self.count_query().fetch(conn).await?;
        let text = rows
            .first()
            .and_then(|row| row.get("count").cloned().flatten())
            .unwrap_or_else(|| "0".to_string());
        text.parse().map_err(|_| SchemaError::Conversion {
            column: "count".to_string(),
            value: text.clone(),
            reason: "not an unsigned integer".to_string(),
        })
    }

    /// Every row as text.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub async fn all_string_map<C: Connection>(&self, conn: &C) -> Result<Vec<StringMap>> {
        self.fetch(conn).await
    }

    /// The first row as text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotFound`] when the query yields no rows.
    pub async fn first_string_map<C: Connection>(&self, conn: &C) -> Result<StringMap> {
        self.clone()
            .limit(1)
            .fetch(conn)
            .await?
            .into_iter()
            .next()
            .ok_or(SchemaError::NotFound)
    }

    /// Every row decoded into typed values.
    ///
    /// # Errors
    ///
    /// Propagates driver errors and [`SchemaError::Conversion`] for stored
    /// text a column cannot parse.
    pub async fn all_values<C: Connection>(&self, conn: &C) -> Result<Vec<ValueMap>> {
        let fields = self.output_fields();
        self.fetch(conn)
            .await?
            .into_iter()
            .map(|row| decode_row(&fields, row))
            .collect()
    }

    /// The first row decoded into typed values.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotFound`] when the query yields no rows.
    pub async fn first_values<C: Connection>(&self, conn: &C) -> Result<ValueMap> {
        let row = self.first_string_map(conn).await?;
        decode_row(&self.output_fields(), row)
    }

    /// Every row deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Json`] when a row does not fit `T`.
    pub async fn all<T: DeserializeOwned, C: Connection>(&self, conn: &C) -> Result<Vec<T>> {
        self.all_values(conn).await?.iter().map(to_struct).collect()
    }

    /// The first row deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotFound`] when the query yields no rows and
    /// [`SchemaError::Json`] when the row does not fit `T`.
    pub async fn first<T: DeserializeOwned, C: Connection>(&self, conn: &C) -> Result<T> {
        to_struct(&self.first_values(conn).await?)
    }
}
