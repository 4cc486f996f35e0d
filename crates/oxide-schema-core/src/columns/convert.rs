//! Value conversion between native values, bind values and stored text.

use chrono::{DateTime, NaiveDateTime};

use super::{ColumnKind, ColumnSpec};
use crate::error::{Result, SchemaError};
use crate::tristate::TriState;
use crate::value::{SqlValue, Value, DATETIME_FORMAT};

/// Parses the textual booleans accepted in tags and stored values.
pub(crate) fn parse_bool_text(s: &str) -> Option<bool> {
    let trimmed = s.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        other => other.parse::<i64>().ok().map(|n| n != 0),
    }
}

/// Parses the timestamp layouts databases hand back.
pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

impl ColumnSpec {
    fn conversion_error(&self, value: impl ToString, reason: &str) -> SchemaError {
        SchemaError::Conversion {
            column: self.name.clone(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Converts a native value into the value bound for this column.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Conversion`] when the value does not fit the
    /// column kind, and [`SchemaError::Json`] when a compound value cannot
    /// be serialized.
    pub fn convert_from_value(&self, value: &Value) -> Result<SqlValue> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        match (self.kind, value) {
            (ColumnKind::Boolean, Value::Bool(b)) => Ok(SqlValue::Int(i64::from(*b))),
            (ColumnKind::Boolean, Value::Int(n)) => Ok(SqlValue::Int(i64::from(*n != 0))),
            (ColumnKind::Boolean, Value::UInt(n)) => Ok(SqlValue::Int(i64::from(*n != 0))),
            (ColumnKind::TriState, Value::TriState(t)) => {
                Ok(t.as_bool().map_or(SqlValue::Null, |b| SqlValue::Int(i64::from(b))))
            }
            (ColumnKind::TriState, Value::Bool(b)) => Ok(SqlValue::Int(i64::from(*b))),
            (ColumnKind::Integer { unsigned }, Value::Int(n)) => {
                if unsigned {
                    u64::try_from(*n)
                        .map(SqlValue::UInt)
                        .map_err(|_| self.conversion_error(n, "negative value for unsigned column"))
                } else {
                    Ok(SqlValue::Int(*n))
                }
            }
            (ColumnKind::Integer { unsigned }, Value::UInt(n)) => {
                if unsigned {
                    Ok(SqlValue::UInt(*n))
                } else {
                    i64::try_from(*n)
                        .map(SqlValue::Int)
                        .map_err(|_| self.conversion_error(n, "value out of range"))
                }
            }
            (ColumnKind::Integer { .. }, Value::Bool(b)) => Ok(SqlValue::Int(i64::from(*b))),
            (ColumnKind::Float, Value::Float(x)) => Ok(SqlValue::Float(*x)),
            #[allow(clippy::cast_precision_loss)]
            (ColumnKind::Float, Value::Int(n)) => Ok(SqlValue::Float(*n as f64)),
            #[allow(clippy::cast_precision_loss)]
            (ColumnKind::Float, Value::UInt(n)) => Ok(SqlValue::Float(*n as f64)),
            (ColumnKind::DateTime, Value::DateTime(dt)) => {
                Ok(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()))
            }
            (ColumnKind::Compound, Value::Json(v)) => Ok(SqlValue::Text(serde_json::to_string(v)?)),
            (ColumnKind::Compound, Value::Text(s)) => Ok(SqlValue::Text(s.clone())),
            (ColumnKind::Compound, other) => {
                Ok(SqlValue::Text(serde_json::to_string(&other.to_json())?))
            }
            (ColumnKind::Text, Value::Json(v)) => Ok(SqlValue::Text(serde_json::to_string(v)?)),
            (ColumnKind::Text, other) => Ok(SqlValue::Text(other.to_string())),
            (_, Value::Text(s)) => self.convert_from_string(s),
            (_, other) => Err(self.conversion_error(other, "value does not match column kind")),
        }
    }

    /// Converts text supplied by a caller into the value bound for this
    /// column.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Conversion`] when the text cannot be read as
    /// the column kind.
    pub fn convert_from_string(&self, s: &str) -> Result<SqlValue> {
        match self.kind {
            ColumnKind::Boolean => parse_bool_text(s)
                .map(|b| SqlValue::Int(i64::from(b)))
                .ok_or_else(|| self.conversion_error(s, "not a boolean")),
            ColumnKind::TriState => s
                .parse::<TriState>()
                .map(|t| t.as_bool().map_or(SqlValue::Null, |b| SqlValue::Int(i64::from(b))))
                .map_err(|_| self.conversion_error(s, "not a tri-state")),
            ColumnKind::Integer { unsigned: true } => s
                .trim()
                .parse::<u64>()
                .map(SqlValue::UInt)
                .map_err(|_| self.conversion_error(s, "not an unsigned integer")),
            ColumnKind::Integer { unsigned: false } => s
                .trim()
                .parse::<i64>()
                .map(SqlValue::Int)
                .map_err(|_| self.conversion_error(s, "not an integer")),
            ColumnKind::Float => s
                .trim()
                .parse::<f64>()
                .map(SqlValue::Float)
                .map_err(|_| self.conversion_error(s, "not a number")),
            ColumnKind::DateTime => parse_datetime(s)
                .map(|dt| SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()))
                .ok_or_else(|| self.conversion_error(s, "not a timestamp")),
            ColumnKind::Text => Ok(SqlValue::Text(s.to_string())),
            ColumnKind::Compound => {
                let parsed: serde_json::Value = serde_json::from_str(s)?;
                Ok(SqlValue::Text(serde_json::to_string(&parsed)?))
            }
        }
    }

    /// Decodes text read from the database into a native value.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Conversion`] or [`SchemaError::Json`] when the
    /// stored text does not match the column kind.
    pub fn parse_value(&self, s: &str) -> Result<Value> {
        match self.kind {
            ColumnKind::Boolean => parse_bool_text(s)
                .map(Value::Bool)
                .ok_or_else(|| self.conversion_error(s, "not a boolean")),
            ColumnKind::TriState => s
                .parse::<TriState>()
                .map(Value::TriState)
                .map_err(|_| self.conversion_error(s, "not a tri-state")),
            ColumnKind::Integer { unsigned: true } => s
                .trim()
                .parse::<u64>()
                .map(Value::UInt)
                .map_err(|_| self.conversion_error(s, "not an unsigned integer")),
            ColumnKind::Integer { unsigned: false } => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.conversion_error(s, "not an integer")),
            ColumnKind::Float => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.conversion_error(s, "not a number")),
            ColumnKind::DateTime => parse_datetime(s)
                .map(Value::DateTime)
                .ok_or_else(|| self.conversion_error(s, "not a timestamp")),
            ColumnKind::Text => Ok(Value::Text(s.to_string())),
            ColumnKind::Compound => Ok(Value::Json(serde_json::from_str(s)?)),
        }
    }

    /// Decodes an optional stored value; NULL becomes [`Value::Null`], or
    /// [`TriState::None`] for tri-state columns.
    ///
    /// # Errors
    ///
    /// See [`ColumnSpec::parse_value`].
    pub fn parse_optional(&self, s: Option<&str>) -> Result<Value> {
        match (s, self.kind) {
            (None, ColumnKind::TriState) => Ok(Value::TriState(TriState::None)),
            (None, _) => Ok(Value::Null),
            (Some(text), _) => self.parse_value(text),
        }
    }
}
