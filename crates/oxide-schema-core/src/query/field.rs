//! Projected expressions: columns, function calls and casts.

use super::condition::{CompareOp, Condition, Operand};
use super::source::SourceId;
use super::Query;
use crate::backend::Backend;
use crate::columns::ColumnSpec;
use crate::error::{Result, SchemaError};
use crate::value::{SqlValue, ToSqlValue};

/// Substitution point in function templates.
const PLACEHOLDER: &str = "{}";

/// Escape character used by the pattern helpers.
pub(crate) const LIKE_ESCAPE: char = '!';

#[derive(Debug, Clone)]
pub(crate) enum FieldExpr {
    Column {
        source: SourceId,
        table: String,
        name: String,
        spec: Option<ColumnSpec>,
    },
    Function {
        name: String,
        parts: Vec<String>,
        args: Vec<Field>,
        spec: Option<ColumnSpec>,
    },
    Cast {
        inner: Box<Field>,
        sql_type: String,
        name: String,
    },
}

/// A value-producing expression usable in projections, conditions,
/// grouping and ordering.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) expr: FieldExpr,
    alias: Option<String>,
}

impl Field {
    pub(crate) fn column(
        source: SourceId,
        table: &str,
        name: &str,
        spec: Option<ColumnSpec>,
    ) -> Self {
        Self {
            expr: FieldExpr::Column {
                source,
                table: table.to_string(),
                name: name.to_string(),
                spec,
            },
            alias: None,
        }
    }

    fn from_parts(name: &str, parts: Vec<String>, args: Vec<Self>) -> Self {
        Self {
            expr: FieldExpr::Function {
                name: name.to_string(),
                parts,
                args,
                spec: None,
            },
            alias: None,
        }
    }

    /// Builds a function field from a template with one `{}` per argument.
    ///
    /// ```
    /// # use oxide_schema_core::query::Field;
    /// let f = Field::function("now", "NOW()", Vec::new()).unwrap();
    /// assert_eq!(f.name(), "now");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidFunctionTemplate`] when the number of
    /// placeholders differs from the number of arguments.
    pub fn function(name: &str, template: &str, args: Vec<Self>) -> Result<Self> {
        let parts: Vec<String> = template.split(PLACEHOLDER).map(str::to_string).collect();
        let placeholders = parts.len() - 1;
        if placeholders != args.len() {
            return Err(SchemaError::InvalidFunctionTemplate {
                template: template.to_string(),
                placeholders,
                args: args.len(),
            });
        }
        Ok(Self::from_parts(name, parts, args))
    }

    /// Output name: the label if one was set, otherwise the column or
    /// function name.
    #[must_use]
    pub fn name(&self) -> &str {
        if let Some(alias) = &self.alias {
            return alias;
        }
        match &self.expr {
            FieldExpr::Column { name, .. }
            | FieldExpr::Function { name, .. }
            | FieldExpr::Cast { name, .. } => name,
        }
    }

    /// Renames the field in the projection (`AS name`).
    #[must_use]
    pub fn label(mut self, name: &str) -> Self {
        self.alias = Some(name.to_string());
        self
    }

    pub(crate) const fn alias(&self) -> Option<&String> {
        self.alias.as_ref()
    }

    /// Column metadata used to decode fetched values, when known.
    #[must_use]
    pub fn column_spec(&self) -> Option<&ColumnSpec> {
        match &self.expr {
            FieldExpr::Column { spec, .. } | FieldExpr::Function { spec, .. } => spec.as_ref(),
            FieldExpr::Cast { .. } => None,
        }
    }

    fn decoded_as(mut self, column: Option<&ColumnSpec>) -> Self {
        if let FieldExpr::Function { spec, .. } = &mut self.expr {
            *spec = column.cloned();
        }
        self
    }

    // ================================================================
    // Conditions
    // ================================================================

    fn compare(&self, op: CompareOp, right: Operand) -> Condition {
        Condition::Compare {
            left: self.clone(),
            op,
            right,
        }
    }

    /// `field = value`
    #[must_use]
    pub fn eq<T: ToSqlValue>(&self, value: T) -> Condition {
        self.compare(CompareOp::Eq, Operand::Value(value.to_sql_value()))
    }

    /// `field != value`
    #[must_use]
    pub fn not_eq<T: ToSqlValue>(&self, value: T) -> Condition {
        self.compare(CompareOp::NotEq, Operand::Value(value.to_sql_value()))
    }

    /// `field < value`
    #[must_use]
    pub fn lt<T: ToSqlValue>(&self, value: T) -> Condition {
        self.compare(CompareOp::Lt, Operand::Value(value.to_sql_value()))
    }

    /// `field <= value`
    #[must_use]
    pub fn lt_eq<T: ToSqlValue>(&self, value: T) -> Condition {
        self.compare(CompareOp::LtEq, Operand::Value(value.to_sql_value()))
    }

    /// `field > value`
    #[must_use]
    pub fn gt<T: ToSqlValue>(&self, value: T) -> Condition {
        self.compare(CompareOp::Gt, Operand::Value(value.to_sql_value()))
    }

    /// `field >= value`
    #[must_use]
    pub fn gt_eq<T: ToSqlValue>(&self, value: T) -> Condition {
        self.compare(CompareOp::GtEq, Operand::Value(value.to_sql_value()))
    }

    /// Compares against another field, as in a join condition.
    #[must_use]
    pub fn cmp_field(&self, op: CompareOp, other: &Self) -> Condition {
        self.compare(op, Operand::Field(other.clone()))
    }

    /// `field = other`
    #[must_use]
    pub fn eq_field(&self, other: &Self) -> Condition {
        self.cmp_field(CompareOp::Eq, other)
    }

    /// `field LIKE pattern`, with the pattern passed through untouched.
    #[must_use]
    pub fn like(&self, pattern: &str) -> Condition {
        Condition::Like {
            field: self.clone(),
            pattern: pattern.to_string(),
            negated: false,
            escaped: false,
        }
    }

    /// `field NOT LIKE pattern`
    #[must_use]
    pub fn not_like(&self, pattern: &str) -> Condition {
        Condition::Like {
            field: self.clone(),
            pattern: pattern.to_string(),
            negated: true,
            escaped: false,
        }
    }

    fn escaped_like(&self, pattern: String) -> Condition {
        Condition::Like {
            field: self.clone(),
            pattern,
            negated: false,
            escaped: true,
        }
    }

    /// Matches values beginning with `prefix`, taken literally.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> Condition {
        self.escaped_like(format!("{}%", escape_like(prefix)))
    }

    /// Matches values ending with `suffix`, taken literally.
    #[must_use]
    pub fn ends_with(&self, suffix: &str) -> Condition {
        self.escaped_like(format!("%{}", escape_like(suffix)))
    }

    /// Matches values containing `needle`, taken literally.
    #[must_use]
    pub fn contains(&self, needle: &str) -> Condition {
        self.escaped_like(format!("%{}%", escape_like(needle)))
    }

    /// Regular expression match in the backend's regexp syntax.
    #[must_use]
    pub fn regexp(&self, pattern: &str) -> Condition {
        Condition::Regexp {
            field: self.clone(),
            pattern: pattern.to_string(),
        }
    }

    /// `field IN (...)`; an empty list matches nothing.
    #[must_use]
    pub fn in_list<T: ToSqlValue>(&self, values: impl IntoIterator<Item = T>) -> Condition {
        Condition::In {
            field: self.clone(),
            values: values.into_iter().map(|v| v.to_sql_value()).collect(),
            negated: false,
        }
    }

    /// `field NOT IN (...)`; an empty list matches everything.
    #[must_use]
    pub fn not_in_list<T: ToSqlValue>(&self, values: impl IntoIterator<Item = T>) -> Condition {
        Condition::In {
            field: self.clone(),
            values: values.into_iter().map(|v| v.to_sql_value()).collect(),
            negated: true,
        }
    }

    /// `field IN (SELECT ...)`
    #[must_use]
    pub fn in_query(&self, query: &Query) -> Condition {
        Condition::InQuery {
            field: self.clone(),
            query: Box::new(query.clone()),
            negated: false,
        }
    }

    /// `field NOT IN (SELECT ...)`
    #[must_use]
    pub fn not_in_query(&self, query: &Query) -> Condition {
        Condition::InQuery {
            field: self.clone(),
            query: Box::new(query.clone()),
            negated: true,
        }
    }

    /// `field IS NULL`
    #[must_use]
    pub fn is_null(&self) -> Condition {
        Condition::Null {
            field: self.clone(),
            negated: false,
        }
    }

    /// `field IS NOT NULL`
    #[must_use]
    pub fn is_not_null(&self) -> Condition {
        Condition::Null {
            field: self.clone(),
            negated: true,
        }
    }

    /// Text of zero length.
    #[must_use]
    pub fn is_empty(&self) -> Condition {
        Condition::Empty {
            field: self.clone(),
            negated: false,
        }
    }

    /// Text of non-zero length.
    #[must_use]
    pub fn is_not_empty(&self) -> Condition {
        Condition::Empty {
            field: self.clone(),
            negated: true,
        }
    }

    /// `field BETWEEN low AND high`
    #[must_use]
    pub fn between<T: ToSqlValue, U: ToSqlValue>(&self, low: T, high: U) -> Condition {
        Condition::Between {
            field: self.clone(),
            low: low.to_sql_value(),
            high: high.to_sql_value(),
        }
    }
}

/// Escapes LIKE wildcards so `text` matches literally.
pub(crate) fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Common SQL functions.
pub mod functions {
    use super::{Backend, Field};

    fn unary(name: &str, open: &str, arg: &Field) -> Field {
        Field::from_parts(
            name,
            vec![open.to_string(), ")".to_string()],
            vec![arg.clone()],
        )
    }

    /// `COUNT(*)`
    #[must_use]
    pub fn count(name: &str) -> Field {
        Field::from_parts(name, vec!["COUNT(*)".to_string()], Vec::new())
    }

    /// `COUNT(field)`
    #[must_use]
    pub fn count_of(name: &str, field: &Field) -> Field {
        unary(name, "COUNT(", field)
    }

    /// `SUM(field)`
    #[must_use]
    pub fn sum(name: &str, field: &Field) -> Field {
        unary(name, "SUM(", field)
    }

    /// `MAX(field)`, decoded like the argument.
    #[must_use]
    pub fn max(name: &str, field: &Field) -> Field {
        unary(name, "MAX(", field).decoded_as(field.column_spec())
    }

    /// `MIN(field)`, decoded like the argument.
    #[must_use]
    pub fn min(name: &str, field: &Field) -> Field {
        unary(name, "MIN(", field).decoded_as(field.column_spec())
    }

    /// `AVG(field)`
    #[must_use]
    pub fn avg(name: &str, field: &Field) -> Field {
        unary(name, "AVG(", field)
    }

    /// `DISTINCT(field)`, decoded like the argument.
    #[must_use]
    pub fn distinct(name: &str, field: &Field) -> Field {
        unary(name, "DISTINCT(", field).decoded_as(field.column_spec())
    }

    /// `CAST(field AS sql_type)`
    #[must_use]
    pub fn cast(field: &Field, sql_type: &str, name: &str) -> Field {
        Field {
            expr: super::FieldExpr::Cast {
                inner: Box::new(field.clone()),
                sql_type: sql_type.to_string(),
                name: name.to_string(),
            },
            alias: None,
        }
    }

    /// Concatenates the grouped values of `field` with `separator`.
    #[must_use]
    pub fn group_concat(backend: &dyn Backend, name: &str, field: &Field, separator: &str) -> Field {
        let (before, after) = backend.group_concat_parts(separator);
        Field::from_parts(name, vec![before, after], vec![field.clone()])
    }
}

pub(crate) fn bind_all(values: &[SqlValue]) -> String {
    vec!["?"; values.len()].join(", ")
}
