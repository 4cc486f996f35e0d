//! Scope checks run before a query tree renders.
//!
//! Every column a query mentions must come from its own FROM or JOIN
//! sources. Conditions of the form `field IN (subquery)` may also refer
//! to the enclosing query's sources. Derived tables see no outer scope.

use super::condition::{Condition, Operand};
use super::field::{Field, FieldExpr};
use super::source::{Derived, Source, SourceId};
use super::{Query, Union};
use crate::error::{Result, SchemaError};

impl Field {
    fn check_scope(&self, scope: &[SourceId]) -> Result<()> {
        match &self.expr {
            FieldExpr::Column {
                source,
                table,
                name,
                ..
            } => {
                if scope.contains(source) {
                    Ok(())
                } else {
                    Err(SchemaError::UnknownField {
                        scope: "query".to_string(),
                        field: format!("{table}.{name}"),
                    })
                }
            }
            FieldExpr::Function { args, .. } => args.iter().try_for_each(|a| a.check_scope(scope)),
            FieldExpr::Cast { inner, .. } => inner.check_scope(scope),
        }
    }
}

impl Condition {
    fn check_scope(&self, scope: &[SourceId]) -> Result<()> {
        match self {
            Self::And(children) | Self::Or(children) => {
                children.iter().try_for_each(|c| c.check_scope(scope))
            }
            Self::Not(inner) => inner.check_scope(scope),
            Self::Compare { left, right, .. } => {
                left.check_scope(scope)?;
                match right {
                    Operand::Field(f) => f.check_scope(scope),
                    Operand::Value(_) => Ok(()),
                }
            }
            Self::InQuery { field, query, .. } => {
                field.check_scope(scope)?;
                query.check_scope(scope)
            }
            Self::Like { field, .. }
            | Self::Regexp { field, .. }
            | Self::In { field, .. }
            | Self::Null { field, .. }
            | Self::Empty { field, .. }
            | Self::Between { field, .. } => field.check_scope(scope),
        }
    }
}

impl Source {
    fn check_scope(&self) -> Result<()> {
        match self {
            Self::Table(_) => Ok(()),
            Self::Sub(sub) => match sub.body.as_ref() {
                Derived::Select(q) => q.check_scope(&[]),
                Derived::Union(u) => u.check_scope(),
            },
        }
    }
}

impl Query {
    /// Fails with [`SchemaError::UnknownField`] on the first field whose
    /// source is neither one of this query's sources nor in `enclosing`.
    pub(crate) fn check_scope(&self, enclosing: &[SourceId]) -> Result<()> {
        let mut scope = enclosing.to_vec();
        scope.push(self.from.id());
        scope.extend(self.joins.iter().map(|j| j.source.id()));

        self.from.check_scope()?;
        for join in &self.joins {
            join.source.check_scope()?;
            join.on.check_scope(&scope)?;
        }
        self.fields
            .iter()
            .chain(&self.group_by)
            .chain(self.order_by.iter().map(|(f, _)| f))
            .try_for_each(|f| f.check_scope(&scope))?;
        self.filters.iter().try_for_each(|c| c.check_scope(&scope))
    }
}

impl Union {
    pub(crate) fn check_scope(&self) -> Result<()> {
        self.queries.iter().try_for_each(|q| q.check_scope(&[]))
    }
}
