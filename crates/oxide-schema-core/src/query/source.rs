//! Row sources a query selects from: bound tables and derived tables.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::field::Field;
use super::{Query, Union};
use crate::backend::Backend;
use crate::error::{Result, SchemaError};
use crate::table::TableSpec;

/// Identity of one source within a query tree.
///
/// Two instances of the same table (a self join) get distinct ids, so
/// their fields render under distinct aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A table specification bound into a query scope.
#[derive(Debug, Clone)]
pub struct TableRef {
    id: SourceId,
    spec: TableSpec,
}

impl TableSpec {
    /// Binds this table into a query scope with a fresh identity.
    #[must_use]
    pub fn instance(&self) -> TableRef {
        TableRef {
            id: SourceId::next(),
            spec: self.clone(),
        }
    }

    /// Shorthand for `self.instance().query()`.
    #[must_use]
    pub fn query(&self) -> Query {
        self.instance().query()
    }
}

impl TableRef {
    /// Identity of this instance.
    #[must_use]
    pub const fn id(&self) -> SourceId {
        self.id
    }

    /// The bound table.
    #[must_use]
    pub const fn spec(&self) -> &TableSpec {
        &self.spec
    }

    /// Looks up a column of the bound table.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] when the table has no such column.
    pub fn field(&self, name: &str) -> Result<Field> {
        let column = self
            .spec
            .column(name)
            .ok_or_else(|| SchemaError::UnknownField {
                scope: format!("table `{}`", self.spec.name()),
                field: name.to_string(),
            })?;
        Ok(Field::column(
            self.id,
            self.spec.name(),
            column.name(),
            Some(column.clone()),
        ))
    }

    /// Every column of the bound table, in declaration order.
    #[must_use]
    pub fn fields(&self) -> Vec<Field> {
        self.spec
            .columns()
            .iter()
            .map(|c| Field::column(self.id, self.spec.name(), c.name(), Some(c.clone())))
            .collect()
    }

    /// Starts a query over this instance.
    #[must_use]
    pub fn query(&self) -> Query {
        Query::new(self.clone())
    }
}

#[derive(Debug)]
pub(crate) enum Derived {
    Select(Query),
    Union(Union),
}

/// A query or union wrapped as a derived table.
///
/// Its projected fields are addressable by the outer query.
#[derive(Debug, Clone)]
pub struct SubQuery {
    id: SourceId,
    pub(crate) body: Arc<Derived>,
}

impl SubQuery {
    pub(crate) fn new(body: Derived) -> Self {
        Self {
            id: SourceId::next(),
            body: Arc::new(body),
        }
    }

    /// Identity of this derived table.
    #[must_use]
    pub const fn id(&self) -> SourceId {
        self.id
    }

    pub(crate) fn backend(&self) -> &'static dyn Backend {
        match self.body.as_ref() {
            Derived::Select(q) => q.backend(),
            Derived::Union(u) => u.backend(),
        }
    }

    fn inner_fields(&self) -> Vec<Field> {
        match self.body.as_ref() {
            Derived::Select(q) => q.output_fields(),
            Derived::Union(u) => u.output_fields(),
        }
    }

    /// Looks up a projected field of the wrapped query.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] when the wrapped query does
    /// not project a field with that name.
    pub fn field(&self, name: &str) -> Result<Field> {
        self.fields()
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| SchemaError::UnknownField {
                scope: "subquery".to_string(),
                field: name.to_string(),
            })
    }

    /// The wrapped query's projection, re-addressed through this derived table.
    #[must_use]
    pub fn fields(&self) -> Vec<Field> {
        self.inner_fields()
            .iter()
            .map(|f| {
                Field::column(
                    self.id,
                    "subquery",
                    f.name(),
                    f.column_spec().cloned(),
                )
            })
            .collect()
    }

    /// Starts a query over this derived table.
    #[must_use]
    pub fn query(&self) -> Query {
        Query::new(self.clone())
    }
}

/// Anything a query can select from or join.
#[derive(Debug, Clone)]
pub enum Source {
    /// A bound table.
    Table(TableRef),
    /// A derived table.
    Sub(SubQuery),
}

impl Source {
    /// Identity of the source.
    #[must_use]
    pub const fn id(&self) -> SourceId {
        match self {
            Self::Table(t) => t.id,
            Self::Sub(s) => s.id,
        }
    }

    pub(crate) fn backend(&self) -> &'static dyn Backend {
        match self {
            Self::Table(t) => t.spec.backend(),
            Self::Sub(s) => s.backend(),
        }
    }

    pub(crate) fn fields(&self) -> Vec<Field> {
        match self {
            Self::Table(t) => t.fields(),
            Self::Sub(s) => s.fields(),
        }
    }

    pub(crate) fn field(&self, name: &str) -> Result<Field> {
        match self {
            Self::Table(t) => t.field(name),
            Self::Sub(s) => s.field(name),
        }
    }
}

impl From<TableRef> for Source {
    fn from(table: TableRef) -> Self {
        Self::Table(table)
    }
}

impl From<&TableRef> for Source {
    fn from(table: &TableRef) -> Self {
        Self::Table(table.clone())
    }
}

impl From<SubQuery> for Source {
    fn from(sub: SubQuery) -> Self {
        Self::Sub(sub)
    }
}

impl From<&SubQuery> for Source {
    fn from(sub: &SubQuery) -> Self {
        Self::Sub(sub.clone())
    }
}
