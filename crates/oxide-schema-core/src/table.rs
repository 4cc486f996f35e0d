//! Table specifications.
//!
//! A [`TableSpec`] is the desired shape of one table: its name, ordered
//! columns, primary key and indexes, bound to a backend. Specifications
//! are immutable once built and cheap to clone.

use std::sync::Arc;

use crate::backend::Backend;
use crate::columns::{parse_bool_text, tags, ColumnDecl, ColumnSpec};
use crate::error::DeclarationError;

/// Implemented by `#[derive(Table)]` for structs describing a table.
pub trait TableDecl {
    /// Table name.
    const NAME: &'static str;

    /// Column declarations in field order.
    fn columns() -> Vec<ColumnDecl>;
}

/// A named index over an ordered list of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    name: String,
    columns: Vec<String>,
    unique: bool,
}

impl IndexSpec {
    /// Creates an index. Column names are lower-cased.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[impl AsRef<str>], unique: bool) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.as_ref().to_lowercase()).collect(),
            unique,
        }
    }

    /// Creates an index named `ix_<table>_<col>_<col>...`.
    #[must_use]
    pub fn auto_named(table: &str, columns: &[impl AsRef<str>], unique: bool) -> Self {
        let mut name = format!("ix_{table}");
        for c in columns {
            name.push('_');
            name.push_str(&c.as_ref().to_lowercase());
        }
        Self::new(name, columns, unique)
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indexed columns, in key order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the index enforces uniqueness.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns `true` when the index covers exactly `columns` in the same
    /// order. Column names compare case-insensitively.
    #[must_use]
    pub fn is_identical(&self, columns: &[impl AsRef<str>]) -> bool {
        self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b.as_ref()))
    }
}

#[derive(Debug, Clone)]
struct TableInner {
    name: String,
    backend: &'static dyn Backend,
    columns: Vec<ColumnSpec>,
    indexes: Vec<IndexSpec>,
}

/// Desired schema of one table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    inner: Arc<TableInner>,
}

impl TableSpec {
    /// Builds a table from already constructed columns.
    ///
    /// Indexes declared through the `index` and `unique_index` column
    /// tags are collected here. A tag value of `true` creates a single
    /// column index named after the table and column; any other value is
    /// a comma separated list of index names the column joins, in
    /// column declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::DuplicateColumn`] when two columns share
    /// a name, or [`DeclarationError::InvalidTag`] for a malformed index
    /// tag.
    pub fn new(
        name: impl Into<String>,
        backend: &'static dyn Backend,
        columns: Vec<ColumnSpec>,
    ) -> Result<Self, DeclarationError> {
        let name = name.into();
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name() == col.name()) {
                return Err(DeclarationError::DuplicateColumn {
                    table: name,
                    column: col.name().to_string(),
                });
            }
        }
        let indexes = collect_tag_indexes(&name, &columns)?;
        Ok(Self {
            inner: Arc::new(TableInner {
                name,
                backend,
                columns,
                indexes,
            }),
        })
    }

    /// Builds a table from a `#[derive(Table)]` struct.
    ///
    /// # Errors
    ///
    /// Propagates the first column [`DeclarationError`].
    pub fn from_decl<T: TableDecl>(backend: &'static dyn Backend) -> Result<Self, DeclarationError> {
        let columns = T::columns()
            .iter()
            .map(|decl| backend.column_from_decl(decl))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(T::NAME, backend, columns)
    }

    /// Adds an index named after the table and its columns.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::UnknownIndexColumn`] when a column is
    /// not part of the table.
    pub fn with_index(self, columns: &[&str], unique: bool) -> Result<Self, DeclarationError> {
        let index = IndexSpec::auto_named(self.name(), columns, unique);
        self.with_named_index(index)
    }

    /// Adds an explicitly named index.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::UnknownIndexColumn`] when a column is
    /// not part of the table.
    pub fn with_named_index(mut self, index: IndexSpec) -> Result<Self, DeclarationError> {
        if let Some(missing) = index.columns().iter().find(|c| self.column(c).is_none()) {
            return Err(DeclarationError::UnknownIndexColumn {
                table: self.name().to_string(),
                column: missing.clone(),
            });
        }
        let inner = Arc::make_mut(&mut self.inner);
        inner.indexes.retain(|i| i.name != index.name);
        inner.indexes.push(index);
        Ok(self)
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Table name quoted for the backend.
    #[must_use]
    pub fn quoted_name(&self) -> String {
        self.inner.backend.quote_identifier(&self.inner.name)
    }

    /// Owning backend.
    #[must_use]
    pub fn backend(&self) -> &'static dyn Backend {
        self.inner.backend
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.inner.columns
    }

    /// Looks a column up by name, case-insensitively.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.inner
            .columns
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Secondary indexes.
    #[must_use]
    pub fn indexes(&self) -> &[IndexSpec] {
        &self.inner.indexes
    }

    /// Primary key columns in declaration order.
    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.inner.columns.iter().filter(|c| c.is_primary())
    }

    /// Names of the primary key columns.
    #[must_use]
    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_key().map(|c| c.name().to_string()).collect()
    }

    /// Statements creating the table and its indexes.
    #[must_use]
    pub fn create_sql(&self) -> Vec<String> {
        self.inner.backend.create_table_sql(self)
    }

    /// Returns `true` when both handles share the same specification.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn collect_tag_indexes(
    table: &str,
    columns: &[ColumnSpec],
) -> Result<Vec<IndexSpec>, DeclarationError> {
    let mut indexes: Vec<IndexSpec> = Vec::new();
    for col in columns {
        for (tag, unique) in [(tags::INDEX, false), (tags::UNIQUE_INDEX, true)] {
            let Some(value) = col.tag(tag) else {
                continue;
            };
            match parse_bool_text(value) {
                Some(true) => indexes.push(IndexSpec::auto_named(table, &[col.name()], unique)),
                Some(false) => {}
                None => {
                    for name in value.split(',').map(str::trim) {
                        if name.is_empty() {
                            return Err(DeclarationError::InvalidTag {
                                column: col.name().to_string(),
                                tag: tag.to_string(),
                                value: value.to_string(),
                            });
                        }
                        if let Some(existing) = indexes.iter_mut().find(|i| i.name == name) {
                            existing.columns.push(col.name().to_string());
                            existing.unique |= unique;
                        } else {
                            indexes.push(IndexSpec::new(name, &[col.name()], unique));
                        }
                    }
                }
            }
        }
    }
    Ok(indexes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SQLITE;

    fn table() -> TableSpec {
        let columns = vec![
            SQLITE
                .column_from_decl(&ColumnDecl::new("id", "i64").tag("auto_increment", "true"))
                .unwrap(),
            SQLITE
                .column_from_decl(
                    &ColumnDecl::new("tenant", "String").tag("index", "ix_tenant_name"),
                )
                .unwrap(),
            SQLITE
                .column_from_decl(
                    &ColumnDecl::new("name", "String")
                        .tag("index", "ix_tenant_name")
                        .tag("unique_index", "true"),
                )
                .unwrap(),
        ];
        TableSpec::new("users", &SQLITE, columns).unwrap()
    }

    #[test]
    fn index_identity_is_order_sensitive() {
        let idx = IndexSpec::new("ix", &["a", "b"], false);
        assert!(idx.is_identical(&["a", "b"]));
        assert!(idx.is_identical(&["A", "B"]));
        assert!(!idx.is_identical(&["b", "a"]));
        assert!(!idx.is_identical(&["a"]));
    }

    #[test]
    fn tag_indexes_follow_declaration_order() {
        let t = table();
        let names: Vec<_> = t.indexes().iter().map(IndexSpec::name).collect();
        assert_eq!(names, ["ix_tenant_name", "ix_users_name"]);
        assert_eq!(t.indexes()[0].columns(), ["tenant", "name"]);
        assert!(t.indexes()[1].is_unique());
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let t = table();
        assert!(t.column("NAME").is_some());
        assert!(t.column("missing").is_none());
        assert_eq!(t.primary_key_names(), ["id"]);
    }

    #[test]
    fn with_index_checks_columns() {
        let t = table().with_index(&["tenant", "id"], false).unwrap();
        assert!(t.indexes().iter().any(|i| i.name() == "ix_users_tenant_id"));
        let err = table().with_index(&["nope"], false).unwrap_err();
        assert!(matches!(err, DeclarationError::UnknownIndexColumn { .. }));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let col = SQLITE
            .column_from_decl(&ColumnDecl::new("a", "i32"))
            .unwrap();
        let err = TableSpec::new("t", &SQLITE, vec![col.clone(), col]).unwrap_err();
        assert!(matches!(err, DeclarationError::DuplicateColumn { .. }));
    }
}
