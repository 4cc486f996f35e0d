//! Query expression builder.
//!
//! Queries are trees of [`Field`]s, [`Condition`]s and [`Source`]s built
//! over bound tables ([`TableRef`]). Nothing is rendered until
//! [`Query::to_sql`] is called. Name lookups fail at construction time;
//! fields taken from a source outside the query fail in `to_sql`, before
//! any SQL text is produced.
//!
//! Rendering assigns each source an alias (`t1`, `t2`, ...) in the order
//! sources appear, outer query first, and collects bound parameters in
//! textual order.
//!
//! ```
//! use oxide_schema_core::backend::{Backend, MYSQL};
//! use oxide_schema_core::columns::ColumnDecl;
//! use oxide_schema_core::table::TableSpec;
//!
//! let spec = TableSpec::new(
//!     "users",
//!     &MYSQL,
//!     vec![
//!         MYSQL.column_from_decl(&ColumnDecl::new("id", "i64").tag("primary", "true")).unwrap(),
//!         MYSQL.column_from_decl(&ColumnDecl::new("name", "String").tag("width", "64")).unwrap(),
//!     ],
//! )
//! .unwrap();
//! let users = spec.instance();
//! let (sql, params) = users
//!     .query()
//!     .filter(users.field("name").unwrap().eq("alice"))
//!     .to_sql()
//!     .unwrap();
//! assert_eq!(
//!     sql,
//!     "SELECT `t1`.`id`, `t1`.`name` FROM `users` AS `t1` WHERE `t1`.`name` = ?"
//! );
//! assert_eq!(params.len(), 1);
//! ```

mod condition;
mod exec;
mod field;
mod render;
mod scope;
mod source;

pub use condition::{CompareOp, Condition, Operand};
pub use exec::ValueMap;
pub use field::{Field, functions};
pub use source::{Source, SourceId, SubQuery, TableRef};

use render::Renderer;
use source::Derived;

use crate::backend::Backend;
use crate::error::{Result, SchemaError};
use crate::value::{SqlValue, ToSqlValue};

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
}

impl JoinKind {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Join {
    kind: JoinKind,
    source: Source,
    on: Condition,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// A SELECT over one source plus optional joins.
#[derive(Debug, Clone)]
pub struct Query {
    backend: &'static dyn Backend,
    from: Source,
    fields: Vec<Field>,
    joins: Vec<Join>,
    filters: Vec<Condition>,
    group_by: Vec<Field>,
    order_by: Vec<(Field, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
}

impl Query {
    /// Starts a query over `from`. Without an explicit projection every
    /// field of `from` is selected.
    #[must_use]
    pub fn new(from: impl Into<Source>) -> Self {
        let from = from.into();
        Self {
            backend: from.backend(),
            from,
            fields: Vec::new(),
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// Backend the query renders for.
    #[must_use]
    pub fn backend(&self) -> &'static dyn Backend {
        self.backend
    }

    /// Replaces the projection.
    #[must_use]
    pub fn select(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields = fields.into_iter().collect();
        self
    }

    /// Appends one field to the projection.
    #[must_use]
    pub fn add_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Fields this query projects, in order.
    #[must_use]
    pub fn output_fields(&self) -> Vec<Field> {
        if self.fields.is_empty() {
            self.from.fields()
        } else {
            self.fields.clone()
        }
    }

    /// Resolves a field by name: projected fields first, then the root
    /// source, then joined sources.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] when no source in scope
    /// provides `name`.
    pub fn field(&self, name: &str) -> Result<Field> {
        if let Some(f) = self.fields.iter().find(|f| f.name() == name) {
            return Ok(f.clone());
        }
        std::iter::once(&self.from)
            .chain(self.joins.iter().map(|j| &j.source))
            .find_map(|source| source.field(name).ok())
            .ok_or_else(|| SchemaError::UnknownField {
                scope: "query".to_string(),
                field: name.to_string(),
            })
    }

    /// Adds a WHERE condition. Repeated calls are combined with AND.
    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filters.push(condition);
        self
    }

    /// Filters on `name = value`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] for an unknown field.
    pub fn equals<T: ToSqlValue>(self, name: &str, value: T) -> Result<Self> {
        let condition = self.field(name)?.eq(value);
        Ok(self.filter(condition))
    }

    /// Filters on `name LIKE pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] for an unknown field.
    pub fn like(self, name: &str, pattern: &str) -> Result<Self> {
        let condition = self.field(name)?.like(pattern);
        Ok(self.filter(condition))
    }

    /// Filters on a regular expression match.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] for an unknown field.
    pub fn regexp(self, name: &str, pattern: &str) -> Result<Self> {
        let condition = self.field(name)?.regexp(pattern);
        Ok(self.filter(condition))
    }

    /// Filters on `name IS NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] for an unknown field.
    pub fn is_null(self, name: &str) -> Result<Self> {
        let condition = self.field(name)?.is_null();
        Ok(self.filter(condition))
    }

    /// Filters on `name IS NOT NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] for an unknown field.
    pub fn is_not_null(self, name: &str) -> Result<Self> {
        let condition = self.field(name)?.is_not_null();
        Ok(self.filter(condition))
    }

    /// Filters on non-empty text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] for an unknown field.
    pub fn is_not_empty(self, name: &str) -> Result<Self> {
        let condition = self.field(name)?.is_not_empty();
        Ok(self.filter(condition))
    }

    fn push_join(mut self, kind: JoinKind, source: impl Into<Source>, on: Condition) -> Self {
        self.joins.push(Join {
            kind,
            source: source.into(),
            on,
        });
        self
    }

    /// Adds an inner join.
    #[must_use]
    pub fn join(self, source: impl Into<Source>, on: Condition) -> Self {
        self.push_join(JoinKind::Inner, source, on)
    }

    /// Adds a left outer join.
    #[must_use]
    pub fn left_join(self, source: impl Into<Source>, on: Condition) -> Self {
        self.push_join(JoinKind::Left, source, on)
    }

    /// Adds a right outer join.
    #[must_use]
    pub fn right_join(self, source: impl Into<Source>, on: Condition) -> Self {
        self.push_join(JoinKind::Right, source, on)
    }

    /// Appends a GROUP BY field.
    #[must_use]
    pub fn group_by(mut self, field: Field) -> Self {
        self.group_by.push(field);
        self
    }

    /// Appends an ascending sort key.
    #[must_use]
    pub fn asc(mut self, field: Field) -> Self {
        self.order_by.push((field, Order::Asc));
        self
    }

    /// Appends a descending sort key.
    #[must_use]
    pub fn desc(mut self, field: Field) -> Self {
        self.order_by.push((field, Order::Desc));
        self
    }

    /// Sets LIMIT.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets OFFSET.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Selects distinct rows only.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    const fn has_tail(&self) -> bool {
        !self.order_by.is_empty() || self.limit.is_some() || self.offset.is_some()
    }

    /// Wraps the query as a derived table.
    #[must_use]
    pub fn sub_query(&self) -> SubQuery {
        SubQuery::new(Derived::Select(self.clone()))
    }

    /// `SELECT COUNT(*)` over this query, ignoring its ordering and paging.
    #[must_use]
    pub fn count_query(&self) -> Self {
        let mut inner = self.clone();
        inner.order_by.clear();
        inner.limit = None;
        inner.offset = None;
        inner
            .sub_query()
            .query()
            .select([functions::count("count")])
    }

    /// Renders SQL text and its bound parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] when a field comes from a
    /// source that is neither selected from nor joined.
    pub fn to_sql(&self) -> Result<(String, Vec<SqlValue>)> {
        self.check_scope(&[])?;
        let mut renderer = Renderer::new(self.backend);
        let sql = renderer.query(self);
        Ok((sql, renderer.into_params()))
    }
}

/// UNION or UNION ALL over queries projecting the same number of fields.
#[derive(Debug, Clone)]
pub struct Union {
    queries: Vec<Query>,
    all: bool,
}

impl Union {
    fn build(queries: impl IntoIterator<Item = Query>, all: bool) -> Result<Self> {
        let queries: Vec<Query> = queries.into_iter().collect();
        let expected = queries
            .first()
            .ok_or(SchemaError::EmptyUnion)?
            .output_fields()
            .len();
        if let Some(found) = queries
            .iter()
            .map(|q| q.output_fields().len())
            .find(|&n| n != expected)
        {
            return Err(SchemaError::UnionFieldCount { expected, found });
        }
        Ok(Self { queries, all })
    }

    /// `UNION` of `queries`, removing duplicate rows.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::EmptyUnion`] for no queries and
    /// [`SchemaError::UnionFieldCount`] when projections differ in length.
    pub fn new(queries: impl IntoIterator<Item = Query>) -> Result<Self> {
        Self::build(queries, false)
    }

    /// `UNION ALL` of `queries`.
    ///
    /// # Errors
    ///
    /// Same as [`Union::new`].
    pub fn all(queries: impl IntoIterator<Item = Query>) -> Result<Self> {
        Self::build(queries, true)
    }

    pub(crate) fn backend(&self) -> &'static dyn Backend {
        self.queries[0].backend()
    }

    /// Fields of the first member, which name the union's columns.
    #[must_use]
    pub fn output_fields(&self) -> Vec<Field> {
        self.queries[0].output_fields()
    }

    /// Wraps the union as a derived table.
    #[must_use]
    pub fn sub_query(&self) -> SubQuery {
        SubQuery::new(Derived::Union(self.clone()))
    }

    /// Starts a query selecting from the union.
    #[must_use]
    pub fn query(&self) -> Query {
        self.sub_query().query()
    }

    /// Renders SQL text and its bound parameters.
    ///
    /// # Errors
    ///
    /// See [`Query::to_sql`].
    pub fn to_sql(&self) -> Result<(String, Vec<SqlValue>)> {
        self.check_scope()?;
        let mut renderer = Renderer::new(self.backend());
        let sql = renderer.union(self);
        Ok((sql, renderer.into_params()))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::backend::{CLICKHOUSE, MYSQL};
    use crate::columns::ColumnDecl;
    use crate::connection::mock::{row, MockConnection};
    use crate::table::TableSpec;
    use crate::value::Value;

    fn users() -> TableSpec {
        let columns = vec![
            ColumnDecl::new("id", "i64").tag("primary", "true"),
            ColumnDecl::new("name", "String").tag("width", "64"),
            ColumnDecl::new("parent_id", "i64").pointer(true),
        ]
        .iter()
        .map(|d| MYSQL.column_from_decl(d).unwrap())
        .collect();
        TableSpec::new("users", &MYSQL, columns).unwrap()
    }

    fn clickhouse_test() -> TableSpec {
        let columns = vec![
            CLICKHOUSE
                .column_from_decl(&ColumnDecl::new("col0", "String"))
                .unwrap(),
            CLICKHOUSE
                .column_from_decl(&ColumnDecl::new("col1", "String"))
                .unwrap(),
        ];
        TableSpec::new("test", &CLICKHOUSE, columns).unwrap()
    }

    #[test]
    fn selects_named_fields() {
        let t = clickhouse_test().instance();
        let q = t
            .query()
            .select([t.field("col0").unwrap(), t.field("col1").unwrap()]);
        assert_eq!(q.to_sql().unwrap().0, "SELECT `t1`.`col0`, `t1`.`col1` FROM `test` AS `t1`");
    }

    #[test]
    fn regexp_uses_backend_syntax() {
        let t = clickhouse_test().instance();
        let (sql, params) = t
            .query()
            .select([t.field("col0").unwrap()])
            .regexp("col1", "^a.*")
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `t1`.`col0` FROM `test` AS `t1` WHERE match(`t1`.`col1`, ?)"
        );
        assert_eq!(params, vec![SqlValue::Text("^a.*".to_string())]);
    }

    #[test]
    fn unknown_field_is_a_scope_error() {
        let t = users().instance();
        assert!(matches!(
            t.field("missing"),
            Err(SchemaError::UnknownField { .. })
        ));
        assert!(t.query().equals("missing", 1).is_err());
    }

    #[test]
    fn self_join_gets_distinct_aliases() {
        let spec = users();
        let child = spec.instance();
        let parent = spec.instance();
        let q = child
            .query()
            .select([child.field("id").unwrap(), parent.field("name").unwrap()])
            .left_join(
                &parent,
                child
                    .field("parent_id")
                    .unwrap()
                    .eq_field(&parent.field("id").unwrap()),
            );
        assert_eq!(
            q.to_sql().unwrap().0,
            "SELECT `t1`.`id`, `t2`.`name` FROM `users` AS `t1` \
             LEFT JOIN `users` AS `t2` ON `t1`.`parent_id` = `t2`.`id`"
        );
    }

    #[test]
    fn nested_conditions_are_parenthesized() {
        let t = users().instance();
        let id = t.field("id").unwrap();
        let cond = id
            .eq(1)
            .or(id.gt(5))
            .and(t.field("name").unwrap().is_null().negate());
        let (sql, params) = t.query().select([id.clone()]).filter(cond).to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT `t1`.`id` FROM `users` AS `t1` WHERE \
             ((`t1`.`id` = ?) OR (`t1`.`id` > ?)) AND (NOT (`t1`.`name` IS NULL))"
        );
        assert_eq!(params, vec![SqlValue::Int(1), SqlValue::Int(5)]);
    }

    #[test]
    fn repeated_filters_are_anded() {
        let t = users().instance();
        let sql = t
            .query()
            .select([t.field("id").unwrap()])
            .equals("name", "a")
            .unwrap()
            .is_not_null("parent_id")
            .unwrap()
            .to_sql()
            .unwrap()
            .0;
        assert_eq!(
            sql,
            "SELECT `t1`.`id` FROM `users` AS `t1` WHERE \
             (`t1`.`name` = ?) AND (`t1`.`parent_id` IS NOT NULL)"
        );
    }

    #[test]
    fn subquery_fields_are_addressable() {
        let t = users().instance();
        let inner = t
            .query()
            .select([t.field("id").unwrap()])
            .filter(t.field("name").unwrap().eq("x"));
        let sub = inner.sub_query();
        let (sql, params) = sub
            .query()
            .filter(sub.field("id").unwrap().gt(3))
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `t1`.`id` FROM (SELECT `t2`.`id` FROM `users` AS `t2` \
             WHERE `t2`.`name` = ?) AS `t1` WHERE `t1`.`id` > ?"
        );
        assert_eq!(params, vec![SqlValue::Text("x".to_string()), SqlValue::Int(3)]);
        assert!(sub.field("name").is_err());
    }

    #[test]
    fn in_subquery() {
        let spec = users();
        let outer = spec.instance();
        let inner = spec.instance();
        let parents = inner
            .query()
            .select([inner.field("parent_id").unwrap()])
            .is_not_null("parent_id")
            .unwrap();
        let sql = outer
            .query()
            .select([outer.field("name").unwrap()])
            .filter(outer.field("id").unwrap().in_query(&parents))
            .to_sql()
            .unwrap()
            .0;
        assert_eq!(
            sql,
            "SELECT `t1`.`name` FROM `users` AS `t1` WHERE `t1`.`id` IN \
             (SELECT `t2`.`parent_id` FROM `users` AS `t2` WHERE `t2`.`parent_id` IS NOT NULL)"
        );
    }

    #[test]
    fn union_checks_field_count() {
        let t = users().instance();
        let one = t.query().select([t.field("id").unwrap()]);
        let two = t
            .query()
            .select([t.field("id").unwrap(), t.field("name").unwrap()]);
        assert!(matches!(
            Union::new([one.clone(), two]),
            Err(SchemaError::UnionFieldCount {
                expected: 1,
                found: 2
            })
        ));
        assert!(matches!(
            Union::new(Vec::new()),
            Err(SchemaError::EmptyUnion)
        ));
    }

    #[test]
    fn union_all_renders_members_in_order() {
        let spec = users();
        let a = spec.instance();
        let b = spec.instance();
        let union = Union::all([
            a.query().select([a.field("id").unwrap()]).equals("name", "a").unwrap(),
            b.query().select([b.field("id").unwrap()]).equals("name", "b").unwrap(),
        ])
        .unwrap();
        let (sql, params) = union.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT `t1`.`id` FROM `users` AS `t1` WHERE `t1`.`name` = ? UNION ALL \
             SELECT `t2`.`id` FROM `users` AS `t2` WHERE `t2`.`name` = ?"
        );
        assert_eq!(
            params,
            vec![SqlValue::Text("a".to_string()), SqlValue::Text("b".to_string())]
        );
        assert_eq!(union.query().output_fields().len(), 1);
    }

    #[test]
    fn count_query_drops_ordering_and_paging() {
        let t = users().instance();
        let q = t
            .query()
            .equals("id", 1)
            .unwrap()
            .asc(t.field("name").unwrap())
            .limit(10);
        assert_eq!(
            q.count_query().to_sql().unwrap().0,
            "SELECT COUNT(*) AS `count` FROM (SELECT `t2`.`id`, `t2`.`name`, `t2`.`parent_id` \
             FROM `users` AS `t2` WHERE `t2`.`id` = ?) AS `t1`"
        );
    }

    #[test]
    fn grouping_ordering_and_paging() {
        let t = users().instance();
        let name = t.field("name").unwrap();
        let n = functions::count("n");
        let sql = t
            .query()
            .select([name.clone(), n.clone()])
            .group_by(name)
            .desc(n)
            .limit(5)
            .offset(10)
            .to_sql()
            .unwrap()
            .0;
        assert_eq!(
            sql,
            "SELECT `t1`.`name`, COUNT(*) AS `n` FROM `users` AS `t1` \
             GROUP BY `t1`.`name` ORDER BY COUNT(*) DESC LIMIT 5 OFFSET 10"
        );
    }

    #[test]
    fn function_fields() {
        let t = users().instance();
        let id = t.field("id").unwrap();
        let fields = [
            functions::max("top", &id),
            functions::cast(&id, "CHAR", "id_text"),
            functions::group_concat(&MYSQL, "names", &t.field("name").unwrap(), ","),
            Field::function("plus", "({} + {})", vec![id.clone(), id.clone()]).unwrap(),
            id.clone().label("key"),
        ];
        let sql = t.query().select(fields).to_sql().unwrap().0;
        assert_eq!(
            sql,
            "SELECT MAX(`t1`.`id`) AS `top`, CAST(`t1`.`id` AS CHAR) AS `id_text`, \
             GROUP_CONCAT(`t1`.`name` SEPARATOR ',') AS `names`, \
             (`t1`.`id` + `t1`.`id`) AS `plus`, `t1`.`id` AS `key` FROM `users` AS `t1`"
        );
        assert!(functions::max("top", &id).column_spec().is_some());
    }

    #[test]
    fn list_and_pattern_leaves() {
        let t = users().instance();
        let name = t.field("name").unwrap();
        let (sql, params) = t
            .query()
            .select([name.clone()])
            .filter(Condition::all([
                name.in_list(Vec::<String>::new()),
                name.not_in_list(Vec::<String>::new()),
                name.starts_with("50%"),
                name.between("a", "m"),
                name.is_empty(),
            ]))
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `t1`.`name` FROM `users` AS `t1` WHERE (1 = 0) AND (1 = 1) AND \
             (`t1`.`name` LIKE ? ESCAPE '!') AND (`t1`.`name` BETWEEN ? AND ?) AND \
             (LENGTH(`t1`.`name`) = 0)"
        );
        assert_eq!(params[0], SqlValue::Text("50!%%".to_string()));
        assert_eq!(params.len(), 3);
    }

    #[tokio::test]
    async fn first_string_map_reports_not_found() {
        let conn = MockConnection::default();
        let err = users().query().first_string_map(&conn).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(conn.statements()[0].ends_with("LIMIT 1"));
    }

    #[tokio::test]
    async fn count_reads_the_count_column() {
        let conn = MockConnection::with_responses(vec![vec![row(&[("count", Some("3"))])]]);
        assert_eq!(users().query().count(&conn).await.unwrap(), 3);
        assert!(conn.statements()[0].starts_with("SELECT COUNT(*) AS `count` FROM ("));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
        parent_id: Option<i64>,
    }

    #[tokio::test]
    async fn rows_decode_through_column_metadata() {
        let rows = vec![
            row(&[("id", Some("1")), ("name", Some("root")), ("parent_id", None)]),
            row(&[("id", Some("2")), ("name", Some("leaf")), ("parent_id", Some("1"))]),
        ];
        let conn = MockConnection::with_responses(vec![rows.clone(), rows]);
        let query = users().query();

        let values = query.all_values(&conn).await.unwrap();
        assert_eq!(values[0]["id"], Value::Int(1));
        assert_eq!(values[0]["parent_id"], Value::Null);

        let users: Vec<User> = query.all(&conn).await.unwrap();
        assert_eq!(
            users[1],
            User {
                id: 2,
                name: "leaf".to_string(),
                parent_id: Some(1),
            }
        );
    }
}
