//! Rendering of query trees into SQL text.

use std::collections::HashMap;
use std::fmt::Write;

use super::condition::{Condition, Operand};
use super::field::{bind_all, Field, FieldExpr, LIKE_ESCAPE};
use super::source::{Derived, Source, SourceId};
use super::{Order, Query, Union};
use crate::backend::Backend;
use crate::value::SqlValue;

/// Per-render state: source aliases and bound parameters.
pub(crate) struct Renderer {
    backend: &'static dyn Backend,
    aliases: HashMap<SourceId, String>,
    params: Vec<SqlValue>,
}

impl Renderer {
    pub(crate) fn new(backend: &'static dyn Backend) -> Self {
        Self {
            backend,
            aliases: HashMap::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn into_params(self) -> Vec<SqlValue> {
        self.params
    }

    fn quote(&self, name: &str) -> String {
        self.backend.quote_identifier(name)
    }

    fn alias_for(&mut self, id: SourceId) -> String {
        let next = self.aliases.len() + 1;
        self.aliases
            .entry(id)
            .or_insert_with(|| format!("t{next}"))
            .clone()
    }

    pub(crate) fn query(&mut self, query: &Query) -> String {
        // Aliases of this level are fixed before any nested query renders.
        self.alias_for(query.from.id());
        for join in &query.joins {
            self.alias_for(join.source.id());
        }

        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }
        let projection: Vec<String> = query
            .output_fields()
            .iter()
            .map(|f| self.projection(f))
            .collect();
        sql.push_str(&projection.join(", "));

        let from = self.source(&query.from);
        let _ = write!(sql, " FROM {from}");
        for join in &query.joins {
            let source = self.source(&join.source);
            let on = self.condition(&join.on);
            let _ = write!(sql, " {} {source} ON {on}", join.kind.keyword());
        }

        if !query.filters.is_empty() {
            let filter = self.conjunction(&query.filters);
            let _ = write!(sql, " WHERE {filter}");
        }
        if !query.group_by.is_empty() {
            let keys: Vec<String> = query.group_by.iter().map(|f| self.expr(f)).collect();
            let _ = write!(sql, " GROUP BY {}", keys.join(", "));
        }
        if !query.order_by.is_empty() {
            let keys: Vec<String> = query
                .order_by
                .iter()
                .map(|(f, order)| {
                    let dir = match order {
                        Order::Asc => "ASC",
                        Order::Desc => "DESC",
                    };
                    format!("{} {dir}", self.expr(f))
                })
                .collect();
            let _ = write!(sql, " ORDER BY {}", keys.join(", "));
        }
        if let Some(paging) = self.backend.limit_sql(query.limit, query.offset) {
            let _ = write!(sql, " {paging}");
        }
        sql
    }

    pub(crate) fn union(&mut self, union: &Union) -> String {
        let separator = if union.all { " UNION ALL " } else { " UNION " };
        let members: Vec<String> = union
            .queries
            .iter()
            .map(|q| {
                let sql = self.query(q);
                if q.has_tail() {
                    self.backend.paged_union_member(&sql)
                } else {
                    sql
                }
            })
            .collect();
        members.join(separator)
    }

    fn source(&mut self, source: &Source) -> String {
        let alias = self.alias_for(source.id());
        let alias = self.quote(&alias);
        match source {
            Source::Table(table) => format!("{} AS {alias}", table.spec().quoted_name()),
            Source::Sub(sub) => {
                let inner = match sub.body.as_ref() {
                    Derived::Select(q) => self.query(q),
                    Derived::Union(u) => self.union(u),
                };
                format!("({inner}) AS {alias}")
            }
        }
    }

    /// Renders a field as an expression.
    pub(crate) fn expr(&mut self, field: &Field) -> String {
        match &field.expr {
            FieldExpr::Column {
                source,
                table,
                name,
                ..
            } => {
                let qualifier = self.aliases.get(source).map_or(table.as_str(), String::as_str);
                format!("{}.{}", self.quote(qualifier), self.quote(name))
            }
            FieldExpr::Function { parts, args, .. } => {
                let mut sql = String::new();
                for (i, part) in parts.iter().enumerate() {
                    sql.push_str(part);
                    if let Some(arg) = args.get(i) {
                        let arg = self.expr(arg);
                        sql.push_str(&arg);
                    }
                }
                sql
            }
            FieldExpr::Cast {
                inner, sql_type, ..
            } => format!("CAST({} AS {sql_type})", self.expr(inner)),
        }
    }

    fn projection(&mut self, field: &Field) -> String {
        let expr = self.expr(field);
        let labelled = match &field.expr {
            FieldExpr::Column { name, .. } => field.alias().is_some_and(|a| a != name),
            FieldExpr::Function { .. } | FieldExpr::Cast { .. } => true,
        };
        if labelled {
            format!("{expr} AS {}", self.quote(field.name()))
        } else {
            expr
        }
    }

    fn conjunction(&mut self, conditions: &[Condition]) -> String {
        match conditions {
            [single] => self.condition(single),
            many => self.joined(many, " AND ", "1 = 1"),
        }
    }

    fn joined(&mut self, children: &[Condition], separator: &str, empty: &str) -> String {
        if children.is_empty() {
            return empty.to_string();
        }
        let parts: Vec<String> = children
            .iter()
            .map(|c| format!("({})", self.condition(c)))
            .collect();
        parts.join(separator)
    }

    fn bind(&mut self, value: &SqlValue) -> &'static str {
        self.params.push(value.clone());
        "?"
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::And(children) => self.joined(children, " AND ", "1 = 1"),
            Condition::Or(children) => self.joined(children, " OR ", "1 = 0"),
            Condition::Not(inner) => format!("NOT ({})", self.condition(inner)),
            Condition::Compare { left, op, right } => {
                let left = self.expr(left);
                let right = match right {
                    Operand::Value(v) => self.bind(v).to_string(),
                    Operand::Field(f) => self.expr(f),
                };
                format!("{left} {} {right}", op.as_sql())
            }
            Condition::Like {
                field,
                pattern,
                negated,
                escaped,
            } => {
                let expr = self.expr(field);
                self.params.push(SqlValue::Text(pattern.clone()));
                let keyword = if *negated { "NOT LIKE" } else { "LIKE" };
                if *escaped {
                    format!("{expr} {keyword} ? ESCAPE '{LIKE_ESCAPE}'")
                } else {
                    format!("{expr} {keyword} ?")
                }
            }
            Condition::Regexp { field, pattern } => {
                let expr = self.expr(field);
                self.params.push(SqlValue::Text(pattern.clone()));
                self.backend.regexp_sql(&expr)
            }
            Condition::In {
                field,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                let expr = self.expr(field);
                self.params.extend(values.iter().cloned());
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{expr} {keyword} ({})", bind_all(values))
            }
            Condition::InQuery {
                field,
                query,
                negated,
            } => {
                let expr = self.expr(field);
                let inner = self.query(query);
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{expr} {keyword} ({inner})")
            }
            Condition::Null { field, negated } => {
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {keyword}", self.expr(field))
            }
            Condition::Empty { field, negated } => {
                let op = if *negated { ">" } else { "=" };
                format!("LENGTH({}) {op} 0", self.expr(field))
            }
            Condition::Between { field, low, high } => {
                let expr = self.expr(field);
                self.params.push(low.clone());
                self.params.push(high.clone());
                format!("{expr} BETWEEN ? AND ?")
            }
        }
    }
}
