//! Condition trees for WHERE and JOIN clauses.

use super::field::Field;
use super::Query;
use crate::value::SqlValue;

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CompareOp {
    /// SQL operator text.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone)]
pub enum Operand {
    /// A bound parameter.
    Value(SqlValue),
    /// Another field.
    Field(Field),
}

/// A boolean expression over fields.
///
/// Leaves are built from [`Field`] methods and combined with
/// [`Condition::and`], [`Condition::or`] and [`Condition::negate`].
#[derive(Debug, Clone)]
pub enum Condition {
    /// All children hold. Empty is always true.
    And(Vec<Condition>),
    /// Any child holds. Empty is always false.
    Or(Vec<Condition>),
    /// The child does not hold.
    Not(Box<Condition>),
    /// Comparison.
    Compare {
        /// Left operand.
        left: Field,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// Pattern match.
    Like {
        /// Matched field.
        field: Field,
        /// LIKE pattern.
        pattern: String,
        /// `NOT LIKE`
        negated: bool,
        /// The pattern uses `!` as its escape character.
        escaped: bool,
    },
    /// Regular expression match.
    Regexp {
        /// Matched field.
        field: Field,
        /// Backend regexp pattern.
        pattern: String,
    },
    /// Membership in a literal list.
    In {
        /// Tested field.
        field: Field,
        /// Candidate values.
        values: Vec<SqlValue>,
        /// `NOT IN`
        negated: bool,
    },
    /// Membership in a subquery result.
    InQuery {
        /// Tested field.
        field: Field,
        /// Single-column subquery.
        query: Box<Query>,
        /// `NOT IN`
        negated: bool,
    },
    /// Null check.
    Null {
        /// Tested field.
        field: Field,
        /// `IS NOT NULL`
        negated: bool,
    },
    /// Zero-length text check.
    Empty {
        /// Tested field.
        field: Field,
        /// Non-empty.
        negated: bool,
    },
    /// Inclusive range.
    Between {
        /// Tested field.
        field: Field,
        /// Lower bound.
        low: SqlValue,
        /// Upper bound.
        high: SqlValue,
    },
}

impl Condition {
    /// Conjunction of every condition in `conditions`.
    #[must_use]
    pub fn all(conditions: impl IntoIterator<Item = Self>) -> Self {
        Self::And(conditions.into_iter().collect())
    }

    /// Disjunction of every condition in `conditions`.
    #[must_use]
    pub fn any(conditions: impl IntoIterator<Item = Self>) -> Self {
        Self::Or(conditions.into_iter().collect())
    }

    /// `self AND other`, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut children) => {
                children.push(other);
                Self::And(children)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// `self OR other`, flattening nested disjunctions.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut children) => {
                children.push(other);
                Self::Or(children)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// `NOT (self)`
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}
