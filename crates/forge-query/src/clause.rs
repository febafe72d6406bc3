//! Clause AST accumulated by [`QueryBuilder`](crate::QueryBuilder).
//!
//! Clauses store values, never placeholders: the grammar allocates
//! placeholders and collects bindings in one pass while rendering, so the
//! placeholder count always equals the binding count.

use forge_core::Value;

use crate::builder::QueryBuilder;

/// Boolean connective joining a clause to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boolean {
    /// `AND`
    #[default]
    And,
    /// `OR`
    Or,
}

impl Boolean {
    /// SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Boolean::And => "AND",
            Boolean::Or => "OR",
        }
    }
}

/// One WHERE predicate.
#[derive(Debug, Clone)]
pub enum Where {
    /// `column op ?`
    Basic {
        column: String,
        operator: String,
        value: Value,
        boolean: Boolean,
    },
    /// `first op second`, both identifiers.
    Column {
        first: String,
        operator: String,
        second: String,
        boolean: Boolean,
    },
    /// `column [NOT] IN (?, ...)`.
    In {
        column: String,
        values: Vec<Value>,
        not: bool,
        boolean: Boolean,
    },
    /// `column [NOT] IN (SELECT ...)`.
    InSub {
        column: String,
        query: Box<QueryBuilder>,
        not: bool,
        boolean: Boolean,
    },
    /// `column [NOT] BETWEEN ? AND ?`.
    Between {
        column: String,
        low: Value,
        high: Value,
        not: bool,
        boolean: Boolean,
    },
    /// `column IS [NOT] NULL`.
    Null {
        column: String,
        not: bool,
        boolean: Boolean,
    },
    /// Raw SQL with `?` placeholders.
    Raw {
        sql: String,
        bindings: Vec<Value>,
        boolean: Boolean,
    },
    /// `[NOT] EXISTS (SELECT ...)`.
    Exists {
        query: Box<QueryBuilder>,
        not: bool,
        boolean: Boolean,
    },
    /// Parenthesized group.
    Nested {
        clauses: Vec<Where>,
        boolean: Boolean,
    },
}

impl Where {
    /// The connective of this clause.
    pub fn boolean(&self) -> Boolean {
        match self {
            Where::Basic { boolean, .. }
            | Where::Column { boolean, .. }
            | Where::In { boolean, .. }
            | Where::InSub { boolean, .. }
            | Where::Between { boolean, .. }
            | Where::Null { boolean, .. }
            | Where::Raw { boolean, .. }
            | Where::Exists { boolean, .. }
            | Where::Nested { boolean, .. } => *boolean,
        }
    }

    /// Whether the clause renders nothing at all.
    ///
    /// `NOT IN ()` is universally true and is dropped; a group whose members
    /// all drop out drops out as well.
    pub fn is_noop(&self) -> bool {
        match self {
            Where::In {
                values, not: true, ..
            } => values.is_empty(),
            Where::Nested { clauses, .. } => clauses.iter().all(Where::is_noop),
            _ => false,
        }
    }
}

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    /// SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// One `ON` condition of a join.
#[derive(Debug, Clone)]
pub enum JoinCondition {
    /// Column-to-column comparison.
    On {
        first: String,
        operator: String,
        second: String,
        boolean: Boolean,
    },
    /// Column-to-value comparison.
    Value {
        column: String,
        operator: String,
        value: Value,
        boolean: Boolean,
    },
}

/// A join, built with the `on`/`or_on`/`where_` methods.
#[derive(Debug, Clone)]
pub struct Join {
    pub(crate) kind: JoinKind,
    pub(crate) table: String,
    pub(crate) conditions: Vec<JoinCondition>,
}

impl Join {
    /// Start a join against `table`.
    pub fn new(kind: JoinKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            conditions: Vec::new(),
        }
    }

    /// `AND first op second`.
    pub fn on(mut self, first: &str, operator: &str, second: &str) -> Self {
        self.conditions.push(JoinCondition::On {
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
            boolean: Boolean::And,
        });
        self
    }

    /// `OR first op second`.
    pub fn or_on(mut self, first: &str, operator: &str, second: &str) -> Self {
        self.conditions.push(JoinCondition::On {
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
            boolean: Boolean::Or,
        });
        self
    }

    /// `AND column op ?`.
    pub fn where_(mut self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(JoinCondition::Value {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
            boolean: Boolean::And,
        });
        self
    }

    /// Joined table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Join flavor.
    pub fn kind(&self) -> JoinKind {
        self.kind
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Parse `asc`/`desc` (case-insensitive); anything else sorts ascending.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }

    /// SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// ORDER BY entry.
#[derive(Debug, Clone)]
pub enum Order {
    Column { column: String, direction: Direction },
    Raw { sql: String, bindings: Vec<Value> },
}

/// HAVING predicate.
#[derive(Debug, Clone)]
pub enum Having {
    Basic {
        column: String,
        operator: String,
        value: Value,
        boolean: Boolean,
    },
    Raw {
        sql: String,
        bindings: Vec<Value>,
        boolean: Boolean,
    },
}

/// Projected column.
#[derive(Debug, Clone)]
pub enum Selection {
    Column(String),
    Raw { sql: String, bindings: Vec<Value> },
}

/// A query combined with `UNION [ALL]`.
#[derive(Debug, Clone)]
pub struct Union {
    pub(crate) query: Box<QueryBuilder>,
    pub(crate) all: bool,
}

/// Right-hand side of an UPDATE assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `col = ?`
    Value(Value),
    /// `col = col + ?`
    Add(Value),
    /// `col = col - ?`
    Subtract(Value),
    /// `col = <raw sql>` with `?` placeholders.
    Raw(String, Vec<Value>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_in_empty_is_noop() {
        let clause = Where::In {
            column: "id".into(),
            values: vec![],
            not: true,
            boolean: Boolean::And,
        };
        assert!(clause.is_noop());

        let clause = Where::In {
            column: "id".into(),
            values: vec![],
            not: false,
            boolean: Boolean::And,
        };
        assert!(!clause.is_noop());
    }

    #[test]
    fn test_nested_of_noops_is_noop() {
        let group = Where::Nested {
            clauses: vec![Where::In {
                column: "id".into(),
                values: vec![],
                not: true,
                boolean: Boolean::And,
            }],
            boolean: Boolean::Or,
        };
        assert!(group.is_noop());
        assert_eq!(group.boolean(), Boolean::Or);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("DESC"), Direction::Desc);
        assert_eq!(Direction::parse("asc"), Direction::Asc);
        assert_eq!(Direction::parse("sideways"), Direction::Asc);
    }
}
