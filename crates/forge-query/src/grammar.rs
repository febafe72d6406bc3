//! SQL grammar: renders a [`QueryBuilder`] for one [`Dialect`].
//!
//! Rendering walks the clause lists in the fixed statement order
//! (SELECT, JOIN, WHERE, GROUP BY, HAVING, UNION, ORDER BY, LIMIT, OFFSET) and
//! pushes each binding at the moment its placeholder is written. Bindings
//! therefore come out in exactly the order the placeholders appear, and for
//! UPDATE the SET bindings precede the WHERE bindings.
//!
//! LIMIT and OFFSET are rendered as integer literals, never as bindings.

use forge_core::{Dialect, Value};

use crate::builder::QueryBuilder;
use crate::clause::{Assignment, Having, JoinCondition, JoinKind, Order, Selection, Where};

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Min,
    Max,
    Sum,
    Avg,
}

impl Aggregate {
    /// SQL function name.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
        }
    }
}

/// Renders statements for a dialect.
#[derive(Debug, Clone, Copy)]
pub struct Grammar {
    dialect: Dialect,
}

impl Grammar {
    /// Grammar for `dialect`.
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// The target dialect.
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Full SELECT.
    pub fn compile_select(&self, query: &QueryBuilder) -> (String, Vec<Value>) {
        let mut bindings = Vec::new();
        let sql = self.select(query, &mut bindings);
        tracing::trace!(dialect = %self.dialect, sql = %sql, bindings = bindings.len(), "Compiled select");
        (sql, bindings)
    }

    /// Aggregate over the query, ignoring ORDER BY, LIMIT and OFFSET.
    ///
    /// A COUNT over a grouped, distinct or unioned query counts the rows of the
    /// query wrapped in a derived table. Any other aggregate over a unioned
    /// query runs over the wrapped union, addressing the column unqualified.
    pub fn compile_aggregate(
        &self,
        query: &QueryBuilder,
        function: Aggregate,
        column: &str,
    ) -> (String, Vec<Value>) {
        let mut bindings = Vec::new();
        let count_wrap = function == Aggregate::Count
            && (!query.groups.is_empty()
                || !query.unions.is_empty()
                || (query.distinct && column == "*"));
        let union_wrap = !query.unions.is_empty();

        let sql = if count_wrap || union_wrap {
            // A bare `SELECT *` is not valid with GROUP BY on PostgreSQL.
            let projected;
            let source = if query.columns.is_empty() && !query.groups.is_empty() {
                let mut q = query.clone();
                q.columns = q.groups.iter().cloned().map(Selection::Column).collect();
                projected = q;
                &projected
            } else {
                query
            };
            let mut inner = self.select_core(source, &mut bindings);
            self.push_unions(source, &mut inner, &mut bindings);
            let target = if count_wrap {
                "*".to_string()
            } else {
                let unqualified = column.rsplit('.').next().unwrap_or(column);
                self.aggregate_target(unqualified, false)
            };
            format!(
                "SELECT {}({target}) AS aggregate FROM ({inner}) AS aggregate_table",
                function.as_sql()
            )
        } else {
            let target = self.aggregate_target(column, query.distinct);
            let mut sql = format!(
                "SELECT {}({target}) AS aggregate FROM {}",
                function.as_sql(),
                self.dialect.wrap(&query.table)
            );
            self.push_tail(query, &mut sql, &mut bindings);
            sql
        };
        tracing::trace!(dialect = %self.dialect, sql = %sql, "Compiled aggregate");
        (sql, bindings)
    }

    fn aggregate_target(&self, column: &str, distinct: bool) -> String {
        if column == "*" {
            "*".to_string()
        } else if distinct {
            format!("DISTINCT {}", self.dialect.wrap(column))
        } else {
            self.dialect.wrap(column)
        }
    }

    /// `SELECT EXISTS(<select>) AS "exists"`.
    pub fn compile_exists(&self, query: &QueryBuilder) -> (String, Vec<Value>) {
        let mut bindings = Vec::new();
        let inner = self.select(query, &mut bindings);
        let sql = format!(
            "SELECT EXISTS({inner}) AS {}",
            self.dialect.quote_identifier("exists")
        );
        (sql, bindings)
    }

    /// Single or multi-row INSERT.
    ///
    /// `columns` come from the first row; every row supplies one value per
    /// column in the same order.
    pub fn compile_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> (String, Vec<Value>) {
        let table = self.dialect.wrap(table);
        if columns.is_empty() {
            let sql = match self.dialect {
                Dialect::Mysql => format!("INSERT INTO {table} () VALUES ()"),
                Dialect::Postgres | Dialect::Sqlite => format!("INSERT INTO {table} DEFAULT VALUES"),
            };
            return (sql, Vec::new());
        }

        let mut bindings = Vec::with_capacity(columns.len() * rows.len());
        let column_list = self.columnize(columns);
        let groups: Vec<String> = rows
            .iter()
            .map(|row| {
                let placeholders: Vec<String> = row
                    .iter()
                    .map(|value| self.param(value.clone(), &mut bindings))
                    .collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();
        let sql = format!(
            "INSERT INTO {table} ({column_list}) VALUES {}",
            groups.join(", ")
        );
        tracing::trace!(dialect = %self.dialect, sql = %sql, rows = rows.len(), "Compiled insert");
        (sql, bindings)
    }

    /// Single-row INSERT that yields the generated key.
    ///
    /// PostgreSQL gets a `RETURNING` clause; the other dialects rely on the
    /// driver's last-insert id.
    pub fn compile_insert_get_id(
        &self,
        table: &str,
        columns: &[String],
        values: Vec<Value>,
        key: &str,
    ) -> (String, Vec<Value>) {
        let (mut sql, bindings) = self.compile_insert(table, columns, &[values]);
        if self.dialect.supports_returning() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.dialect.wrap(key));
        }
        (sql, bindings)
    }

    /// UPDATE with SET bindings first, then WHERE bindings.
    ///
    /// Joins, orders and limits of the query do not apply to UPDATE.
    pub fn compile_update(
        &self,
        query: &QueryBuilder,
        assignments: &[(String, Assignment)],
    ) -> (String, Vec<Value>) {
        let mut bindings = Vec::new();
        let sets: Vec<String> = assignments
            .iter()
            .map(|(column, assignment)| {
                let wrapped = self.dialect.wrap(column);
                let rhs = match assignment {
                    Assignment::Value(v) => self.param(v.clone(), &mut bindings),
                    Assignment::Add(v) => {
                        format!("{wrapped} + {}", self.param(v.clone(), &mut bindings))
                    }
                    Assignment::Subtract(v) => {
                        format!("{wrapped} - {}", self.param(v.clone(), &mut bindings))
                    }
                    Assignment::Raw(sql, values) => self.raw(sql, values, &mut bindings),
                };
                format!("{wrapped} = {rhs}")
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.wrap(&query.table),
            sets.join(", ")
        );
        let wheres = self.wheres(&query.wheres, &mut bindings);
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres);
        }
        tracing::trace!(dialect = %self.dialect, sql = %sql, bindings = bindings.len(), "Compiled update");
        (sql, bindings)
    }

    /// DELETE constrained by the WHERE clauses.
    pub fn compile_delete(&self, query: &QueryBuilder) -> (String, Vec<Value>) {
        let mut bindings = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.dialect.wrap(&query.table));
        let wheres = self.wheres(&query.wheres, &mut bindings);
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres);
        }
        tracing::trace!(dialect = %self.dialect, sql = %sql, "Compiled delete");
        (sql, bindings)
    }

    fn select(&self, query: &QueryBuilder, bindings: &mut Vec<Value>) -> String {
        let mut sql = self.select_core(query, bindings);
        self.push_unions(query, &mut sql, bindings);

        if !query.orders.is_empty() {
            let orders: Vec<String> = query
                .orders
                .iter()
                .map(|order| match order {
                    Order::Column { column, direction } => {
                        format!("{} {}", self.dialect.wrap(column), direction.as_sql())
                    }
                    Order::Raw { sql, bindings: values } => self.raw(sql, values, bindings),
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        match (query.limit, query.offset) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {limit}"));
                if let Some(offset) = offset {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
            (None, Some(offset)) => {
                if let Some(unbounded) = self.dialect.unbounded_limit() {
                    sql.push_str(&format!(" LIMIT {unbounded}"));
                }
                sql.push_str(&format!(" OFFSET {offset}"));
            }
            (None, None) => {}
        }
        sql
    }

    /// SELECT through HAVING.
    fn select_core(&self, query: &QueryBuilder, bindings: &mut Vec<Value>) -> String {
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query
                .columns
                .iter()
                .map(|selection| match selection {
                    Selection::Column(column) => self.dialect.wrap(column),
                    Selection::Raw { sql, bindings: values } => self.raw(sql, values, bindings),
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        let distinct = if query.distinct { "DISTINCT " } else { "" };
        let mut sql = format!(
            "SELECT {distinct}{columns} FROM {}",
            self.dialect.wrap(&query.table)
        );
        self.push_tail(query, &mut sql, bindings);
        sql
    }

    /// JOIN, WHERE, GROUP BY and HAVING.
    fn push_tail(&self, query: &QueryBuilder, sql: &mut String, bindings: &mut Vec<Value>) {
        for join in &query.joins {
            sql.push(' ');
            sql.push_str(join.kind.as_sql());
            sql.push(' ');
            sql.push_str(&self.dialect.wrap(&join.table));
            if join.kind == JoinKind::Cross || join.conditions.is_empty() {
                continue;
            }
            sql.push_str(" ON ");
            for (i, condition) in join.conditions.iter().enumerate() {
                let (rendered, boolean) = match condition {
                    JoinCondition::On {
                        first,
                        operator,
                        second,
                        boolean,
                    } => (
                        format!(
                            "{} {} {}",
                            self.dialect.wrap(first),
                            operator_sql(operator),
                            self.dialect.wrap(second)
                        ),
                        *boolean,
                    ),
                    JoinCondition::Value {
                        column,
                        operator,
                        value,
                        boolean,
                    } => (
                        format!(
                            "{} {} {}",
                            self.dialect.wrap(column),
                            operator_sql(operator),
                            self.param(value.clone(), bindings)
                        ),
                        *boolean,
                    ),
                };
                if i > 0 {
                    sql.push(' ');
                    sql.push_str(boolean.as_sql());
                    sql.push(' ');
                }
                sql.push_str(&rendered);
            }
        }

        let wheres = self.wheres(&query.wheres, bindings);
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres);
        }

        if !query.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.columnize(&query.groups));
        }

        if !query.havings.is_empty() {
            let mut parts = String::new();
            for (i, having) in query.havings.iter().enumerate() {
                let (rendered, boolean) = match having {
                    Having::Basic {
                        column,
                        operator,
                        value,
                        boolean,
                    } => (
                        format!(
                            "{} {} {}",
                            self.dialect.wrap(column),
                            operator_sql(operator),
                            self.param(value.clone(), bindings)
                        ),
                        *boolean,
                    ),
                    Having::Raw {
                        sql,
                        bindings: values,
                        boolean,
                    } => (self.raw(sql, values, bindings), *boolean),
                };
                if i > 0 {
                    parts.push(' ');
                    parts.push_str(boolean.as_sql());
                    parts.push(' ');
                }
                parts.push_str(&rendered);
            }
            sql.push_str(" HAVING ");
            sql.push_str(&parts);
        }
    }

    fn push_unions(&self, query: &QueryBuilder, sql: &mut String, bindings: &mut Vec<Value>) {
        for union in &query.unions {
            sql.push_str(if union.all { " UNION ALL " } else { " UNION " });
            let part = self.select_core(&union.query, bindings);
            sql.push_str(&part);
        }
    }

    /// Render a WHERE list without the keyword. Empty when every clause is a
    /// no-op; the first rendered clause never carries a connective.
    fn wheres(&self, clauses: &[Where], bindings: &mut Vec<Value>) -> String {
        let mut out = String::new();
        for clause in clauses.iter().filter(|c| !c.is_noop()) {
            let rendered = self.where_clause(clause, bindings);
            if !out.is_empty() {
                out.push(' ');
                out.push_str(clause.boolean().as_sql());
                out.push(' ');
            }
            out.push_str(&rendered);
        }
        out
    }

    fn where_clause(&self, clause: &Where, bindings: &mut Vec<Value>) -> String {
        let d = self.dialect;
        match clause {
            Where::Basic {
                column,
                operator,
                value,
                ..
            } => format!(
                "{} {} {}",
                d.wrap(column),
                operator_sql(operator),
                self.param(value.clone(), bindings)
            ),
            Where::Column {
                first,
                operator,
                second,
                ..
            } => format!("{} {} {}", d.wrap(first), operator_sql(operator), d.wrap(second)),
            Where::In {
                column,
                values,
                not,
                ..
            } => {
                if values.is_empty() {
                    // NOT IN () never reaches here.
                    return "1 = 0".to_string();
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| self.param(v.clone(), bindings))
                    .collect();
                format!(
                    "{} {}IN ({})",
                    d.wrap(column),
                    if *not { "NOT " } else { "" },
                    placeholders.join(", ")
                )
            }
            Where::InSub {
                column, query, not, ..
            } => {
                let sub = self.select(query, bindings);
                format!(
                    "{} {}IN ({sub})",
                    d.wrap(column),
                    if *not { "NOT " } else { "" }
                )
            }
            Where::Between {
                column,
                low,
                high,
                not,
                ..
            } => {
                let low = self.param(low.clone(), bindings);
                let high = self.param(high.clone(), bindings);
                format!(
                    "{} {}BETWEEN {low} AND {high}",
                    d.wrap(column),
                    if *not { "NOT " } else { "" }
                )
            }
            Where::Null { column, not, .. } => format!(
                "{} IS {}NULL",
                d.wrap(column),
                if *not { "NOT " } else { "" }
            ),
            Where::Raw {
                sql,
                bindings: values,
                ..
            } => self.raw(sql, values, bindings),
            Where::Exists { query, not, .. } => {
                let sub = self.select(query, bindings);
                format!("{}EXISTS ({sub})", if *not { "NOT " } else { "" })
            }
            Where::Nested { clauses, .. } => format!("({})", self.wheres(clauses, bindings)),
        }
    }

    fn columnize(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.dialect.wrap(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Push `value` and return its placeholder.
    fn param(&self, value: Value, bindings: &mut Vec<Value>) -> String {
        bindings.push(value);
        self.dialect.placeholder(bindings.len())
    }

    /// Rewrite `?` markers outside string literals to dialect placeholders,
    /// pushing one binding per marker.
    fn raw(&self, sql: &str, values: &[Value], bindings: &mut Vec<Value>) -> String {
        let mut out = String::with_capacity(sql.len());
        let mut remaining = values.iter();
        let mut in_string = false;
        for ch in sql.chars() {
            match ch {
                '\'' => {
                    in_string = !in_string;
                    out.push(ch);
                }
                '?' if !in_string => match remaining.next() {
                    Some(value) => out.push_str(&self.param(value.clone(), bindings)),
                    None => out.push(ch),
                },
                _ => out.push(ch),
            }
        }
        // Surplus values still travel so the driver reports the mismatch.
        bindings.extend(remaining.cloned());
        out
    }
}

fn operator_sql(operator: &str) -> String {
    operator.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_rewrites_placeholders_for_postgres() {
        let grammar = Grammar::new(Dialect::Postgres);
        let mut bindings = vec![Value::Int(9)];
        let sql = grammar.raw(
            "a = ? AND b = '?' AND c = ?",
            &[Value::Int(1), Value::Int(2)],
            &mut bindings,
        );
        assert_eq!(sql, "a = $2 AND b = '?' AND c = $3");
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn test_insert_without_columns() {
        let (sql, bindings) = Grammar::new(Dialect::Sqlite).compile_insert("t", &[], &[vec![]]);
        assert_eq!(sql, "INSERT INTO \"t\" DEFAULT VALUES");
        assert!(bindings.is_empty());
        let (sql, _) = Grammar::new(Dialect::Mysql).compile_insert("t", &[], &[vec![]]);
        assert_eq!(sql, "INSERT INTO `t` () VALUES ()");
    }

    #[test]
    fn test_insert_get_id_returning_on_postgres_only() {
        let cols = vec!["name".to_string()];
        let (sql, _) =
            Grammar::new(Dialect::Postgres).compile_insert_get_id("users", &cols, vec!["a".into()], "id");
        assert_eq!(sql, "INSERT INTO \"users\" (\"name\") VALUES ($1) RETURNING \"id\"");
        let (sql, _) =
            Grammar::new(Dialect::Sqlite).compile_insert_get_id("users", &cols, vec!["a".into()], "id");
        assert_eq!(sql, "INSERT INTO \"users\" (\"name\") VALUES (?)");
    }

    #[test]
    fn test_operator_normalization() {
        assert_eq!(operator_sql(" like "), "LIKE");
        assert_eq!(operator_sql(">="), ">=");
    }
}
