//! Fluent query builder.
//!
//! A `QueryBuilder` accumulates the clauses of one statement against a base
//! table. Clause methods consume and return the builder; execution methods
//! borrow it and take the connection to run on.
//!
//! # Example
//!
//! ```ignore
//! let rows = QueryBuilder::table("users")
//!     .where_("active", true)
//!     .where_in("role", ["admin", "editor"])
//!     .order_by_desc("created_at")
//!     .limit(10)
//!     .get(&conn)?;
//! ```

use forge_core::{Connection, Dialect, Error, Result, Row, Value};

use crate::clause::{
    Assignment, Boolean, Direction, Having, Join, JoinKind, Order, Selection, Union, Where,
};
use crate::collection::Collection;
use crate::grammar::{Aggregate, Grammar};
use crate::pagination::{Paginator, SimplePaginator, normalize};

/// Clause accumulator for one statement.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    pub(crate) table: String,
    pub(crate) columns: Vec<Selection>,
    pub(crate) distinct: bool,
    pub(crate) joins: Vec<Join>,
    pub(crate) wheres: Vec<Where>,
    pub(crate) groups: Vec<String>,
    pub(crate) havings: Vec<Having>,
    pub(crate) unions: Vec<Union>,
    pub(crate) orders: Vec<Order>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
}

/// Collect `(column, value)` pairs into owned form.
pub fn pairs<I, K, V>(data: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    data.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

impl QueryBuilder {
    /// Start a query against `table`. `"users as u"` aliases the table.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Replace the base table.
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// The base table.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// The WHERE clauses accumulated so far.
    pub fn wheres(&self) -> &[Where] {
        &self.wheres
    }

    /// The LIMIT, if set.
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    // ==================== SELECT ====================

    /// Replace the projected columns.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns
            .iter()
            .map(|c| Selection::Column((*c).to_string()))
            .collect();
        self
    }

    /// Add projected columns.
    pub fn add_select(mut self, columns: &[&str]) -> Self {
        self.columns
            .extend(columns.iter().map(|c| Selection::Column((*c).to_string())));
        self
    }

    /// Add a raw projection such as `count(*) as total`.
    pub fn select_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.columns.push(Selection::Raw {
            sql: sql.into(),
            bindings,
        });
        self
    }

    /// `SELECT DISTINCT`.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== WHERE ====================

    fn push_where(mut self, clause: Where) -> Self {
        self.wheres.push(clause);
        self
    }

    fn basic(self, column: &str, operator: &str, value: Value, boolean: Boolean) -> Self {
        // `= NULL` never matches; compare with IS [NOT] NULL instead.
        if value.is_null() {
            match operator.trim() {
                "=" => return self.push_where(Where::Null {
                    column: column.to_string(),
                    not: false,
                    boolean,
                }),
                "!=" | "<>" => return self.push_where(Where::Null {
                    column: column.to_string(),
                    not: true,
                    boolean,
                }),
                _ => {}
            }
        }
        self.push_where(Where::Basic {
            column: column.to_string(),
            operator: operator.to_string(),
            value,
            boolean,
        })
    }

    /// `AND column = ?`.
    pub fn where_(self, column: &str, value: impl Into<Value>) -> Self {
        self.basic(column, "=", value.into(), Boolean::And)
    }

    /// `AND column <op> ?`.
    pub fn where_op(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.basic(column, operator, value.into(), Boolean::And)
    }

    /// `OR column = ?`.
    pub fn or_where(self, column: &str, value: impl Into<Value>) -> Self {
        self.basic(column, "=", value.into(), Boolean::Or)
    }

    /// `OR column <op> ?`.
    pub fn or_where_op(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.basic(column, operator, value.into(), Boolean::Or)
    }

    /// `AND first <op> second`, comparing two columns.
    pub fn where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.push_where(Where::Column {
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
            boolean: Boolean::And,
        })
    }

    /// `OR first <op> second`.
    pub fn or_where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.push_where(Where::Column {
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
            boolean: Boolean::Or,
        })
    }

    fn in_list<I, V>(self, column: &str, values: I, not: bool, boolean: Boolean) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_where(Where::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            not,
            boolean,
        })
    }

    /// `AND column IN (...)`; an empty list matches nothing.
    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_list(column, values, false, Boolean::And)
    }

    /// `OR column IN (...)`.
    pub fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_list(column, values, false, Boolean::Or)
    }

    /// `AND column NOT IN (...)`; an empty list imposes no constraint.
    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_list(column, values, true, Boolean::And)
    }

    /// `OR column NOT IN (...)`.
    pub fn or_where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.in_list(column, values, true, Boolean::Or)
    }

    /// `AND column IN (<sub-select>)`.
    pub fn where_in_sub(self, column: &str, query: QueryBuilder) -> Self {
        self.push_where(Where::InSub {
            column: column.to_string(),
            query: Box::new(query),
            not: false,
            boolean: Boolean::And,
        })
    }

    /// `AND column NOT IN (<sub-select>)`.
    pub fn where_not_in_sub(self, column: &str, query: QueryBuilder) -> Self {
        self.push_where(Where::InSub {
            column: column.to_string(),
            query: Box::new(query),
            not: true,
            boolean: Boolean::And,
        })
    }

    fn between(self, column: &str, low: Value, high: Value, not: bool, boolean: Boolean) -> Self {
        self.push_where(Where::Between {
            column: column.to_string(),
            low,
            high,
            not,
            boolean,
        })
    }

    /// `AND column BETWEEN ? AND ?`.
    pub fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.between(column, low.into(), high.into(), false, Boolean::And)
    }

    /// `OR column BETWEEN ? AND ?`.
    pub fn or_where_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.between(column, low.into(), high.into(), false, Boolean::Or)
    }

    /// `AND column NOT BETWEEN ? AND ?`.
    pub fn where_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.between(column, low.into(), high.into(), true, Boolean::And)
    }

    /// `OR column NOT BETWEEN ? AND ?`.
    pub fn or_where_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.between(column, low.into(), high.into(), true, Boolean::Or)
    }

    fn null(self, column: &str, not: bool, boolean: Boolean) -> Self {
        self.push_where(Where::Null {
            column: column.to_string(),
            not,
            boolean,
        })
    }

    /// `AND column IS NULL`.
    pub fn where_null(self, column: &str) -> Self {
        self.null(column, false, Boolean::And)
    }

    /// `OR column IS NULL`.
    pub fn or_where_null(self, column: &str) -> Self {
        self.null(column, false, Boolean::Or)
    }

    /// `AND column IS NOT NULL`.
    pub fn where_not_null(self, column: &str) -> Self {
        self.null(column, true, Boolean::And)
    }

    /// `OR column IS NOT NULL`.
    pub fn or_where_not_null(self, column: &str) -> Self {
        self.null(column, true, Boolean::Or)
    }

    /// `AND <raw sql>`; `?` markers are bound to `bindings` in order.
    pub fn where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.push_where(Where::Raw {
            sql: sql.into(),
            bindings,
            boolean: Boolean::And,
        })
    }

    /// `OR <raw sql>`.
    pub fn or_where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.push_where(Where::Raw {
            sql: sql.into(),
            bindings,
            boolean: Boolean::Or,
        })
    }

    fn exists_clause(self, query: QueryBuilder, not: bool, boolean: Boolean) -> Self {
        self.push_where(Where::Exists {
            query: Box::new(query),
            not,
            boolean,
        })
    }

    /// `AND EXISTS (<sub-select>)`.
    pub fn where_exists(self, query: QueryBuilder) -> Self {
        self.exists_clause(query, false, Boolean::And)
    }

    /// `OR EXISTS (<sub-select>)`.
    pub fn or_where_exists(self, query: QueryBuilder) -> Self {
        self.exists_clause(query, false, Boolean::Or)
    }

    /// `AND NOT EXISTS (<sub-select>)`.
    pub fn where_not_exists(self, query: QueryBuilder) -> Self {
        self.exists_clause(query, true, Boolean::And)
    }

    /// `OR NOT EXISTS (<sub-select>)`.
    pub fn or_where_not_exists(self, query: QueryBuilder) -> Self {
        self.exists_clause(query, true, Boolean::Or)
    }

    fn group<F>(self, f: F, boolean: Boolean) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let inner = f(QueryBuilder::table(self.table.clone()));
        if inner.wheres.is_empty() {
            return self;
        }
        self.push_where(Where::Nested {
            clauses: inner.wheres,
            boolean,
        })
    }

    /// `AND (...)`, built by `f` on a fresh builder.
    ///
    /// ```ignore
    /// q.where_group(|g| g.where_("a", 1).or_where("b", 2))
    /// ```
    pub fn where_group<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.group(f, Boolean::And)
    }

    /// `OR (...)`.
    pub fn or_where_group<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.group(f, Boolean::Or)
    }

    // ==================== JOIN ====================

    /// `INNER JOIN table ON first op second`.
    pub fn join(mut self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.joins
            .push(Join::new(JoinKind::Inner, table).on(first, operator, second));
        self
    }

    /// `LEFT JOIN table ON first op second`.
    pub fn left_join(mut self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.joins
            .push(Join::new(JoinKind::Left, table).on(first, operator, second));
        self
    }

    /// `RIGHT JOIN table ON first op second`.
    pub fn right_join(mut self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.joins
            .push(Join::new(JoinKind::Right, table).on(first, operator, second));
        self
    }

    /// `CROSS JOIN table`.
    pub fn cross_join(mut self, table: &str) -> Self {
        self.joins.push(Join::new(JoinKind::Cross, table));
        self
    }

    /// Add a join with several conditions.
    pub fn join_with(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    // ==================== GROUP / HAVING ====================

    /// `GROUP BY columns`.
    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.groups
            .extend(columns.iter().map(|c| (*c).to_string()));
        self
    }

    /// `AND column op ?` in HAVING.
    pub fn having(mut self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.havings.push(Having::Basic {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
            boolean: Boolean::And,
        });
        self
    }

    /// `OR column op ?` in HAVING.
    pub fn or_having(mut self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.havings.push(Having::Basic {
            column: column.to_string(),
            operator: operator.to_string(),
            value: value.into(),
            boolean: Boolean::Or,
        });
        self
    }

    /// Raw HAVING expression.
    pub fn having_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.havings.push(Having::Raw {
            sql: sql.into(),
            bindings,
            boolean: Boolean::And,
        });
        self
    }

    // ==================== UNION ====================

    /// `UNION <query>`.
    ///
    /// Only the SELECT through HAVING part of `query` is used; ORDER BY and
    /// LIMIT of this builder apply to the combined result.
    pub fn union(mut self, query: QueryBuilder) -> Self {
        self.unions.push(Union {
            query: Box::new(query),
            all: false,
        });
        self
    }

    /// `UNION ALL <query>`.
    pub fn union_all(mut self, query: QueryBuilder) -> Self {
        self.unions.push(Union {
            query: Box::new(query),
            all: true,
        });
        self
    }

    // ==================== ORDER / LIMIT ====================

    /// `ORDER BY column <direction>`; direction is `asc` or `desc`.
    pub fn order_by(mut self, column: &str, direction: &str) -> Self {
        self.orders.push(Order::Column {
            column: column.to_string(),
            direction: Direction::parse(direction),
        });
        self
    }

    /// `ORDER BY column DESC`.
    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, "desc")
    }

    /// Raw ORDER BY expression.
    pub fn order_by_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.orders.push(Order::Raw {
            sql: sql.into(),
            bindings,
        });
        self
    }

    /// Newest first by `column`.
    pub fn latest(self, column: &str) -> Self {
        self.order_by(column, "desc")
    }

    /// Oldest first by `column`.
    pub fn oldest(self, column: &str) -> Self {
        self.order_by(column, "asc")
    }

    /// Drop every ORDER BY.
    pub fn reorder(mut self) -> Self {
        self.orders.clear();
        self
    }

    /// `LIMIT n`.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Alias for [`limit`](Self::limit).
    pub fn take(self, n: u64) -> Self {
        self.limit(n)
    }

    /// `OFFSET n`.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Alias for [`offset`](Self::offset).
    pub fn skip(self, n: u64) -> Self {
        self.offset(n)
    }

    /// LIMIT/OFFSET for a 1-based page.
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        let (per_page, page) = normalize(per_page, page);
        self.offset((page - 1) * per_page).limit(per_page)
    }

    // ==================== COMPILATION ====================

    /// Compile the SELECT for `dialect` without running it.
    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        Grammar::new(dialect).compile_select(self)
    }

    /// Compile an UPDATE of `values` for `dialect`.
    pub fn to_update_sql<I, K, V>(&self, dialect: Dialect, values: I) -> (String, Vec<Value>)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let assignments = assignments(values);
        Grammar::new(dialect).compile_update(self, &assignments)
    }

    /// Compile a DELETE for `dialect`.
    pub fn to_delete_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        Grammar::new(dialect).compile_delete(self)
    }

    // ==================== EXECUTION ====================

    /// Run the SELECT.
    pub fn get(&self, conn: &dyn Connection) -> Result<Collection<Row>> {
        let (sql, bindings) = self.to_sql(conn.dialect());
        Ok(Collection::new(conn.query(&sql, &bindings)?))
    }

    /// First row, with the limit forced to 1.
    pub fn first(&self, conn: &dyn Connection) -> Result<Option<Row>> {
        let (sql, bindings) = self.clone().limit(1).to_sql(conn.dialect());
        conn.query_one(&sql, &bindings)
    }

    /// First row or `Error::NotFound`.
    pub fn first_or_fail(&self, conn: &dyn Connection) -> Result<Row> {
        self.first(conn)?
            .ok_or_else(|| Error::not_found(self.table.clone(), None))
    }

    /// Row whose `id` column equals `id`.
    pub fn find(&self, conn: &dyn Connection, id: impl Into<Value>) -> Result<Option<Row>> {
        self.find_by_key(conn, "id", id)
    }

    /// Row whose `column` equals `key`, for tables keyed on something other
    /// than `id`.
    pub fn find_by_key(
        &self,
        conn: &dyn Connection,
        column: &str,
        key: impl Into<Value>,
    ) -> Result<Option<Row>> {
        self.clone().where_(column, key).first(conn)
    }

    /// Single column of the first row.
    pub fn value(&self, conn: &dyn Connection, column: &str) -> Result<Option<Value>> {
        let row = self.clone().select(&[column]).first(conn)?;
        Ok(row.and_then(|r| r.get(0).cloned()))
    }

    /// One column from every row.
    pub fn pluck(&self, conn: &dyn Connection, column: &str) -> Result<Vec<Value>> {
        let rows = self.clone().select(&[column]).get(conn)?;
        Ok(rows
            .into_iter()
            .map(|r| r.get(0).cloned().unwrap_or(Value::Null))
            .collect())
    }

    /// `(key, value)` pairs in row order.
    pub fn pluck_keyed(
        &self,
        conn: &dyn Connection,
        column: &str,
        key: &str,
    ) -> Result<Vec<(Value, Value)>> {
        let rows = self.clone().select(&[key, column]).get(conn)?;
        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.get(0).cloned().unwrap_or(Value::Null),
                    r.get(1).cloned().unwrap_or(Value::Null),
                )
            })
            .collect())
    }

    fn aggregate(&self, conn: &dyn Connection, function: Aggregate, column: &str) -> Result<Value> {
        let (sql, bindings) =
            Grammar::new(conn.dialect()).compile_aggregate(self, function, column);
        let row = conn.query_one(&sql, &bindings)?;
        Ok(row.and_then(|r| r.get(0).cloned()).unwrap_or(Value::Null))
    }

    /// `COUNT(*)`, ignoring ORDER BY and LIMIT.
    pub fn count(&self, conn: &dyn Connection) -> Result<i64> {
        Ok(self
            .aggregate(conn, Aggregate::Count, "*")?
            .as_i64()
            .unwrap_or(0))
    }

    /// `MIN(column)`; `Null` when no rows match.
    pub fn min(&self, conn: &dyn Connection, column: &str) -> Result<Value> {
        self.aggregate(conn, Aggregate::Min, column)
    }

    /// `MAX(column)`; `Null` when no rows match.
    pub fn max(&self, conn: &dyn Connection, column: &str) -> Result<Value> {
        self.aggregate(conn, Aggregate::Max, column)
    }

    /// `SUM(column)`; `Null` when no rows match.
    pub fn sum(&self, conn: &dyn Connection, column: &str) -> Result<Value> {
        self.aggregate(conn, Aggregate::Sum, column)
    }

    /// `AVG(column)`.
    pub fn avg(&self, conn: &dyn Connection, column: &str) -> Result<Option<f64>> {
        Ok(self.aggregate(conn, Aggregate::Avg, column)?.as_f64())
    }

    /// Whether any row matches.
    pub fn exists(&self, conn: &dyn Connection) -> Result<bool> {
        let (sql, bindings) = Grammar::new(conn.dialect()).compile_exists(self);
        let row = conn.query_one(&sql, &bindings)?;
        Ok(row
            .and_then(|r| r.get(0).and_then(Value::as_bool))
            .unwrap_or(false))
    }

    /// Whether no row matches.
    pub fn doesnt_exist(&self, conn: &dyn Connection) -> Result<bool> {
        Ok(!self.exists(conn)?)
    }

    /// Insert one row; returns the affected row count.
    pub fn insert<I, K, V>(&self, conn: &dyn Connection, row: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.insert_many(conn, [row])
    }

    /// Insert several rows in one `VALUES (...), (...)` statement.
    ///
    /// The column list comes from the first row; a later row missing one of
    /// those columns inserts `NULL` for it.
    pub fn insert_many<R, I, K, V>(&self, conn: &dyn Connection, rows: R) -> Result<u64>
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let rows: Vec<Vec<(String, Value)>> = rows.into_iter().map(pairs).collect();
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let columns: Vec<String> = first.iter().map(|(c, _)| c.clone()).collect();
        let values: Vec<Vec<Value>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| {
                        row.iter()
                            .find(|(name, _)| name == c)
                            .map_or(Value::Null, |(_, v)| v.clone())
                    })
                    .collect()
            })
            .collect();
        let (sql, bindings) =
            Grammar::new(conn.dialect()).compile_insert(&self.table, &columns, &values);
        conn.execute(&sql, &bindings)
    }

    /// Insert one row and return the generated `key`.
    pub fn insert_get_id<I, K, V>(&self, conn: &dyn Connection, row: I, key: &str) -> Result<i64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) = pairs(row).into_iter().unzip();
        let (sql, bindings) =
            Grammar::new(conn.dialect()).compile_insert_get_id(&self.table, &columns, values, key);
        conn.insert(&sql, &bindings)
    }

    /// UPDATE the matching rows; returns the affected row count.
    pub fn update<I, K, V>(&self, conn: &dyn Connection, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.update_assignments(conn, &assignments(values))
    }

    /// UPDATE with arbitrary assignments.
    pub fn update_assignments(
        &self,
        conn: &dyn Connection,
        assignments: &[(String, Assignment)],
    ) -> Result<u64> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let (sql, bindings) = Grammar::new(conn.dialect()).compile_update(self, assignments);
        conn.execute(&sql, &bindings)
    }

    /// `column = column + amount`, plus optional extra assignments.
    pub fn increment<I, K, V>(
        &self,
        conn: &dyn Connection,
        column: &str,
        amount: impl Into<Value>,
        extra: I,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut list = vec![(column.to_string(), Assignment::Add(amount.into()))];
        list.extend(assignments(extra));
        self.update_assignments(conn, &list)
    }

    /// `column = column - amount`, plus optional extra assignments.
    pub fn decrement<I, K, V>(
        &self,
        conn: &dyn Connection,
        column: &str,
        amount: impl Into<Value>,
        extra: I,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut list = vec![(column.to_string(), Assignment::Subtract(amount.into()))];
        list.extend(assignments(extra));
        self.update_assignments(conn, &list)
    }

    /// DELETE the matching rows; returns the affected row count.
    pub fn delete(&self, conn: &dyn Connection) -> Result<u64> {
        let (sql, bindings) = self.to_delete_sql(conn.dialect());
        conn.execute(&sql, &bindings)
    }

    /// COUNT plus one LIMIT/OFFSET page.
    pub fn paginate(&self, conn: &dyn Connection, per_page: u64, page: u64) -> Result<Paginator<Row>> {
        let (per_page, page) = normalize(per_page, page);
        let total = u64::try_from(self.count(conn)?).unwrap_or(0);
        let items = if total == 0 {
            Vec::new()
        } else {
            self.clone().for_page(page, per_page).get(conn)?.into_vec()
        };
        Ok(Paginator::new(items, total, per_page, page))
    }

    /// One page without a COUNT: fetches `per_page + 1` rows to detect more.
    pub fn simple_paginate(
        &self,
        conn: &dyn Connection,
        per_page: u64,
        page: u64,
    ) -> Result<SimplePaginator<Row>> {
        let (per_page, page) = normalize(per_page, page);
        let items = self
            .clone()
            .offset((page - 1) * per_page)
            .limit(per_page + 1)
            .get(conn)?
            .into_vec();
        Ok(SimplePaginator::from_overfetch(items, per_page, page))
    }
}

fn assignments<I, K, V>(values: I) -> Vec<(String, Assignment)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    values
        .into_iter()
        .map(|(k, v)| (k.into(), Assignment::Value(v.into())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn test_simple_select() {
        let (sql, bindings) = QueryBuilder::table("users").to_sql(Dialect::Sqlite);
        assert_eq!(sql, "SELECT * FROM \"users\"");
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_where_chain_first_clause_has_no_boolean() {
        let (sql, bindings) = QueryBuilder::table("users")
            .or_where("name", "a")
            .where_op("age", ">", 18)
            .or_where("role", "admin")
            .to_sql(Dialect::Mysql);
        assert_eq!(
            sql,
            "SELECT * FROM `users` WHERE `name` = ? AND `age` > ? OR `role` = ?"
        );
        assert_eq!(
            bindings,
            vec![Value::from("a"), Value::Int(18), Value::from("admin")]
        );
    }

    #[test]
    fn test_empty_in_lists() {
        let (sql, bindings) = QueryBuilder::table("users")
            .where_in("id", Vec::<i64>::new())
            .to_sql(Dialect::Sqlite);
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE 1 = 0");
        assert!(bindings.is_empty());

        let (sql, bindings) = QueryBuilder::table("users")
            .where_not_in("id", Vec::<i64>::new())
            .where_("active", true)
            .to_sql(Dialect::Sqlite);
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE \"active\" = ?");
        assert_eq!(bindings, vec![Value::Bool(true)]);

        let (sql, _) = QueryBuilder::table("users")
            .where_not_in("id", Vec::<i64>::new())
            .to_sql(Dialect::Sqlite);
        assert_eq!(sql, "SELECT * FROM \"users\"");
    }

    #[test]
    fn test_clause_order_and_binding_order() {
        let q = QueryBuilder::table("posts")
            .select(&["posts.*"])
            .join_with(
                Join::new(JoinKind::Left, "users")
                    .on("users.id", "=", "posts.user_id")
                    .where_("users.active", "=", true),
            )
            .where_between("posts.score", 1, 10)
            .where_in("posts.status", ["draft", "live"])
            .where_null("posts.deleted_at")
            .where_raw("length(posts.title) > ?", vec![Value::Int(3)])
            .group_by(&["posts.user_id"])
            .having("posts.user_id", ">", 0)
            .order_by("posts.id", "desc")
            .limit(5)
            .offset(10);
        let (sql, bindings) = q.to_sql(Dialect::Postgres);
        assert_eq!(
            sql,
            "SELECT \"posts\".* FROM \"posts\" \
             LEFT JOIN \"users\" ON \"users\".\"id\" = \"posts\".\"user_id\" AND \"users\".\"active\" = $1 \
             WHERE \"posts\".\"score\" BETWEEN $2 AND $3 AND \"posts\".\"status\" IN ($4, $5) \
             AND \"posts\".\"deleted_at\" IS NULL AND length(posts.title) > $6 \
             GROUP BY \"posts\".\"user_id\" HAVING \"posts\".\"user_id\" > $7 \
             ORDER BY \"posts\".\"id\" DESC LIMIT 5 OFFSET 10"
        );
        assert_eq!(
            bindings,
            vec![
                Value::Bool(true),
                Value::Int(1),
                Value::Int(10),
                Value::from("draft"),
                Value::from("live"),
                Value::Int(3),
                Value::Int(0),
            ]
        );

        let (sql, bindings) = q.to_sql(Dialect::Sqlite);
        assert_eq!(placeholders(&sql), bindings.len());
    }

    #[test]
    fn test_nested_groups() {
        let (sql, bindings) = QueryBuilder::table("users")
            .where_("active", true)
            .where_group(|g| g.where_("role", "admin").or_where("role", "owner"))
            .to_sql(Dialect::Sqlite);
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE \"active\" = ? AND (\"role\" = ? OR \"role\" = ?)"
        );
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn test_exists_and_in_sub_share_numbering() {
        let sub = QueryBuilder::table("posts")
            .select(&["user_id"])
            .where_("published", true);
        let (sql, bindings) = QueryBuilder::table("users")
            .where_("name", "a")
            .where_in_sub("id", sub.clone())
            .where_exists(sub.where_column("posts.user_id", "=", "users.id"))
            .to_sql(Dialect::Postgres);
        assert!(sql.contains("\"id\" IN (SELECT \"user_id\" FROM \"posts\" WHERE \"published\" = $2)"));
        assert!(sql.contains("EXISTS (SELECT \"user_id\" FROM \"posts\" WHERE \"published\" = $3 AND \"posts\".\"user_id\" = \"users\".\"id\")"));
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn test_null_comparison_becomes_is_null() {
        let (sql, bindings) = QueryBuilder::table("users")
            .where_("deleted_at", Value::Null)
            .where_op("parent_id", "!=", Value::Null)
            .to_sql(Dialect::Sqlite);
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE \"deleted_at\" IS NULL AND \"parent_id\" IS NOT NULL"
        );
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_update_bindings_set_before_where() {
        let q = QueryBuilder::table("users").where_("id", 7);
        let (sql, bindings) = q.to_update_sql(
            Dialect::Sqlite,
            [("name", Value::from("b")), ("age", Value::Int(30))],
        );
        assert_eq!(
            sql,
            "UPDATE \"users\" SET \"name\" = ?, \"age\" = ? WHERE \"id\" = ?"
        );
        assert_eq!(
            bindings,
            vec![Value::from("b"), Value::Int(30), Value::Int(7)]
        );

        let (sql, _) = q.to_update_sql(Dialect::Postgres, [("name", "c")]);
        assert_eq!(sql, "UPDATE \"users\" SET \"name\" = $1 WHERE \"id\" = $2");
    }

    #[test]
    fn test_increment_compiles_arithmetic() {
        let q = QueryBuilder::table("posts").where_("id", 1);
        let list = vec![
            ("views".to_string(), Assignment::Add(Value::Int(2))),
            ("touched".to_string(), Assignment::Value(Value::Bool(true))),
        ];
        let (sql, bindings) = Grammar::new(Dialect::Mysql).compile_update(&q, &list);
        assert_eq!(
            sql,
            "UPDATE `posts` SET `views` = `views` + ?, `touched` = ? WHERE `id` = ?"
        );
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn test_offset_without_limit() {
        let q = QueryBuilder::table("t").offset(5);
        assert_eq!(q.to_sql(Dialect::Sqlite).0, "SELECT * FROM \"t\" LIMIT -1 OFFSET 5");
        assert_eq!(q.to_sql(Dialect::Postgres).0, "SELECT * FROM \"t\" OFFSET 5");
        assert_eq!(
            q.to_sql(Dialect::Mysql).0,
            "SELECT * FROM `t` LIMIT 18446744073709551615 OFFSET 5"
        );
    }

    #[test]
    fn test_aggregate_ignores_order_and_limit() {
        let q = QueryBuilder::table("users")
            .where_("active", true)
            .order_by("name", "asc")
            .limit(3);
        let (sql, bindings) =
            Grammar::new(Dialect::Sqlite).compile_aggregate(&q, Aggregate::Count, "*");
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS aggregate FROM \"users\" WHERE \"active\" = ?"
        );
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn test_grouped_count_wraps() {
        let q = QueryBuilder::table("posts").group_by(&["user_id"]);
        let (sql, _) = Grammar::new(Dialect::Sqlite).compile_aggregate(&q, Aggregate::Count, "*");
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS aggregate FROM (SELECT \"user_id\" FROM \"posts\" GROUP BY \"user_id\") AS aggregate_table"
        );
    }

    #[test]
    fn test_aggregates_cover_unions() {
        let q = QueryBuilder::table("a")
            .select(&["a.votes"])
            .where_("x", 1)
            .union_all(QueryBuilder::table("b").select(&["votes"]).where_("y", 2))
            .order_by("votes", "desc");
        let (sql, bindings) =
            Grammar::new(Dialect::Postgres).compile_aggregate(&q, Aggregate::Sum, "a.votes");
        assert_eq!(
            sql,
            "SELECT SUM(\"votes\") AS aggregate FROM (SELECT \"a\".\"votes\" FROM \"a\" WHERE \"x\" = $1 \
             UNION ALL SELECT \"votes\" FROM \"b\" WHERE \"y\" = $2) AS aggregate_table"
        );
        assert_eq!(bindings, vec![Value::Int(1), Value::Int(2)]);

        let (sql, _) = Grammar::new(Dialect::Sqlite).compile_aggregate(&q, Aggregate::Count, "*");
        assert!(sql.starts_with("SELECT COUNT(*) AS aggregate FROM (SELECT"));
        assert!(sql.contains("UNION ALL"));
    }

    #[test]
    fn test_union_and_for_page() {
        let (sql, bindings) = QueryBuilder::table("a")
            .select(&["id"])
            .where_("x", 1)
            .union_all(QueryBuilder::table("b").select(&["id"]).where_("y", 2))
            .order_by("id", "asc")
            .for_page(3, 10)
            .to_sql(Dialect::Sqlite);
        assert_eq!(
            sql,
            "SELECT \"id\" FROM \"a\" WHERE \"x\" = ? UNION ALL SELECT \"id\" FROM \"b\" WHERE \"y\" = ? ORDER BY \"id\" ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(bindings, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_cross_join_and_alias() {
        let (sql, _) = QueryBuilder::table("users as u")
            .select(&["u.name as label"])
            .cross_join("roles")
            .to_sql(Dialect::Mysql);
        assert_eq!(
            sql,
            "SELECT `u`.`name` AS `label` FROM `users` AS `u` CROSS JOIN `roles`"
        );
    }
}
