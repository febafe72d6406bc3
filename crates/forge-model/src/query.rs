//! Typed queries that hydrate models.
//!
//! `ModelQuery<M>` wraps a [`QueryBuilder`] scoped to `M`'s table. Clause
//! methods pass straight through; terminal methods run on the read
//! connection and hydrate `M`. Bulk writes go to the write connection and
//! drop every cached entry of the table.

use std::fmt;
use std::marker::PhantomData;

use forge_core::{Error, Result, Value};
use forge_query::{Collection, Paginator, QueryBuilder, SimplePaginator};

use crate::db::Db;
use crate::model::{self, Model, UPDATED_AT};

/// Query builder bound to a model type and a database context.
pub struct ModelQuery<M> {
    db: Db,
    builder: QueryBuilder,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for ModelQuery<M> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            builder: self.builder.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> fmt::Debug for ModelQuery<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelQuery")
            .field("table", &self.builder.table_name())
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}

impl<M: Model> ModelQuery<M> {
    /// `SELECT * FROM <table>`.
    pub fn new(db: &Db) -> Self {
        Self::from_builder(db, QueryBuilder::table(M::definition().table_name()))
    }

    /// Wrap an existing builder.
    pub fn from_builder(db: &Db, builder: QueryBuilder) -> Self {
        Self {
            db: db.clone(),
            builder,
            _model: PhantomData,
        }
    }

    /// The underlying builder.
    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Unwrap into the underlying builder.
    pub fn into_builder(self) -> QueryBuilder {
        self.builder
    }

    /// Database context.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Apply an arbitrary transformation to the builder.
    pub fn map_builder<F>(mut self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.builder = f(self.builder);
        self
    }

    /// Apply the named scope registered on `M`.
    pub fn scope(self, name: &str, args: &[Value]) -> Result<Self> {
        let scope = M::definition().scope_for(name)?;
        Ok(self.map_builder(|b| scope(b, args)))
    }

    /// SQL and bindings for the current dialect.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        self.builder.to_sql(self.db.dialect())
    }

    // ==================== Clauses ====================

    pub fn select(self, columns: &[&str]) -> Self {
        self.map_builder(|b| b.select(columns))
    }

    pub fn add_select(self, columns: &[&str]) -> Self {
        self.map_builder(|b| b.add_select(columns))
    }

    pub fn distinct(self) -> Self {
        self.map_builder(QueryBuilder::distinct)
    }

    pub fn where_(self, column: &str, value: impl Into<Value>) -> Self {
        self.map_builder(|b| b.where_(column, value))
    }

    pub fn where_op(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map_builder(|b| b.where_op(column, operator, value))
    }

    pub fn or_where(self, column: &str, value: impl Into<Value>) -> Self {
        self.map_builder(|b| b.or_where(column, value))
    }

    pub fn or_where_op(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map_builder(|b| b.or_where_op(column, operator, value))
    }

    pub fn where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.map_builder(|b| b.where_column(first, operator, second))
    }

    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.map_builder(|b| b.where_in(column, values))
    }

    pub fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.map_builder(|b| b.or_where_in(column, values))
    }

    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.map_builder(|b| b.where_not_in(column, values))
    }

    pub fn where_in_sub(self, column: &str, query: QueryBuilder) -> Self {
        self.map_builder(|b| b.where_in_sub(column, query))
    }

    pub fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.map_builder(|b| b.where_between(column, low, high))
    }

    pub fn where_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.map_builder(|b| b.where_not_between(column, low, high))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.map_builder(|b| b.where_null(column))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.map_builder(|b| b.where_not_null(column))
    }

    pub fn or_where_null(self, column: &str) -> Self {
        self.map_builder(|b| b.or_where_null(column))
    }

    pub fn where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.map_builder(|b| b.where_raw(sql, bindings))
    }

    pub fn or_where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.map_builder(|b| b.or_where_raw(sql, bindings))
    }

    pub fn where_exists(self, query: QueryBuilder) -> Self {
        self.map_builder(|b| b.where_exists(query))
    }

    pub fn where_not_exists(self, query: QueryBuilder) -> Self {
        self.map_builder(|b| b.where_not_exists(query))
    }

    pub fn where_group<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.map_builder(|b| b.where_group(f))
    }

    pub fn or_where_group<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.map_builder(|b| b.or_where_group(f))
    }

    pub fn join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.map_builder(|b| b.join(table, first, operator, second))
    }

    pub fn left_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.map_builder(|b| b.left_join(table, first, operator, second))
    }

    pub fn group_by(self, columns: &[&str]) -> Self {
        self.map_builder(|b| b.group_by(columns))
    }

    pub fn having(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map_builder(|b| b.having(column, operator, value))
    }

    pub fn order_by(self, column: &str, direction: &str) -> Self {
        self.map_builder(|b| b.order_by(column, direction))
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.map_builder(|b| b.order_by_desc(column))
    }

    /// Newest first by `created_at`.
    pub fn latest(self) -> Self {
        self.map_builder(|b| b.latest(model::CREATED_AT))
    }

    /// Oldest first by `created_at`.
    pub fn oldest(self) -> Self {
        self.map_builder(|b| b.oldest(model::CREATED_AT))
    }

    pub fn reorder(self) -> Self {
        self.map_builder(QueryBuilder::reorder)
    }

    pub fn limit(self, n: u64) -> Self {
        self.map_builder(|b| b.limit(n))
    }

    pub fn take(self, n: u64) -> Self {
        self.limit(n)
    }

    pub fn offset(self, n: u64) -> Self {
        self.map_builder(|b| b.offset(n))
    }

    pub fn skip(self, n: u64) -> Self {
        self.offset(n)
    }

    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        self.map_builder(|b| b.for_page(page, per_page))
    }

    // ==================== Reads ====================

    fn hydrate_all(&self, rows: impl IntoIterator<Item = forge_core::Row>) -> Collection<M> {
        rows.into_iter().map(|row| M::hydrate(&self.db, row)).collect()
    }

    /// Run the SELECT and hydrate every row.
    pub fn get(&self) -> Result<Collection<M>> {
        let rows = self.builder.get(self.db.reader())?;
        tracing::trace!(model = M::definition().name(), rows = rows.len(), "hydrating");
        Ok(self.hydrate_all(rows))
    }

    /// First matching model.
    pub fn first(&self) -> Result<Option<M>> {
        Ok(self
            .builder
            .first(self.db.reader())?
            .map(|row| M::hydrate(&self.db, row)))
    }

    /// First matching model or `Error::NotFound`.
    pub fn first_or_fail(&self) -> Result<M> {
        self.first()?
            .ok_or_else(|| Error::not_found(M::definition().name(), None))
    }

    /// Matching model with primary key `id`.
    pub fn find(&self, id: impl Into<Value>) -> Result<Option<M>> {
        self.clone()
            .where_(M::definition().key_name(), id)
            .first()
    }

    /// Matching model with primary key `id` or `Error::NotFound`.
    pub fn find_or_fail(&self, id: impl Into<Value>) -> Result<M> {
        let id = id.into();
        self.find(id.clone())?
            .ok_or_else(|| Error::not_found(M::definition().name(), Some(id.to_key_string())))
    }

    pub fn count(&self) -> Result<i64> {
        self.builder.count(self.db.reader())
    }

    pub fn exists(&self) -> Result<bool> {
        self.builder.exists(self.db.reader())
    }

    pub fn doesnt_exist(&self) -> Result<bool> {
        self.builder.doesnt_exist(self.db.reader())
    }

    pub fn pluck(&self, column: &str) -> Result<Vec<Value>> {
        self.builder.pluck(self.db.reader(), column)
    }

    pub fn value(&self, column: &str) -> Result<Option<Value>> {
        self.builder.value(self.db.reader(), column)
    }

    pub fn min(&self, column: &str) -> Result<Value> {
        self.builder.min(self.db.reader(), column)
    }

    pub fn max(&self, column: &str) -> Result<Value> {
        self.builder.max(self.db.reader(), column)
    }

    pub fn sum(&self, column: &str) -> Result<Value> {
        self.builder.sum(self.db.reader(), column)
    }

    pub fn avg(&self, column: &str) -> Result<Option<f64>> {
        self.builder.avg(self.db.reader(), column)
    }

    /// Page of models plus the total count.
    pub fn paginate(&self, per_page: u64, page: u64) -> Result<Paginator<M>> {
        let page = self.builder.paginate(self.db.reader(), per_page, page)?;
        Ok(page.map(|row| M::hydrate(&self.db, row)))
    }

    /// Page of models without a count.
    pub fn simple_paginate(&self, per_page: u64, page: u64) -> Result<SimplePaginator<M>> {
        let page = self
            .builder
            .simple_paginate(self.db.reader(), per_page, page)?;
        Ok(page.map(|row| M::hydrate(&self.db, row)))
    }

    /// Process matching models in pages of `size`, ordered by primary key.
    /// Stops early when `f` returns `false`.
    pub fn chunk<F>(&self, size: u64, mut f: F) -> Result<()>
    where
        F: FnMut(Collection<M>) -> Result<bool>,
    {
        let size = size.max(1);
        let ordered = self
            .clone()
            .reorder()
            .order_by(M::definition().key_name(), "asc");
        let mut page = 1;
        loop {
            let batch = ordered.clone().for_page(page, size).get()?;
            let len = batch.len() as u64;
            if len == 0 || !f(batch)? || len < size {
                return Ok(());
            }
            page += 1;
        }
    }

    // ==================== Bulk writes ====================

    /// UPDATE every matching row. Stamps `updated_at` when the model keeps
    /// timestamps and the caller did not set it.
    pub fn update<I, K, V>(&self, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut values = forge_query::pairs(values);
        if M::definition().uses_timestamps() && !values.iter().any(|(k, _)| k == UPDATED_AT) {
            values.push((
                UPDATED_AT.to_string(),
                Value::DateTime(model::fresh_timestamp()),
            ));
        }
        let affected = self.builder.update(self.db.writer(), values)?;
        model::invalidate_table::<M>(&self.db);
        Ok(affected)
    }

    /// DELETE every matching row.
    pub fn delete(&self) -> Result<u64> {
        let affected = self.builder.delete(self.db.writer())?;
        model::invalidate_table::<M>(&self.db);
        tracing::debug!(model = M::definition().name(), affected, "bulk delete");
        Ok(affected)
    }

    /// `column = column + amount` on every matching row.
    pub fn increment(&self, column: &str, amount: impl Into<Value>) -> Result<u64> {
        let affected = self
            .builder
            .increment(self.db.writer(), column, amount, self.touch_pairs())?;
        model::invalidate_table::<M>(&self.db);
        Ok(affected)
    }

    /// `column = column - amount` on every matching row.
    pub fn decrement(&self, column: &str, amount: impl Into<Value>) -> Result<u64> {
        let affected = self
            .builder
            .decrement(self.db.writer(), column, amount, self.touch_pairs())?;
        model::invalidate_table::<M>(&self.db);
        Ok(affected)
    }

    fn touch_pairs(&self) -> Vec<(String, Value)> {
        if M::definition().uses_timestamps() {
            vec![(
                UPDATED_AT.to_string(),
                Value::DateTime(model::fresh_timestamp()),
            )]
        } else {
            Vec::new()
        }
    }
}
