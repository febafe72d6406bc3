//! The explicit database context handed to models.
//!
//! A `Db` bundles the write connection, an optional read connection and an
//! optional cache. It is cheap to clone; every model instance carries one so
//! `save()` and relation access know where to go.

use std::fmt;
use std::rc::Rc;

use forge_core::{Connection, Dialect, Result};
use forge_query::QueryBuilder;

use crate::cache::Cache;

/// Connection and cache handles for one unit of work.
#[derive(Clone)]
pub struct Db {
    write: Rc<dyn Connection>,
    read: Option<Rc<dyn Connection>>,
    cache: Option<Rc<dyn Cache>>,
}

impl Db {
    /// Context over a single connection.
    pub fn new(conn: Rc<dyn Connection>) -> Self {
        Self {
            write: conn,
            read: None,
            cache: None,
        }
    }

    /// Route reads to `read`.
    pub fn with_read(mut self, read: Rc<dyn Connection>) -> Self {
        self.read = Some(read);
        self
    }

    /// Enable the read-through cache for models that opt in.
    pub fn with_cache(mut self, cache: Rc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Connection for INSERT/UPDATE/DELETE and DDL.
    pub fn writer(&self) -> &dyn Connection {
        self.write.as_ref()
    }

    /// Connection for SELECT.
    ///
    /// While the writer has a transaction open, reads stay on the writer so
    /// they observe the transaction's own changes.
    pub fn reader(&self) -> &dyn Connection {
        match &self.read {
            Some(read) if !self.write.in_transaction() => read.as_ref(),
            _ => self.write.as_ref(),
        }
    }

    /// The cache, if configured.
    pub fn cache(&self) -> Option<&dyn Cache> {
        self.cache.as_deref()
    }

    /// Dialect of the write connection.
    pub fn dialect(&self) -> Dialect {
        self.write.dialect()
    }

    /// A plain query builder for `table`.
    pub fn table(&self, table: &str) -> QueryBuilder {
        QueryBuilder::table(table)
    }

    /// Run `f` in a transaction on the writer: commit on success, roll back
    /// and return the error otherwise. Nesting is rejected.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Db) -> Result<T>,
    {
        forge_core::transaction(self.writer(), || f(self))
    }

    /// Like [`transaction`](Self::transaction), but joins a transaction that
    /// is already open instead of failing.
    pub fn atomic<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Db) -> Result<T>,
    {
        if self.write.in_transaction() {
            f(self)
        } else {
            self.transaction(f)
        }
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("dialect", &self.dialect())
            .field("read_split", &self.read.is_some())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}
