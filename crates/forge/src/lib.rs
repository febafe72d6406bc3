//! Forge: Active Record models, a fluent query builder and a schema DSL.
//!
//! This crate is the **facade** for the workspace. Applications depend on
//! `forge` and usually import [`prelude`]; the focused crates stay available
//! for driver authors and tooling.
//!
//! # Role In The Architecture
//!
//! - `forge-core`: values, rows, errors, dialects, the `Connection` trait and
//!   configuration.
//! - `forge-query`: `QueryBuilder`, `Collection`, paginators.
//! - `forge-model`: the `Model` trait, `model!`, relations, the `Db` context
//!   and the read-through cache.
//! - `forge-schema`: `Schema`, the `Anvil` blueprint, per-dialect DDL and the
//!   `Migrator`.
//! - `forge-sqlite`: the bundled SQLite driver.
//! - [`ConnectionManager`] (here): named connections from a `DatabaseConfig`.
//!
//! # Example
//!
//! ```ignore
//! use forge::prelude::*;
//!
//! forge::model! {
//!     pub struct User;
//!     |def| def.fillable(&["name", "email"]).timestamps(true)
//! }
//!
//! let manager = ConnectionManager::in_memory()?;
//! let db = manager.default_db()?;
//! Schema::new(db.writer()).create("users", |t| {
//!     t.id();
//!     t.string("name");
//!     t.string("email").unique();
//!     t.timestamps();
//! })?;
//!
//! let user = User::create(&db, [("name", "Ada"), ("email", "ada@example.com")])?;
//! let found = User::where_(&db, "email", "ada@example.com").first()?;
//! ```

pub mod manager;

pub use forge_core::{
    CacheConfig, Connection, ConnectionConfig, DatabaseConfig, Dialect, Error, FromValue,
    QueryError, ReadOverride, Result, Row, Value, transaction,
};
pub use forge_model::{
    BelongsTo, BelongsToMany, Cache, Cast, Db, DynModel, HasMany, HasManyThrough, HasOne,
    MemoryCache, Model, ModelDef, ModelQuery, ModelState, Related, Relation, SyncChanges, model,
};
pub use forge_query::{Collection, Paginator, QueryBuilder, SimplePaginator, pairs};
pub use forge_schema::{
    Anvil, Column, ColumnType, FnMigration, ForeignKey, Migration, MigrationReport,
    MigrationState, MigrationStatus, Migrator, ReferentialAction, Schema, SqlMigration,
};
pub use forge_sqlite::SqliteConnection;
pub use manager::{ConnectionManager, Connector};

/// The focused crates, for code that needs more than the re-exports.
pub mod crates {
    pub use forge_core as core;
    pub use forge_model as model;
    pub use forge_query as query;
    pub use forge_schema as schema;
    pub use forge_sqlite as sqlite;
}

/// Everything a typical application imports.
pub mod prelude {
    pub use crate::manager::ConnectionManager;
    pub use forge_core::{Connection, DatabaseConfig, Error, Result, Value};
    pub use forge_model::{Cast, Db, Model, Related, Relation};
    pub use forge_query::{Collection, QueryBuilder};
    pub use forge_schema::{Anvil, Migration, Migrator, Schema};
}
