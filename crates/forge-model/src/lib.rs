//! Active Record models for Forge.
//!
//! `forge-model` maps one struct to one table. A model keeps its attributes,
//! a snapshot of what was last persisted, and the [`Db`] context it was
//! loaded through, so instance methods (`save`, `delete`, relation access)
//! need no extra arguments.
//!
//! # Role In The Architecture
//!
//! - **Definition**: [`ModelDef`] holds the per-type registry (table, keys,
//!   mass-assignment rules, casts, accessors, mutators, scopes, relations).
//! - **Instances**: [`Model`] provides finders, persistence, dirty tracking
//!   and JSON output on top of [`ModelState`].
//! - **Queries**: [`ModelQuery`] wraps a `QueryBuilder` and hydrates models.
//! - **Relations**: [`relations`] builds pre-constrained queries for
//!   has-one/has-many/belongs-to/many-to-many/has-many-through.
//! - **Cache**: [`Cache`] and [`MemoryCache`] back the optional read-through
//!   cache for `all()` and `find()`.

pub mod cache;
pub mod db;
pub mod definition;
pub mod model;
pub mod query;
pub mod related;
pub mod relations;

pub use cache::{Cache, MemoryCache};
pub use db::Db;
pub use definition::{Accessor, Cast, ModelDef, Mutator, RelationResolver, Scope};
pub use model::{CREATED_AT, IntoAttributes, Model, ModelState, Resolved, UPDATED_AT};
pub use query::ModelQuery;
pub use related::{DynModel, Related};
pub use relations::{
    BelongsTo, BelongsToMany, HasMany, HasManyThrough, HasOne, HasOneOrMany, Relation, SyncChanges,
};

#[cfg(test)]
mod testing;
