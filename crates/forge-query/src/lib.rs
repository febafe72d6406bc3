//! Fluent SQL query builder for Forge.
//!
//! `forge-query` turns a chain of clause calls into dialect-specific SQL with
//! positional bindings, and runs it through a [`forge_core::Connection`].
//!
//! # Role In The Architecture
//!
//! - **Clause AST**: [`clause`] holds the typed WHERE/JOIN/ORDER/HAVING entries.
//! - **Grammar**: [`Grammar`] renders the AST per [`forge_core::Dialect`],
//!   allocating placeholders and bindings in a single pass.
//! - **Results**: [`Collection`] for row lists, [`Paginator`] and
//!   [`SimplePaginator`] for pages.
//!
//! `forge-model` wraps a `QueryBuilder` in a typed model query; the schema
//! crate uses it for introspection and the migration ledger.

pub mod builder;
pub mod clause;
pub mod collection;
pub mod grammar;
pub mod pagination;

pub use builder::{QueryBuilder, pairs};
pub use clause::{Assignment, Boolean, Direction, Join, JoinKind, Where};
pub use collection::Collection;
pub use grammar::{Aggregate, Grammar};
pub use pagination::{Paginator, SimplePaginator};
