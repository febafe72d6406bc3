//! Core types and traits for Forge.
//!
//! `forge-core` is the **foundation layer** for the workspace. It defines the
//! data types and the driver contract every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: `Connection` is implemented by database drivers
//!   (`forge-sqlite` ships one) and consumed by the query, model and schema crates.
//! - **Data model**: `Value` and `Row` carry bindings in and results out.
//! - **Dialects**: `Dialect` owns identifier quoting, placeholders and the
//!   capability flags the DDL generators consult.
//! - **Errors**: one `Error` taxonomy shared by the whole workspace.
//!
//! # Who Uses This Crate
//!
//! - `forge-query` compiles clause lists to SQL for a `Dialect` and executes them
//!   through a `Connection`.
//! - `forge-model` hydrates `Row`s into Active Record models.
//! - `forge-schema` renders DDL per `Dialect` and runs migrations in transactions.
//!
//! Most applications should use the `forge` facade; reach for `forge-core` directly
//! when writing drivers.

pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod inflect;
pub mod row;
pub mod value;

pub use config::{CacheConfig, ConnectionConfig, DatabaseConfig, ReadOverride};
pub use connection::{Connection, ensure_no_open_transaction, transaction};
pub use dialect::Dialect;
pub use error::{Error, QueryError, Result};
pub use row::Row;
pub use value::{FromValue, Value};
