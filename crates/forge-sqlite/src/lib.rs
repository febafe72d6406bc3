//! SQLite driver for Forge.
//!
//! Implements [`forge_core::Connection`] on top of `rusqlite` (bundled
//! SQLite). This is the driver the `forge` facade opens for connections whose
//! `driver` is `sqlite`.
//!
//! # Example
//!
//! ```ignore
//! use forge_core::{Connection, Value};
//! use forge_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_in_memory()?;
//! conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! let id = conn.insert("INSERT INTO users (name) VALUES (?)", &[Value::from("Ada")])?;
//! ```

pub mod connection;

pub use connection::{DeclType, SqliteConnection, SqliteValue, decode, from_value_ref};
