//! Schema blueprints, per-dialect DDL and migrations for Forge.
//!
//! `forge-schema` describes tables as data and renders them for MySQL,
//! PostgreSQL or SQLite.
//!
//! # Role In The Architecture
//!
//! - **Blueprints**: [`Anvil`] collects [`Column`]s, indexes and
//!   [`ForeignKey`]s for a create or alter call and validates them before any
//!   SQL exists.
//! - **Operations**: a blueprint lowers to a list of [`SchemaOperation`]s.
//! - **DDL**: one [`DdlGenerator`] per dialect renders operations, failing
//!   with `Error::Unsupported` where the engine cannot express one.
//! - **Facade**: [`Schema`] runs the statements and answers catalog questions
//!   (`has_table`, `has_column`).
//! - **Migrations**: [`Migrator`] applies [`Migration`]s in batches and keeps
//!   a ledger table.
//!
//! ```ignore
//! let mut migrator = Migrator::new(&conn);
//! migrator.add(FnMigration::new(
//!     "2024_01_15_093000_create_users_table",
//!     |schema| schema.create("users", |t| {
//!         t.id();
//!         t.string("email").unique();
//!         t.timestamps();
//!     }),
//!     |schema| schema.drop_if_exists("users"),
//! ))?;
//! let report = migrator.migrate()?;
//! ```

pub mod anvil;
pub mod column;
pub mod ddl;
pub mod foreign_key;
pub mod introspect;
pub mod migration;
pub mod migrator;
pub mod operation;
pub mod schema;

pub use anvil::{Anvil, DEFAULT_STRING_LENGTH};
pub use column::{Column, ColumnDefault, ColumnType};
pub use ddl::{
    DdlGenerator, MySqlDdlGenerator, PostgresDdlGenerator, SqliteDdlGenerator, generator_for,
};
pub use foreign_key::{ForeignKey, ReferentialAction};
pub use migration::{FnMigration, Migration, SqlMigration};
pub use migrator::{MigrationReport, MigrationState, MigrationStatus, Migrator};
pub use operation::{Index, IndexKind, SchemaOperation, TableDefinition};
pub use schema::Schema;
