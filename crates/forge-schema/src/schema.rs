//! The `Schema` facade.
//!
//! `Schema` borrows a connection and turns blueprint callbacks into executed
//! DDL. Every statement for a call is generated before the first one runs,
//! so a configuration or unsupported-feature error leaves the database
//! untouched.
//!
//! ```ignore
//! let schema = Schema::new(&conn);
//! schema.create("users", |t| {
//!     t.id();
//!     t.string("email").unique();
//!     t.timestamps();
//! })?;
//! schema.table("users", |t| {
//!     t.string("nickname").nullable();
//! })?;
//! assert!(schema.has_column("users", "nickname")?);
//! ```

use std::fmt;

use forge_core::{Connection, Dialect, Result, Value};

use crate::anvil::Anvil;
use crate::ddl::generator_for;
use crate::introspect;
use crate::operation::SchemaOperation;

/// Schema operations against one connection.
#[derive(Clone, Copy)]
pub struct Schema<'a> {
    conn: &'a dyn Connection,
}

impl<'a> Schema<'a> {
    pub fn new(conn: &'a dyn Connection) -> Self {
        Self { conn }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &'a dyn Connection {
        self.conn
    }

    pub fn dialect(&self) -> Dialect {
        self.conn.dialect()
    }

    // ==================== Compilation ====================

    /// Statements `create` would run.
    pub fn compile_create<F>(&self, table: &str, build: F) -> Result<Vec<String>>
    where
        F: FnOnce(&mut Anvil),
    {
        let mut anvil = Anvil::create(table);
        build(&mut anvil);
        anvil.to_sql(self.dialect())
    }

    /// Statements `table` would run.
    pub fn compile_table<F>(&self, table: &str, build: F) -> Result<Vec<String>>
    where
        F: FnOnce(&mut Anvil),
    {
        let mut anvil = Anvil::alter(table);
        build(&mut anvil);
        anvil.to_sql(self.dialect())
    }

    // ==================== DDL ====================

    /// Create `table` (if missing) from a blueprint.
    pub fn create<F>(&self, table: &str, build: F) -> Result<()>
    where
        F: FnOnce(&mut Anvil),
    {
        let statements = self.compile_create(table, build)?;
        self.run(&statements)
    }

    /// Alter `table` from a blueprint.
    pub fn table<F>(&self, table: &str, build: F) -> Result<()>
    where
        F: FnOnce(&mut Anvil),
    {
        let statements = self.compile_table(table, build)?;
        self.run(&statements)
    }

    pub fn drop(&self, table: &str) -> Result<()> {
        self.run_operation(&SchemaOperation::DropTable {
            table: table.to_string(),
            if_exists: false,
        })
    }

    pub fn drop_if_exists(&self, table: &str) -> Result<()> {
        self.run_operation(&SchemaOperation::DropTable {
            table: table.to_string(),
            if_exists: true,
        })
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.run_operation(&SchemaOperation::RenameTable {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Turn off foreign-key enforcement for this session.
    pub fn disable_foreign_keys(&self) -> Result<()> {
        self.run(&[introspect::foreign_key_checks_sql(self.dialect(), false).to_string()])
    }

    pub fn enable_foreign_keys(&self) -> Result<()> {
        self.run(&[introspect::foreign_key_checks_sql(self.dialect(), true).to_string()])
    }

    fn run_operation(&self, op: &SchemaOperation) -> Result<()> {
        let statements = generator_for(self.dialect()).generate(op)?;
        self.run(&statements)
    }

    fn run(&self, statements: &[String]) -> Result<()> {
        for sql in statements {
            tracing::debug!(sql = %sql, "schema statement");
            self.conn.execute(sql, &[])?;
        }
        Ok(())
    }

    // ==================== Introspection ====================

    pub fn has_table(&self, table: &str) -> Result<bool> {
        let (sql, bindings) = introspect::has_table_sql(self.dialect(), table);
        let count = self
            .conn
            .query_one(&sql, &bindings)?
            .and_then(|row| row.get(0).and_then(Value::as_i64))
            .unwrap_or(0);
        Ok(count > 0)
    }

    /// Column names in table order; empty when the table does not exist.
    pub fn get_column_listing(&self, table: &str) -> Result<Vec<String>> {
        let (sql, bindings) = introspect::column_listing_sql(self.dialect(), table);
        Ok(self
            .conn
            .query(&sql, &bindings)?
            .iter()
            .filter_map(|row| row.get(0).map(Value::to_key_string))
            .collect())
    }

    /// Case-insensitive column lookup.
    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        self.has_columns(table, &[column])
    }

    /// Whether every one of `columns` exists.
    pub fn has_columns(&self, table: &str, columns: &[&str]) -> Result<bool> {
        let listing: Vec<String> = self
            .get_column_listing(table)?
            .iter()
            .map(|c| c.to_lowercase())
            .collect();
        Ok(columns
            .iter()
            .all(|c| listing.contains(&c.to_lowercase())))
    }
}

impl fmt::Debug for Schema<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("dialect", &self.dialect())
            .finish()
    }
}
