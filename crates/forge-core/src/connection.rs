//! The driver contract.
//!
//! Drivers are synchronous and blocking: every method runs to completion or
//! returns an error. Methods take `&self` so one handle can be shared by the
//! models, relations and schema operations of a single unit of work.
//!
//! # Transactions
//!
//! Transactions are explicit (`begin`/`commit`/`rollback`). Nesting is not
//! supported: a driver must return `Error::Transaction` from `begin` while a
//! transaction is already open. Use [`transaction`] to run a closure with
//! commit-on-success / rollback-on-error semantics.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;

/// A database connection.
pub trait Connection {
    /// The SQL dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Run a statement that returns rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement and return its first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Run a statement that does not return rows; yields the affected row count.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run an INSERT and return the generated key.
    ///
    /// Dialects with `RETURNING` receive SQL that already selects the key; the
    /// driver reads the first column of the first row. Others report the
    /// engine's last-insert id.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64>;

    /// Open a transaction.
    fn begin(&self) -> Result<()>;

    /// Commit the open transaction.
    fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback(&self) -> Result<()>;

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;
}

/// Run `f` inside a transaction on `conn`.
///
/// Commits when `f` succeeds. When `f` fails the transaction is rolled back and
/// the original error is returned; a failing rollback is logged, not returned.
///
/// # Example
///
/// ```ignore
/// let id = transaction(&conn, || {
///     conn.execute("UPDATE accounts SET balance = balance - ? WHERE id = ?", &[10.into(), 1.into()])?;
///     conn.insert("INSERT INTO ledger (amount) VALUES (?)", &[10.into()])
/// })?;
/// ```
pub fn transaction<C, T, F>(conn: &C, f: F) -> Result<T>
where
    C: Connection + ?Sized,
    F: FnOnce() -> Result<T>,
{
    conn.begin()?;
    match f() {
        Ok(value) => {
            conn.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.rollback() {
                tracing::warn!(error = %rollback_err, "rollback after failure also failed");
            }
            Err(err)
        }
    }
}

/// Guard against opening a second transaction.
///
/// Drivers call this from `begin`.
pub fn ensure_no_open_transaction<C: Connection + ?Sized>(conn: &C) -> Result<()> {
    if conn.in_transaction() {
        return Err(Error::Transaction(
            "nested transactions are not supported".to_string(),
        ));
    }
    Ok(())
}
