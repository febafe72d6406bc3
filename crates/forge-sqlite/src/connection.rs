//! SQLite connection over `rusqlite`.

use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

use forge_core::value::{DATETIME_FORMAT, parse_datetime};
use forge_core::{Connection, ConnectionConfig, Dialect, Error, Result, Row, Value};

/// Binding adapter from [`Value`] to a SQLite parameter.
///
/// Booleans are stored as `0`/`1`, date-times as `YYYY-MM-DD HH:MM:SS` text
/// and JSON as its text encoding.
#[derive(Debug)]
pub struct SqliteValue<'a>(pub &'a Value);

impl ToSql for SqliteValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::DateTime(dt) => {
                ToSqlOutput::Owned(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()))
            }
            Value::Json(json) => ToSqlOutput::Owned(SqlValue::Text(json.to_string())),
        })
    }
}

/// Declared type of a result column, as far as decoding cares.
///
/// SQLite stores by storage class, so booleans come back as integers and
/// date-times and JSON as text. The declared column type recovers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclType {
    Bool,
    DateTime,
    Json,
    Other,
}

impl DeclType {
    /// Classify a declared type such as `TINYINT(1)` or `DATETIME`.
    /// Expression columns have no declared type.
    pub fn parse(decl: Option<&str>) -> Self {
        let Some(decl) = decl else {
            return DeclType::Other;
        };
        let decl = decl.trim().to_ascii_uppercase();
        match decl.as_str() {
            "BOOLEAN" | "BOOL" | "TINYINT(1)" => DeclType::Bool,
            "JSON" | "JSONB" => DeclType::Json,
            _ if decl.starts_with("DATETIME") || decl.starts_with("TIMESTAMP") => {
                DeclType::DateTime
            }
            _ => DeclType::Other,
        }
    }
}

/// Convert a fetched column by storage class alone.
pub fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

/// Convert a fetched column, refining it by its declared type.
///
/// Stored data that does not fit the declared type keeps its storage-class
/// value.
pub fn decode(value: ValueRef<'_>, decl: DeclType) -> Value {
    let raw = from_value_ref(value);
    match (decl, raw) {
        (DeclType::Bool, Value::Int(i)) => Value::Bool(i != 0),
        (DeclType::DateTime, Value::Text(text)) => match parse_datetime(&text) {
            Some(dt) => Value::DateTime(dt),
            None => Value::Text(text),
        },
        (DeclType::Json, Value::Text(text)) => match serde_json::from_str(&text) {
            Ok(json) => Value::Json(json),
            Err(_) => Value::Text(text),
        },
        (DeclType::Json, Value::Int(i)) => Value::Json(i.into()),
        (DeclType::Json, Value::Float(f)) => serde_json::Number::from_f64(f)
            .map_or(Value::Float(f), |n| Value::Json(serde_json::Value::Number(n))),
        (_, raw) => raw,
    }
}

/// A single SQLite database handle.
///
/// Foreign-key enforcement is switched on when the connection opens.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    path: String,
    in_transaction: Cell<bool>,
}

impl SqliteConnection {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let display = path.as_ref().display().to_string();
        let conn = rusqlite::Connection::open(path.as_ref())
            .map_err(|e| Error::Connection(format!("cannot open sqlite database `{display}`: {e}")))?;
        Self::init(conn, display)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| Error::Connection(format!("cannot open in-memory sqlite database: {e}")))?;
        Self::init(conn, ":memory:".to_string())
    }

    /// Open the database named by a `sqlite` connection config.
    ///
    /// `:memory:` opens an in-memory database. The option
    /// `foreign_keys = off` leaves enforcement disabled.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        if config.dialect()? != Dialect::Sqlite {
            return Err(Error::configuration(format!(
                "driver `{}` is not sqlite",
                config.driver
            )));
        }
        let connection = if config.database == ":memory:" {
            Self::open_in_memory()?
        } else {
            Self::open(&config.database)?
        };
        let foreign_keys_off = config
            .options
            .get("foreign_keys")
            .is_some_and(|v| v.eq_ignore_ascii_case("off") || v == "0" || v == "false");
        if foreign_keys_off {
            connection.execute_batch("PRAGMA foreign_keys = OFF")?;
        }
        Ok(connection)
    }

    fn init(conn: rusqlite::Connection, path: String) -> Result<Self> {
        let connection = Self {
            conn,
            path,
            in_transaction: Cell::new(false),
        };
        connection.execute_batch("PRAGMA foreign_keys = ON")?;
        tracing::debug!(path = %connection.path, "opened sqlite connection");
        Ok(connection)
    }

    /// Database path (`:memory:` for in-memory databases).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run several `;`-separated statements without bindings.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!(sql = %sql, "sqlite batch");
        self.conn
            .execute_batch(sql)
            .map_err(|e| Error::query(e.to_string(), sql, &[]))
    }

    fn prepare(&self, sql: &str, params: &[Value]) -> Result<rusqlite::Statement<'_>> {
        self.conn
            .prepare(sql)
            .map_err(|e| Error::query(e.to_string(), sql, params))
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("in_transaction", &self.in_transaction.get())
            .finish()
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(sql = %sql, bindings = params.len(), "sqlite query");
        let mut stmt = self.prepare(sql, params)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let decl_types: Vec<DeclType> = stmt
            .columns()
            .iter()
            .map(|column| DeclType::parse(column.decl_type()))
            .collect();
        let width = columns.len();
        let bound: Vec<SqliteValue<'_>> = params.iter().map(SqliteValue).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound.iter()))
            .map_err(|e| Error::query(e.to_string(), sql, params))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| Error::query(e.to_string(), sql, params))?
        {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| Error::query(e.to_string(), sql, params))?;
                values.push(decode(value, decl_types[idx]));
            }
            out.push(Row::new(Arc::clone(&columns), values));
        }
        tracing::trace!(rows = out.len(), "sqlite query returned");
        Ok(out)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(sql = %sql, bindings = params.len(), "sqlite execute");
        let mut stmt = self.prepare(sql, params)?;
        let bound: Vec<SqliteValue<'_>> = params.iter().map(SqliteValue).collect();
        let affected = stmt
            .execute(rusqlite::params_from_iter(bound.iter()))
            .map_err(|e| Error::query(e.to_string(), sql, params))?;
        Ok(affected as u64)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.execute(sql, params)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn begin(&self) -> Result<()> {
        forge_core::ensure_no_open_transaction(self)?;
        self.execute_batch("BEGIN")?;
        self.in_transaction.set(true);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        if !self.in_transaction.get() {
            return Err(Error::Transaction("no transaction is open".to_string()));
        }
        self.execute_batch("COMMIT")?;
        self.in_transaction.set(false);
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        if !self.in_transaction.get() {
            return Err(Error::Transaction("no transaction is open".to_string()));
        }
        self.in_transaction.set(false);
        self.execute_batch("ROLLBACK")
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> SqliteConnection {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, active INTEGER, meta TEXT, born TEXT)",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_insert_and_query_round_trip() {
        let conn = setup();
        let born = chrono::NaiveDate::from_ymd_opt(1815, 12, 10)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let id = conn
            .insert(
                "INSERT INTO users (name, active, meta, born) VALUES (?, ?, ?, ?)",
                &[
                    Value::from("Ada"),
                    Value::Bool(true),
                    Value::Json(serde_json::json!({"lang": "en"})),
                    Value::DateTime(born),
                ],
            )
            .unwrap();
        assert_eq!(id, 1);

        let rows = conn
            .query("SELECT * FROM users WHERE id = ?", &[Value::Int(id)])
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.value("name"), Some(&Value::from("Ada")));
        assert_eq!(row.value("active"), Some(&Value::Int(1)));
        assert_eq!(row.value("meta"), Some(&Value::from(r#"{"lang":"en"}"#)));
        assert_eq!(row.value("born"), Some(&Value::from("1815-12-10 00:00:00")));
    }

    #[test]
    fn test_declared_types_survive_round_trip() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE flags (id INTEGER PRIMARY KEY, active TINYINT(1), seen_at DATETIME, \
             meta JSON, note TEXT)",
        )
        .unwrap();
        let seen = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let meta = serde_json::json!({"tags": ["a", "b"]});
        conn.insert(
            "INSERT INTO flags (active, seen_at, meta, note) VALUES (?, ?, ?, ?)",
            &[
                Value::Bool(true),
                Value::DateTime(seen),
                Value::Json(meta.clone()),
                Value::from("2024-03-01 12:30:00"),
            ],
        )
        .unwrap();

        let row = conn.query_one("SELECT * FROM flags", &[]).unwrap().unwrap();
        assert_eq!(row.value("active"), Some(&Value::Bool(true)));
        assert_eq!(row.value("seen_at"), Some(&Value::DateTime(seen)));
        assert_eq!(row.value("meta"), Some(&Value::Json(meta)));
        assert_eq!(row.value("note"), Some(&Value::from("2024-03-01 12:30:00")));

        let row = conn
            .query_one("SELECT active + 0 AS n FROM flags", &[])
            .unwrap()
            .unwrap();
        assert_eq!(row.value("n"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_decl_type_parse() {
        assert_eq!(DeclType::parse(Some("boolean")), DeclType::Bool);
        assert_eq!(DeclType::parse(Some("TIMESTAMP")), DeclType::DateTime);
        assert_eq!(DeclType::parse(Some("TINYINT")), DeclType::Other);
        assert_eq!(DeclType::parse(None), DeclType::Other);
        assert_eq!(
            decode(ValueRef::Text(b"not a date"), DeclType::DateTime),
            Value::from("not a date")
        );
    }

    #[test]
    fn test_query_error_carries_sql() {
        let conn = setup();
        let err = conn.query("SELECT * FROM missing", &[]).unwrap_err();
        assert_eq!(err.sql(), Some("SELECT * FROM missing"));
    }

    #[test]
    fn test_transactions() {
        let conn = setup();
        conn.begin().unwrap();
        assert!(conn.in_transaction());
        assert!(matches!(conn.begin(), Err(Error::Transaction(_))));
        conn.execute("INSERT INTO users (name) VALUES (?)", &[Value::from("x")])
            .unwrap();
        conn.rollback().unwrap();
        assert!(!conn.in_transaction());
        assert!(conn.query("SELECT * FROM users", &[]).unwrap().is_empty());

        let result: Result<()> = forge_core::transaction(&conn, || {
            conn.execute("INSERT INTO users (name) VALUES (?)", &[Value::from("y")])?;
            Err(Error::configuration("boom"))
        });
        assert!(result.is_err());
        assert!(conn.query("SELECT * FROM users", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_open_file_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sqlite");
        let config = ConnectionConfig::sqlite(path.to_string_lossy());
        let conn = SqliteConnection::from_config(&config).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert!(path.exists());

        let mysql = ConnectionConfig::new("mysql", "app");
        assert!(SqliteConnection::from_config(&mysql).is_err());
    }
}
