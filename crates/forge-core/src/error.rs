//! Error types shared by every Forge crate.
//!
//! Driver failures are enriched with the SQL text and bindings that caused them
//! and propagated unchanged by the layers above. Constraint violations are not
//! translated: they surface as `Error::Query` like any other driver failure.

use std::fmt;

use crate::value::Value;

/// Result alias used throughout Forge.
pub type Result<T> = std::result::Result<T, Error>;

/// A failed prepare/execute, with the statement that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    /// Driver-provided message.
    pub message: String,
    /// The offending SQL.
    pub sql: String,
    /// Positional bindings sent with the SQL.
    pub bindings: Vec<Value>,
}

impl QueryError {
    /// Create a query error.
    pub fn new(message: impl Into<String>, sql: impl Into<String>, bindings: &[Value]) -> Self {
        Self {
            message: message.into(),
            sql: sql.into(),
            bindings: bindings.to_vec(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (SQL: {})", self.message, self.sql)?;
        if !self.bindings.is_empty() {
            let rendered: Vec<String> = self.bindings.iter().map(ToString::to_string).collect();
            write!(f, " [bindings: {}]", rendered.join(", "))?;
        }
        Ok(())
    }
}

/// The error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A driver handle could not be obtained.
    #[error("connection error: {0}")]
    Connection(String),

    /// Prepare or execute failed.
    #[error("query error: {0}")]
    Query(QueryError),

    /// `find_or_fail` / `first_or_fail` found nothing.
    #[error("no {model} record found{}", key.as_ref().map(|k| format!(" for key {k}")).unwrap_or_default())]
    NotFound {
        /// Table or model name.
        model: String,
        /// The key that was looked up, if any.
        key: Option<String>,
    },

    /// Unsupported driver, invalid blueprint action, unknown scope, ...
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A migration could not be loaded, or its `up`/`down` failed.
    #[error("migration `{migration}` failed: {message}")]
    Migration {
        /// Ledger name of the migration.
        migration: String,
        /// What went wrong.
        message: String,
    },

    /// Transaction misuse, such as nesting.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The dialect cannot express the requested operation.
    #[error("{feature} is not supported by {dialect}")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
        /// The operation that was requested.
        feature: String,
    },

    /// A value could not be converted to the requested type.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem failure (configuration or migration files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a query error carrying the statement that failed.
    pub fn query(message: impl Into<String>, sql: &str, bindings: &[Value]) -> Self {
        Self::Query(QueryError::new(message, sql, bindings))
    }

    /// Create a not-found error.
    pub fn not_found(model: impl Into<String>, key: Option<String>) -> Self {
        Self::NotFound {
            model: model.into(),
            key,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a migration error.
    pub fn migration(migration: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migration {
            migration: migration.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-feature error.
    pub fn unsupported(dialect: &'static str, feature: impl Into<String>) -> Self {
        Self::Unsupported {
            dialect,
            feature: feature.into(),
        }
    }

    /// True for `Error::NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// The SQL attached to a query error.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => Some(&q.sql),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display_includes_sql_and_bindings() {
        let err = Error::query(
            "no such table: users",
            "SELECT * FROM users WHERE id = ?",
            &[Value::Int(1)],
        );
        let msg = err.to_string();
        assert!(msg.contains("no such table: users"));
        assert!(msg.contains("SELECT * FROM users WHERE id = ?"));
        assert!(msg.contains("[bindings: 1]"));
        assert_eq!(err.sql(), Some("SELECT * FROM users WHERE id = ?"));
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("users", Some("7".to_string()));
        assert_eq!(err.to_string(), "no users record found for key 7");
        assert!(err.is_not_found());

        let err = Error::not_found("users", None);
        assert_eq!(err.to_string(), "no users record found");
    }

    #[test]
    fn test_unsupported_display() {
        let err = Error::unsupported("sqlite", "ALTER TABLE ADD CONSTRAINT");
        assert_eq!(
            err.to_string(),
            "ALTER TABLE ADD CONSTRAINT is not supported by sqlite"
        );
    }
}
