//! Catalog queries used by [`Schema`](crate::Schema).
//!
//! MySQL and PostgreSQL read `information_schema` for the current database /
//! schema; SQLite reads `sqlite_master` and `pragma_table_info`.

use forge_core::{Dialect, Value};

/// `SELECT COUNT(*)` over the tables named `table`.
pub fn has_table_sql(dialect: Dialect, table: &str) -> (String, Vec<Value>) {
    let sql = match dialect {
        Dialect::Mysql => {
            "SELECT COUNT(*) AS aggregate FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ? AND table_type = 'BASE TABLE'"
                .to_string()
        }
        Dialect::Postgres => {
            "SELECT COUNT(*) AS aggregate FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1 AND table_type = 'BASE TABLE'"
                .to_string()
        }
        Dialect::Sqlite => {
            "SELECT COUNT(*) AS aggregate FROM sqlite_master WHERE type = 'table' AND name = ?"
                .to_string()
        }
    };
    (sql, vec![Value::from(table)])
}

/// Column names of `table` in ordinal order, one row each, in a column
/// called `name`.
pub fn column_listing_sql(dialect: Dialect, table: &str) -> (String, Vec<Value>) {
    let sql = match dialect {
        Dialect::Mysql => {
            "SELECT column_name AS name FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
                .to_string()
        }
        Dialect::Postgres => {
            "SELECT column_name AS name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position"
                .to_string()
        }
        Dialect::Sqlite => "SELECT name FROM pragma_table_info(?) ORDER BY cid".to_string(),
    };
    (sql, vec![Value::from(table)])
}

/// Statement toggling foreign-key enforcement for the session.
pub fn foreign_key_checks_sql(dialect: Dialect, enabled: bool) -> &'static str {
    match (dialect, enabled) {
        (Dialect::Mysql, true) => "SET FOREIGN_KEY_CHECKS=1",
        (Dialect::Mysql, false) => "SET FOREIGN_KEY_CHECKS=0",
        (Dialect::Postgres, true) => "SET CONSTRAINTS ALL IMMEDIATE",
        (Dialect::Postgres, false) => "SET CONSTRAINTS ALL DEFERRED",
        (Dialect::Sqlite, true) => "PRAGMA foreign_keys = ON",
        (Dialect::Sqlite, false) => "PRAGMA foreign_keys = OFF",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_match_dialect() {
        let (sql, bindings) = has_table_sql(Dialect::Postgres, "users");
        assert!(sql.contains("$1"));
        assert_eq!(bindings, vec![Value::from("users")]);

        let (sql, _) = column_listing_sql(Dialect::Mysql, "users");
        assert!(sql.contains("table_name = ?"));
        assert!(sql.contains("ORDER BY ordinal_position"));
    }

    #[test]
    fn test_foreign_key_toggles() {
        assert_eq!(foreign_key_checks_sql(Dialect::Sqlite, false), "PRAGMA foreign_keys = OFF");
        assert_eq!(foreign_key_checks_sql(Dialect::Mysql, true), "SET FOREIGN_KEY_CHECKS=1");
    }
}
