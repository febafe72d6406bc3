//! SQL dialects.
//!
//! A `Dialect` knows how to quote identifiers, how to spell positional
//! placeholders, and which DDL capabilities the engine has. The query grammar
//! and the DDL generators consult it instead of branching on driver strings.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{Error, Result};

static ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(.+?)\s+as\s+(\S+)\s*$").expect("alias pattern is valid")
});

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// MySQL / MariaDB.
    Mysql,
    /// PostgreSQL.
    Postgres,
    /// SQLite.
    #[default]
    Sqlite,
}

impl Dialect {
    /// Resolve a configured driver name.
    ///
    /// Accepts `mysql`, `sqlite`, `pgsql`, `postgres` and `postgresql`. Any other
    /// name is a fatal configuration error.
    pub fn from_driver(driver: &str) -> Result<Self> {
        match driver.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "pgsql" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(Error::configuration(format!(
                "unsupported database driver `{other}`"
            ))),
        }
    }

    /// Canonical driver name.
    pub const fn name(self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Postgres => "pgsql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Mysql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Quote a single identifier, escaping embedded quote characters.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Quote a possibly qualified reference such as `users.id`, `posts.*` or
    /// `name as label`.
    ///
    /// Anything containing a parenthesis is treated as a raw expression and
    /// passed through untouched.
    pub fn wrap(self, reference: &str) -> String {
        let reference = reference.trim();
        if reference == "*" || reference.contains('(') {
            return reference.to_string();
        }
        if let Some(caps) = ALIAS_RE.captures(reference) {
            let (expr, alias) = (&caps[1], &caps[2]);
            return format!("{} AS {}", self.wrap(expr), self.quote_identifier(alias));
        }
        reference
            .split('.')
            .map(|segment| {
                if segment == "*" {
                    segment.to_string()
                } else {
                    self.quote_identifier(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Render a string literal.
    pub fn quote_string(self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Whether foreign keys can be added or dropped on an existing table.
    pub const fn supports_alter_foreign_keys(self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Whether `ALTER TABLE` can change a column definition in place.
    pub const fn supports_modify_column(self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Whether `INSERT ... RETURNING` is the way to read generated keys.
    pub const fn supports_returning(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether fulltext and spatial indexes exist.
    pub const fn supports_fulltext(self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// `LIMIT` spelling used when only an offset was requested.
    pub const fn unbounded_limit(self) -> Option<&'static str> {
        match self {
            Dialect::Mysql => Some("18446744073709551615"),
            Dialect::Sqlite => Some("-1"),
            Dialect::Postgres => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
