//! Migration definitions.
//!
//! A migration is anything implementing [`Migration`]: a name that sorts by
//! creation time and an `up`/`down` pair that describes its DDL through a
//! [`Schema`]. Migrations can be written in Rust or loaded from a directory
//! of SQL files:
//!
//! ```text
//! migrations/
//!   2024_01_15_093000_create_users_table.up.sql
//!   2024_01_15_093000_create_users_table.down.sql
//! ```
//!
//! The ledger identity of a file migration is its filename without the
//! `.up.sql` suffix.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use forge_core::{Error, Result};

use crate::schema::Schema;

/// `<timestamp>_<name>.<up|down>.sql`, timestamp either `YYYY_MM_DD_HHMMSS`
/// or `YYYYMMDDHHMMSS`.
static FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:\d{4}_\d{2}_\d{2}_\d{6}|\d{14})_[A-Za-z0-9_]+)\.(up|down)\.sql$")
        .expect("migration filename pattern is valid")
});

/// A reversible schema change.
pub trait Migration {
    /// Unique, sortable ledger name.
    fn name(&self) -> &str;

    /// Apply the change.
    fn up(&self, schema: &Schema<'_>) -> Result<()>;

    /// Revert the change.
    fn down(&self, schema: &Schema<'_>) -> Result<()>;
}

/// A migration read from a pair of SQL files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    name: String,
    up: String,
    down: String,
}

impl SqlMigration {
    pub fn new(name: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: up.into(),
            down: down.into(),
        }
    }

    pub fn up_sql(&self) -> &str {
        &self.up
    }

    pub fn down_sql(&self) -> &str {
        &self.down
    }

    fn run(schema: &Schema<'_>, sql: &str) -> Result<()> {
        for statement in split_statements(sql) {
            tracing::debug!(sql = %statement, "migration statement");
            schema.connection().execute(&statement, &[])?;
        }
        Ok(())
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, schema: &Schema<'_>) -> Result<()> {
        Self::run(schema, &self.up)
    }

    fn down(&self, schema: &Schema<'_>) -> Result<()> {
        Self::run(schema, &self.down)
    }
}

/// A migration built from two closures.
pub struct FnMigration<U, D> {
    name: String,
    up: U,
    down: D,
}

impl<U, D> FnMigration<U, D>
where
    U: Fn(&Schema<'_>) -> Result<()>,
    D: Fn(&Schema<'_>) -> Result<()>,
{
    pub fn new(name: impl Into<String>, up: U, down: D) -> Self {
        Self {
            name: name.into(),
            up,
            down,
        }
    }
}

impl<U, D> Migration for FnMigration<U, D>
where
    U: Fn(&Schema<'_>) -> Result<()>,
    D: Fn(&Schema<'_>) -> Result<()>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, schema: &Schema<'_>) -> Result<()> {
        (self.up)(schema)
    }

    fn down(&self, schema: &Schema<'_>) -> Result<()> {
        (self.down)(schema)
    }
}

impl<U, D> fmt::Debug for FnMigration<U, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMigration").field("name", &self.name).finish()
    }
}

/// Load every `*.up.sql` / `*.down.sql` pair in `dir`, sorted by name.
///
/// Other files are ignored. A `.sql` file without a timestamp prefix, or an
/// `up` file without its `down` partner (or the reverse), is an
/// `Error::Migration`.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<SqlMigration>> {
    let dir = dir.as_ref();
    let mut ups: BTreeMap<String, String> = BTreeMap::new();
    let mut downs: BTreeMap<String, String> = BTreeMap::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.ends_with(".sql") {
            continue;
        }
        let Some(caps) = FILE_RE.captures(file_name) else {
            return Err(Error::migration(
                file_name,
                "file name must look like <YYYY_MM_DD_HHMMSS>_<name>.up.sql or .down.sql",
            ));
        };
        let name = caps[1].to_string();
        let sql = fs::read_to_string(&path)?;
        if &caps[2] == "up" {
            ups.insert(name, sql);
        } else {
            downs.insert(name, sql);
        }
    }

    if let Some(orphan) = downs.keys().find(|name| !ups.contains_key(*name)) {
        return Err(Error::migration(orphan.clone(), "down file has no matching up file"));
    }

    let mut migrations = Vec::with_capacity(ups.len());
    for (name, up) in ups {
        let Some(down) = downs.remove(&name) else {
            return Err(Error::migration(name, "missing .down.sql file"));
        };
        migrations.push(SqlMigration::new(name, up, down));
    }
    tracing::debug!(dir = %dir.display(), count = migrations.len(), "loaded sql migrations");
    Ok(migrations)
}

/// Split a script on `;` outside quotes and comments. Empty statements are
/// dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    for skipped in chars.by_ref() {
                        if skipped == '\n' {
                            current.push('\n');
                            break;
                        }
                    }
                }
                ';' => {
                    let statement = current.trim();
                    if !statement.is_empty() {
                        statements.push(statement.to_string());
                    }
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }
    statements
}
