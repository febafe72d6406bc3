//! The migration runner.
//!
//! Applied migrations are recorded in a ledger table (`migrations` unless
//! configured otherwise) with columns `id`, `migration`, `batch` and
//! `executed_at`. The table is created on first use.
//!
//! # Batches
//!
//! Every `migrate()` call that applies anything takes the next batch number
//! (`max(batch) + 1`) and stamps it on each migration it runs. `rollback(n)`
//! undoes the newest `n` batches, newest first, and within a batch the
//! migrations in reverse name order.
//!
//! # Failures
//!
//! Each migration runs in its own transaction together with its ledger
//! write. When one fails, that transaction is rolled back, the error is
//! recorded in the returned [`MigrationReport`], and the run stops; the
//! remaining migrations stay pending. `Err` is reserved for problems with the
//! ledger itself.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use chrono::SubsecRound;
use forge_core::{Connection, Error, Result, Value};
use forge_query::QueryBuilder;
use serde::Serialize;

use crate::migration::{self, Migration};
use crate::schema::Schema;

/// Default ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

/// Whether a migration has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationState {
    Pending,
    Completed { batch: i64 },
}

/// One row of [`Migrator::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub name: String,
    #[serde(flatten)]
    pub state: MigrationState,
    /// False when the ledger names a migration this migrator does not know.
    pub registered: bool,
}

/// Outcome of `migrate` / `rollback`.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Batch applied or rolled back; `None` when nothing ran.
    pub batch: Option<i64>,
    /// Migrations that completed, in execution order.
    pub succeeded: Vec<String>,
    /// The migration that failed, with its error.
    pub failed: BTreeMap<String, Error>,
}

impl MigrationReport {
    /// True when no migration failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// True when nothing ran and nothing failed.
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }
}

/// Runs migrations against one connection.
pub struct Migrator<'a> {
    conn: &'a dyn Connection,
    table: String,
    migrations: BTreeMap<String, Box<dyn Migration + 'a>>,
}

impl<'a> Migrator<'a> {
    pub fn new(conn: &'a dyn Connection) -> Self {
        Self {
            conn,
            table: DEFAULT_LEDGER_TABLE.to_string(),
            migrations: BTreeMap::new(),
        }
    }

    /// Use a different ledger table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Register a migration. Names must be unique.
    pub fn add(&mut self, migration: impl Migration + 'a) -> Result<&mut Self> {
        let name = migration.name().to_string();
        if self.migrations.contains_key(&name) {
            return Err(Error::migration(name, "registered more than once"));
        }
        self.migrations.insert(name, Box::new(migration));
        Ok(self)
    }

    /// Register every SQL migration in `dir`; returns how many were added.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let loaded = migration::load_dir(dir)?;
        let count = loaded.len();
        for sql in loaded {
            self.add(sql)?;
        }
        Ok(count)
    }

    /// Registered names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.migrations.keys().map(String::as_str).collect()
    }

    fn schema(&self) -> Schema<'a> {
        Schema::new(self.conn)
    }

    fn ledger(&self) -> QueryBuilder {
        QueryBuilder::table(self.table.as_str())
    }

    /// Create the ledger table if it is missing.
    pub fn ensure_ledger(&self) -> Result<()> {
        let schema = self.schema();
        if schema.has_table(&self.table)? {
            return Ok(());
        }
        tracing::info!(table = %self.table, "creating migration ledger");
        schema.create(&self.table, |t| {
            t.increments("id");
            t.string("migration").unique();
            t.integer("batch");
            t.timestamp("executed_at").use_current();
        })
    }

    /// Ledger entries: migration name to batch.
    pub fn ran(&self) -> Result<BTreeMap<String, i64>> {
        if !self.schema().has_table(&self.table)? {
            return Ok(BTreeMap::new());
        }
        let rows = self
            .ledger()
            .order_by("batch", "asc")
            .order_by("migration", "asc")
            .get(self.conn)?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.value("migration")?.to_key_string();
                let batch = row.value("batch").and_then(Value::as_i64)?;
                Some((name, batch))
            })
            .collect())
    }

    /// Registered migrations without a ledger entry, in execution order.
    pub fn pending(&self) -> Result<Vec<String>> {
        let ran = self.ran()?;
        Ok(self
            .migrations
            .keys()
            .filter(|name| !ran.contains_key(*name))
            .cloned()
            .collect())
    }

    /// Highest recorded batch, 0 when the ledger is empty.
    pub fn last_batch(&self) -> Result<i64> {
        Ok(self.ran()?.values().copied().max().unwrap_or(0))
    }

    /// Pending and completed migrations, by name.
    pub fn status(&self) -> Result<Vec<MigrationStatus>> {
        let ran = self.ran()?;
        let names: BTreeSet<&String> = self.migrations.keys().chain(ran.keys()).collect();
        Ok(names
            .into_iter()
            .map(|name| MigrationStatus {
                name: name.clone(),
                state: ran
                    .get(name)
                    .map_or(MigrationState::Pending, |batch| MigrationState::Completed {
                        batch: *batch,
                    }),
                registered: self.migrations.contains_key(name),
            })
            .collect())
    }

    // ==================== Running ====================

    /// Apply every pending migration as one new batch.
    pub fn migrate(&self) -> Result<MigrationReport> {
        self.ensure_ledger()?;
        let ran = self.ran()?;
        let pending: Vec<&dyn Migration> = self
            .migrations
            .values()
            .filter(|m| !ran.contains_key(m.name()))
            .map(|m| &**m)
            .collect();

        let mut report = MigrationReport::default();
        if pending.is_empty() {
            tracing::info!("nothing to migrate");
            return Ok(report);
        }

        let batch = ran.values().copied().max().unwrap_or(0) + 1;
        report.batch = Some(batch);
        let schema = self.schema();

        for migration in pending {
            let name = migration.name().to_string();
            let executed_at = chrono::Utc::now().naive_utc().trunc_subsecs(0);
            let outcome = forge_core::transaction(self.conn, || {
                migration.up(&schema)?;
                self.ledger().insert(
                    self.conn,
                    [
                        ("migration", Value::from(name.as_str())),
                        ("batch", Value::Int(batch)),
                        ("executed_at", Value::DateTime(executed_at)),
                    ],
                )?;
                Ok(())
            });
            match outcome {
                Ok(()) => {
                    tracing::info!(migration = %name, batch, "migrated");
                    report.succeeded.push(name);
                }
                Err(err) => {
                    tracing::warn!(migration = %name, batch, error = %err, "migration failed; stopping");
                    report.failed.insert(name.clone(), as_migration_error(&name, err));
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Undo the newest `steps` batches.
    pub fn rollback(&self, steps: usize) -> Result<MigrationReport> {
        self.ensure_ledger()?;
        let ran = self.ran()?;
        let batches: BTreeSet<i64> = ran.values().copied().collect();
        let targets: BTreeSet<i64> = batches.into_iter().rev().take(steps).collect();

        let mut entries: Vec<(&String, i64)> = ran
            .iter()
            .filter(|(_, batch)| targets.contains(*batch))
            .map(|(name, batch)| (name, *batch))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(a.0)));

        let mut report = MigrationReport {
            batch: targets.last().copied(),
            ..MigrationReport::default()
        };
        if entries.is_empty() {
            tracing::info!("nothing to roll back");
            return Ok(report);
        }

        let schema = self.schema();
        for (name, batch) in entries {
            let Some(migration) = self.migrations.get(name) else {
                let err = Error::migration(name.clone(), "recorded in the ledger but not registered");
                tracing::warn!(migration = %name, batch, "cannot roll back unknown migration; stopping");
                report.failed.insert(name.clone(), err);
                break;
            };
            let outcome = forge_core::transaction(self.conn, || {
                migration.down(&schema)?;
                self.ledger()
                    .where_("migration", name.as_str())
                    .delete(self.conn)?;
                Ok(())
            });
            match outcome {
                Ok(()) => {
                    tracing::info!(migration = %name, batch, "rolled back");
                    report.succeeded.push(name.clone());
                }
                Err(err) => {
                    tracing::warn!(migration = %name, batch, error = %err, "rollback failed; stopping");
                    report.failed.insert(name.clone(), as_migration_error(name, err));
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Roll back every batch.
    pub fn reset(&self) -> Result<MigrationReport> {
        self.rollback(usize::MAX)
    }

    /// `reset()` then `migrate()`. The migrate step is skipped (empty report)
    /// when the reset fails.
    pub fn refresh(&self) -> Result<(MigrationReport, MigrationReport)> {
        let reset = self.reset()?;
        if !reset.is_success() {
            return Ok((reset, MigrationReport::default()));
        }
        let migrated = self.migrate()?;
        Ok((reset, migrated))
    }
}

fn as_migration_error(name: &str, err: Error) -> Error {
    match err {
        Error::Migration { .. } => err,
        other => Error::migration(name, other.to_string()),
    }
}

impl fmt::Debug for Migrator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator")
            .field("table", &self.table)
            .field("migrations", &self.names())
            .finish_non_exhaustive()
    }
}
