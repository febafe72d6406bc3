//! `BelongsToMany`: many-to-many through a pivot table.
//!
//! ```ignore
//! let roles = user.belongs_to_many::<Role>().with_pivot(&["granted_by"]);
//! roles.attach([1, 2], [("granted_by", "admin")])?;
//!
//! let changes = roles.sync([2, 3])?;
//! assert_eq!(changes.detached, vec![Value::Int(1)]);
//! assert_eq!(changes.attached, vec![Value::Int(3)]);
//! ```
//!
//! Loaded models carry the pivot columns as `pivot_<column>` attributes.

use std::collections::HashSet;
use std::fmt;

use forge_core::{Error, Result, Value};
use forge_query::{Collection, QueryBuilder};
use serde::Serialize;

use super::{Relation, constrain_key};
use crate::db::Db;
use crate::model::{self, CREATED_AT, IntoAttributes, Model, UPDATED_AT};
use crate::query::ModelQuery;

/// What [`BelongsToMany::sync`] changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncChanges {
    /// Ids newly attached.
    pub attached: Vec<Value>,
    /// Ids detached.
    pub detached: Vec<Value>,
}

/// Related rows reached through a pivot table.
pub struct BelongsToMany<R> {
    db: Db,
    parent_key: Value,
    pivot_table: String,
    foreign_pivot_key: String,
    related_pivot_key: String,
    pivot_columns: Vec<String>,
    pivot_timestamps: bool,
    query: ModelQuery<R>,
}

impl<R: Model> BelongsToMany<R> {
    pub(crate) fn new(
        db: &Db,
        parent_key: Value,
        pivot_table: &str,
        foreign_pivot_key: &str,
        related_pivot_key: &str,
    ) -> Self {
        let mut relation = Self {
            db: db.clone(),
            parent_key,
            pivot_table: pivot_table.to_string(),
            foreign_pivot_key: foreign_pivot_key.to_string(),
            related_pivot_key: related_pivot_key.to_string(),
            pivot_columns: Vec::new(),
            pivot_timestamps: false,
            query: ModelQuery::new(db),
        };
        relation.query = relation.build_query();
        relation
    }

    fn build_query(&self) -> ModelQuery<R> {
        let related = R::definition();
        let pivot = &self.pivot_table;

        let mut projected = vec![self.foreign_pivot_key.clone(), self.related_pivot_key.clone()];
        projected.extend(self.pivot_columns.iter().cloned());
        if self.pivot_timestamps {
            projected.push(CREATED_AT.to_string());
            projected.push(UPDATED_AT.to_string());
        }
        let mut columns = vec![format!("{}.*", related.table_name())];
        columns.extend(
            projected
                .iter()
                .map(|col| format!("{pivot}.{col} as pivot_{col}")),
        );
        let columns: Vec<&str> = columns.iter().map(String::as_str).collect();

        let query = ModelQuery::new(&self.db).select(&columns).join(
            pivot,
            &format!("{pivot}.{}", self.related_pivot_key),
            "=",
            &related.qualify(related.key_name()),
        );
        constrain_key(
            query,
            &format!("{pivot}.{}", self.foreign_pivot_key),
            &self.parent_key,
        )
    }

    /// Also load these pivot columns (as `pivot_<column>`).
    pub fn with_pivot(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if !self.pivot_columns.iter().any(|c| c == column) {
                self.pivot_columns.push((*column).to_string());
            }
        }
        self.query = self.build_query();
        self
    }

    /// Maintain `created_at`/`updated_at` on pivot rows and load them.
    pub fn with_timestamps(mut self) -> Self {
        self.pivot_timestamps = true;
        self.query = self.build_query();
        self
    }

    /// Pivot table name.
    pub fn pivot_table(&self) -> &str {
        &self.pivot_table
    }

    /// Pivot column referencing the parent.
    pub fn foreign_pivot_key(&self) -> &str {
        &self.foreign_pivot_key
    }

    /// Pivot column referencing the related model.
    pub fn related_pivot_key(&self) -> &str {
        &self.related_pivot_key
    }

    fn require_parent(&self) -> Result<()> {
        if self.parent_key.is_null() {
            return Err(Error::configuration(format!(
                "cannot change `{}` rows for a parent that has not been saved",
                self.pivot_table
            )));
        }
        Ok(())
    }

    fn pivot_query(&self) -> QueryBuilder {
        QueryBuilder::table(self.pivot_table.as_str())
            .where_(&self.foreign_pivot_key, self.parent_key.clone())
    }

    /// Ids of the related rows currently attached, in pivot order.
    pub fn related_ids(&self) -> Result<Vec<Value>> {
        self.pivot_query()
            .pluck(self.db.reader(), &self.related_pivot_key)
    }

    // ==================== Pivot writes ====================

    /// INSERT one pivot row per id, each carrying `attributes`.
    pub fn attach<I, V>(&self, ids: I, attributes: impl IntoAttributes) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.require_parent()?;
        let mut extra = attributes.into_attributes();
        if self.pivot_timestamps {
            let now = Value::DateTime(model::fresh_timestamp());
            extra.push((CREATED_AT.to_string(), now.clone()));
            extra.push((UPDATED_AT.to_string(), now));
        }
        let rows: Vec<Vec<(String, Value)>> = ids
            .into_iter()
            .map(|id| {
                let mut row = vec![
                    (self.foreign_pivot_key.clone(), self.parent_key.clone()),
                    (self.related_pivot_key.clone(), id.into()),
                ];
                row.extend(extra.iter().cloned());
                row
            })
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }
        let inserted = QueryBuilder::table(self.pivot_table.as_str())
            .insert_many(self.db.writer(), rows)?;
        tracing::debug!(pivot = %self.pivot_table, parent = %self.parent_key, inserted, "attached");
        Ok(inserted)
    }

    /// DELETE the pivot rows for `ids`. An empty list detaches nothing.
    pub fn detach<I, V>(&self, ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.require_parent()?;
        let deleted = self
            .pivot_query()
            .where_in(&self.related_pivot_key, ids)
            .delete(self.db.writer())?;
        tracing::debug!(pivot = %self.pivot_table, parent = %self.parent_key, deleted, "detached");
        Ok(deleted)
    }

    /// DELETE every pivot row of the parent.
    pub fn detach_all(&self) -> Result<u64> {
        self.require_parent()?;
        self.pivot_query().delete(self.db.writer())
    }

    /// Make the attached set exactly `ids`: detach the ids no longer wanted
    /// and attach the new ones, in one transaction.
    ///
    /// Pivot rows for ids present before and after are left as they are;
    /// use [`update_existing_pivot`](Self::update_existing_pivot) to change
    /// their attributes.
    pub fn sync<I, V>(&self, ids: I) -> Result<SyncChanges>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.sync_ids(ids, true)
    }

    /// Attach the ids in `ids` that are not attached yet; detach nothing.
    pub fn sync_without_detaching<I, V>(&self, ids: I) -> Result<SyncChanges>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.sync_ids(ids, false)
    }

    fn sync_ids<I, V>(&self, ids: I, detaching: bool) -> Result<SyncChanges>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.require_parent()?;
        let mut seen = HashSet::new();
        let desired: Vec<Value> = ids
            .into_iter()
            .map(Into::into)
            .filter(|id: &Value| seen.insert(id.to_key_string()))
            .collect();

        self.db.atomic(|_| {
            let current = self.related_ids()?;
            let current_keys: HashSet<String> =
                current.iter().map(Value::to_key_string).collect();

            let mut changes = SyncChanges::default();
            if detaching {
                changes.detached = current
                    .into_iter()
                    .filter(|id| !seen.contains(&id.to_key_string()))
                    .collect();
                if !changes.detached.is_empty() {
                    self.detach(changes.detached.clone())?;
                }
            }
            changes.attached = desired
                .into_iter()
                .filter(|id| !current_keys.contains(&id.to_key_string()))
                .collect();
            if !changes.attached.is_empty() {
                self.attach(changes.attached.clone(), Vec::<(String, Value)>::new())?;
            }
            Ok(changes)
        })
    }

    /// UPDATE the pivot row of `id` with `attributes`.
    pub fn update_existing_pivot(
        &self,
        id: impl Into<Value>,
        attributes: impl IntoAttributes,
    ) -> Result<u64> {
        self.require_parent()?;
        let mut values = attributes.into_attributes();
        if self.pivot_timestamps && !values.iter().any(|(k, _)| k == UPDATED_AT) {
            values.push((
                UPDATED_AT.to_string(),
                Value::DateTime(model::fresh_timestamp()),
            ));
        }
        self.pivot_query()
            .where_(&self.related_pivot_key, id)
            .update(self.db.writer(), values)
    }

    // ==================== Related writes ====================

    /// Save `model` and attach it with `attributes`.
    pub fn save(&self, model: &mut R, attributes: impl IntoAttributes) -> Result<()> {
        self.require_parent()?;
        model.save()?;
        self.attach([model.key()], attributes)?;
        Ok(())
    }

    /// Create a related model and attach it with `pivot`.
    pub fn create(
        &self,
        attributes: impl IntoAttributes,
        pivot: impl IntoAttributes,
    ) -> Result<R> {
        let mut model = R::new_with(&self.db, attributes)?;
        self.save(&mut model, pivot)?;
        Ok(model)
    }
}

impl<R> fmt::Debug for BelongsToMany<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BelongsToMany")
            .field("pivot_table", &self.pivot_table)
            .field("foreign_pivot_key", &self.foreign_pivot_key)
            .field("related_pivot_key", &self.related_pivot_key)
            .field("parent_key", &self.parent_key)
            .field("pivot_columns", &self.pivot_columns)
            .finish_non_exhaustive()
    }
}

impl<R: Model> Relation for BelongsToMany<R> {
    type Related = R;
    type Output = Collection<R>;

    fn query(&self) -> &ModelQuery<R> {
        &self.query
    }

    fn get_results(&self) -> Result<Collection<R>> {
        self.query.get()
    }
}
