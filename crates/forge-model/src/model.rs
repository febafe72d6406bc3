//! Active Record models.
//!
//! A model is a thin struct around a [`ModelState`] plus a static
//! [`ModelDef`]. Everything else (finders, persistence, dirty tracking,
//! casts, relations, JSON) is provided by the [`Model`] trait.
//!
//! # Example
//!
//! ```ignore
//! forge_model::model! {
//!     pub struct User;
//!     |def| def.fillable(&["name", "email"]).timestamps(true)
//! }
//!
//! let mut user = User::create(&db, [("name", "Ada"), ("email", "ada@example.com")])?;
//! user.set_attribute("name", "Ada Lovelace")?;
//! assert!(user.is_dirty_key("name"));
//! user.save()?;
//!
//! let again = User::find_or_fail(&db, user.key())?;
//! ```
//!
//! # State
//!
//! `attributes` hold the current values, `original` the snapshot taken when
//! the row was loaded or last saved. An attribute is dirty when it was set
//! since the snapshot (even to an equal value) or differs from it. The
//! primary key is never part of the dirty set.

use chrono::{NaiveDateTime, SubsecRound, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;

use forge_core::{Error, Result, Row, Value};
use forge_query::{Collection, Paginator, QueryBuilder, SimplePaginator};

use crate::cache::{self, Cache};
use crate::db::Db;
use crate::definition::{Cast, ModelDef};
use crate::query::ModelQuery;
use crate::related::Related;
use crate::relations::{BelongsTo, BelongsToMany, HasMany, HasManyThrough, HasOne};

/// Creation timestamp column.
pub const CREATED_AT: &str = "created_at";
/// Modification timestamp column.
pub const UPDATED_AT: &str = "updated_at";

/// Current time as stored in timestamp columns (UTC, whole seconds).
pub fn fresh_timestamp() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}

// ============================================================================
// Attribute input
// ============================================================================

/// Anything that can be turned into `(column, value)` pairs.
///
/// Implemented for arrays, vectors and iterators of `(K, V)` where
/// `K: Into<String>` and `V: Into<Value>`.
pub trait IntoAttributes {
    /// Collect the pairs.
    fn into_attributes(self) -> Vec<(String, Value)>;
}

impl<I, K, V> IntoAttributes for I
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    fn into_attributes(self) -> Vec<(String, Value)> {
        forge_query::pairs(self)
    }
}

// ============================================================================
// Instance state
// ============================================================================

/// Per-instance Active Record state.
#[derive(Debug, Clone)]
pub struct ModelState {
    db: Db,
    attributes: BTreeMap<String, Value>,
    original: BTreeMap<String, Value>,
    touched: BTreeSet<String>,
    exists: bool,
    relations: HashMap<String, Related>,
}

impl ModelState {
    /// Fresh, unsaved state.
    pub fn new(db: Db) -> Self {
        Self {
            db,
            attributes: BTreeMap::new(),
            original: BTreeMap::new(),
            touched: BTreeSet::new(),
            exists: false,
            relations: HashMap::new(),
        }
    }

    /// State for a row read from the database: persisted, snapshot taken.
    pub fn hydrated(db: Db, row: Row) -> Self {
        let attributes: BTreeMap<String, Value> = row.into_pairs().into_iter().collect();
        Self {
            db,
            original: attributes.clone(),
            attributes,
            touched: BTreeSet::new(),
            exists: true,
            relations: HashMap::new(),
        }
    }

    /// Database context.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Current raw attributes.
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Snapshot of the last persisted attributes.
    pub fn original(&self) -> &BTreeMap<String, Value> {
        &self.original
    }

    /// Whether the row is known to exist in the database.
    pub fn exists(&self) -> bool {
        self.exists
    }
}

/// Result of [`Model::get`]: a loaded relation or an attribute value.
#[derive(Debug)]
pub enum Resolved<'a> {
    Relation(&'a Related),
    Attribute(Value),
}

impl Resolved<'_> {
    /// The attribute value, if this is not a relation.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Resolved::Attribute(v) => Some(v),
            Resolved::Relation(_) => None,
        }
    }

    /// The relation, if this is one.
    pub fn as_relation(&self) -> Option<&Related> {
        match self {
            Resolved::Relation(r) => Some(r),
            Resolved::Attribute(_) => None,
        }
    }
}

fn cache_for<M: Model>(db: &Db) -> Option<&dyn Cache> {
    if M::definition().is_cached() {
        db.cache()
    } else {
        None
    }
}

/// Forget the cache keys a single-row write affects.
pub(crate) fn invalidate_row<M: Model>(db: &Db, key: &Value) {
    if let Some(cache) = db.cache() {
        let table = M::definition().table_name();
        cache.forget(&cache::all_key(table));
        if !key.is_null() {
            cache.forget(&cache::find_key(table, &key.to_key_string()));
        }
    }
}

/// Forget every cache key of the model's table.
pub(crate) fn invalidate_table<M: Model>(db: &Db) {
    if let Some(cache) = db.cache() {
        cache.forget_prefix(&cache::table_prefix(M::definition().table_name()));
    }
}

fn joining_table(a: &str, b: &str) -> String {
    let mut names = [
        forge_core::inflect::singularize(a),
        forge_core::inflect::singularize(b),
    ];
    names.sort();
    names.join("_")
}

// ============================================================================
// The Model trait
// ============================================================================

/// An Active Record model.
///
/// Implementors provide the four required methods (the [`model!`](crate::model!)
/// macro writes them); everything else is provided.
pub trait Model: Clone + Debug + Sized + 'static {
    /// The static definition of this model type.
    fn definition() -> &'static ModelDef<Self>;

    /// Instance state.
    fn state(&self) -> &ModelState;

    /// Mutable instance state.
    fn state_mut(&mut self) -> &mut ModelState;

    /// Wrap state into the model type.
    fn from_state(state: ModelState) -> Self;

    // ==================== Construction ====================

    /// A new, unsaved instance bound to `db`.
    fn make(db: &Db) -> Self {
        Self::from_state(ModelState::new(db.clone()))
    }

    /// A new, unsaved instance filled with `attributes`.
    fn new_with(db: &Db, attributes: impl IntoAttributes) -> Result<Self> {
        let mut model = Self::make(db);
        model.fill(attributes)?;
        Ok(model)
    }

    /// An instance for a row read from the database.
    fn hydrate(db: &Db, row: Row) -> Self {
        Self::from_state(ModelState::hydrated(db.clone(), row))
    }

    // ==================== Static finders ====================

    /// A query scoped to this model's table.
    fn query(db: &Db) -> ModelQuery<Self> {
        ModelQuery::new(db)
    }

    /// Every row. Served from the cache under `<table>:all` when enabled.
    fn all(db: &Db) -> Result<Collection<Self>> {
        let def = Self::definition();
        if let Some(cache) = cache_for::<Self>(db) {
            let key = cache::all_key(def.table_name());
            let rows = match cache.get(&key) {
                Some(rows) => rows,
                None => {
                    let rows = QueryBuilder::table(def.table_name())
                        .get(db.reader())?
                        .into_vec();
                    cache.put(&key, rows.clone(), None);
                    rows
                }
            };
            return Ok(rows.into_iter().map(|row| Self::hydrate(db, row)).collect());
        }
        Self::query(db).get()
    }

    /// Row by primary key. Served from the cache under `<table>:find:<id>`
    /// when enabled.
    fn find(db: &Db, id: impl Into<Value>) -> Result<Option<Self>> {
        let def = Self::definition();
        let id = id.into();
        if let Some(cache) = cache_for::<Self>(db) {
            let key = cache::find_key(def.table_name(), &id.to_key_string());
            let rows = match cache.get(&key) {
                Some(rows) => rows,
                None => {
                    let rows: Vec<Row> = QueryBuilder::table(def.table_name())
                        .where_(def.key_name(), id)
                        .first(db.reader())?
                        .into_iter()
                        .collect();
                    cache.put(&key, rows.clone(), None);
                    rows
                }
            };
            return Ok(rows.into_iter().next().map(|row| Self::hydrate(db, row)));
        }
        Self::query(db).find(id)
    }

    /// Rows whose primary key is in `ids`.
    fn find_many<I, V>(db: &Db, ids: I) -> Result<Collection<Self>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::query(db)
            .where_in(Self::definition().key_name(), ids)
            .get()
    }

    /// Row by primary key or `Error::NotFound`.
    fn find_or_fail(db: &Db, id: impl Into<Value>) -> Result<Self> {
        let id = id.into();
        Self::find(db, id.clone())?.ok_or_else(|| {
            Error::not_found(Self::definition().name(), Some(id.to_key_string()))
        })
    }

    /// `WHERE column = value`.
    fn where_(db: &Db, column: &str, value: impl Into<Value>) -> ModelQuery<Self> {
        Self::query(db).where_(column, value)
    }

    /// `WHERE column <op> value`.
    fn where_op(db: &Db, column: &str, operator: &str, value: impl Into<Value>) -> ModelQuery<Self> {
        Self::query(db).where_op(column, operator, value)
    }

    /// Query with a named scope applied.
    fn scope(db: &Db, name: &str, args: &[Value]) -> Result<ModelQuery<Self>> {
        Self::query(db).scope(name, args)
    }

    /// First row.
    fn first(db: &Db) -> Result<Option<Self>> {
        Self::query(db).first()
    }

    /// First row or `Error::NotFound`.
    fn first_or_fail(db: &Db) -> Result<Self> {
        Self::query(db).first_or_fail()
    }

    /// First row matching `search`, or a new row created from `search`
    /// merged with `extra`. Both go through mass assignment.
    fn first_or_create(
        db: &Db,
        search: impl IntoAttributes,
        extra: impl IntoAttributes,
    ) -> Result<Self> {
        let search = search.into_attributes();
        let query = search
            .iter()
            .fold(Self::query(db), |q, (k, v)| q.where_(k, v.clone()));
        if let Some(found) = query.first()? {
            return Ok(found);
        }
        let mut model = Self::make(db);
        model.fill(search)?;
        model.fill(extra)?;
        model.save()?;
        Ok(model)
    }

    /// Update the first row matching `search` with `values`, or create it.
    fn update_or_create(
        db: &Db,
        search: impl IntoAttributes,
        values: impl IntoAttributes,
    ) -> Result<Self> {
        let search = search.into_attributes();
        let query = search
            .iter()
            .fold(Self::query(db), |q, (k, v)| q.where_(k, v.clone()));
        let mut model = match query.first()? {
            Some(found) => found,
            None => {
                let mut model = Self::make(db);
                model.fill(search)?;
                model
            }
        };
        model.fill(values)?;
        model.save()?;
        Ok(model)
    }

    /// Fill a new instance and save it.
    fn create(db: &Db, attributes: impl IntoAttributes) -> Result<Self> {
        let mut model = Self::new_with(db, attributes)?;
        model.save()?;
        Ok(model)
    }

    /// Number of rows.
    fn count(db: &Db) -> Result<i64> {
        Self::query(db).count()
    }

    /// Whether the table has any row.
    fn exists(db: &Db) -> Result<bool> {
        Self::query(db).exists()
    }

    /// One page plus the total.
    fn paginate(db: &Db, per_page: u64, page: u64) -> Result<Paginator<Self>> {
        Self::query(db).paginate(per_page, page)
    }

    /// One page without a total.
    fn simple_paginate(db: &Db, per_page: u64, page: u64) -> Result<SimplePaginator<Self>> {
        Self::query(db).simple_paginate(per_page, page)
    }

    /// One column from every row.
    fn pluck(db: &Db, column: &str) -> Result<Vec<Value>> {
        Self::query(db).pluck(column)
    }

    /// Delete rows by primary key; returns the number deleted.
    fn destroy<I, V>(db: &Db, ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::query(db)
            .where_in(Self::definition().key_name(), ids)
            .delete()
    }

    /// Run `f` in a transaction.
    fn transaction<T, F>(db: &Db, f: F) -> Result<T>
    where
        F: FnOnce(&Db) -> Result<T>,
    {
        db.transaction(f)
    }

    // ==================== Attributes ====================

    /// Database context of this instance.
    fn db(&self) -> &Db {
        self.state().db()
    }

    /// Primary key value (`Null` when unsaved).
    fn key(&self) -> Value {
        self.get_raw(Self::definition().key_name())
    }

    /// Whether the row exists in the database.
    fn is_persisted(&self) -> bool {
        self.state().exists
    }

    /// Stored value without casts or accessors.
    fn get_raw(&self, key: &str) -> Value {
        self.state()
            .attributes
            .get(key)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Attribute value: cast applied, then the accessor.
    fn get_attribute(&self, key: &str) -> Value {
        let def = Self::definition();
        let raw = self.get_raw(key);
        let value = match def.cast_for(key) {
            Some(cast) => cast.apply(raw.clone()).unwrap_or_else(|err| {
                tracing::warn!(model = def.name(), key, error = %err, "cast on read failed; returning raw value");
                raw
            }),
            None => raw,
        };
        match def.accessor_for(key) {
            Some(accessor) => accessor(self, value),
            None => value,
        }
    }

    /// Set an attribute through the write pipeline.
    ///
    /// A registered mutator wins and its output is stored as-is; otherwise a
    /// date key is cast to a date-time, otherwise the declared cast applies.
    fn set_attribute(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let def = Self::definition();
        let value = value.into();
        let stored = if let Some(mutator) = def.mutator_for(key) {
            mutator(value)
        } else if def.is_date(key) {
            Cast::DateTime.apply(value)?
        } else if let Some(cast) = def.declared_cast(key) {
            cast.apply(value)?
        } else {
            value
        };
        self.set_raw(key, stored);
        Ok(())
    }

    /// Store a value as-is; it still counts as a change.
    fn set_raw(&mut self, key: &str, value: impl Into<Value>) {
        let state = self.state_mut();
        state.attributes.insert(key.to_string(), value.into());
        state.touched.insert(key.to_string());
    }

    /// Mass-assign the allowed subset of `attributes`.
    fn fill(&mut self, attributes: impl IntoAttributes) -> Result<&mut Self> {
        let def = Self::definition();
        for (key, value) in attributes.into_attributes() {
            if def.is_fillable(&key) {
                self.set_attribute(&key, value)?;
            } else {
                tracing::trace!(model = def.name(), key = %key, "ignoring non-fillable attribute");
            }
        }
        Ok(self)
    }

    /// Assign every attribute, ignoring the fillable/guarded lists.
    fn force_fill(&mut self, attributes: impl IntoAttributes) -> Result<&mut Self> {
        for (key, value) in attributes.into_attributes() {
            self.set_attribute(&key, value)?;
        }
        Ok(self)
    }

    /// Whether `key` changed since the snapshot.
    fn is_dirty_key(&self, key: &str) -> bool {
        let def = Self::definition();
        if key == def.key_name() {
            return false;
        }
        let state = self.state();
        state.touched.contains(key) || state.attributes.get(key) != state.original.get(key)
    }

    /// Whether any attribute changed since the snapshot.
    fn is_dirty(&self) -> bool {
        !self.get_dirty().is_empty()
    }

    /// Whether nothing changed since the snapshot.
    fn is_clean(&self) -> bool {
        !self.is_dirty()
    }

    /// Changed attributes, primary key excluded.
    fn get_dirty(&self) -> Vec<(String, Value)> {
        self.state()
            .attributes
            .iter()
            .filter(|(key, _)| self.is_dirty_key(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Snapshot value of `key`.
    fn get_original(&self, key: &str) -> Option<&Value> {
        self.state().original.get(key)
    }

    /// Take a new snapshot of the current attributes.
    fn sync_original(&mut self) {
        let state = self.state_mut();
        state.original = state.attributes.clone();
        state.touched.clear();
    }

    // ==================== Persistence ====================

    /// INSERT a new record or UPDATE the dirty attributes of an existing one.
    ///
    /// An existing record with nothing dirty issues no statement.
    fn save(&mut self) -> Result<()> {
        let def = Self::definition();
        let db = self.db().clone();
        let table = def.table_name();
        let pk = def.key_name();

        if !self.is_persisted() || self.key().is_null() {
            if def.uses_timestamps() {
                let now = fresh_timestamp();
                if self.get_raw(CREATED_AT).is_null() {
                    self.set_raw(CREATED_AT, now);
                }
                self.set_raw(UPDATED_AT, now);
            }
            let key_missing = self.key().is_null();
            let data: Vec<(String, Value)> = self
                .state()
                .attributes
                .iter()
                .filter(|(k, _)| !(key_missing && k.as_str() == pk))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let query = QueryBuilder::table(table);
            if def.is_incrementing() && key_missing {
                let id = query.insert_get_id(db.writer(), data, pk)?;
                self.state_mut()
                    .attributes
                    .insert(pk.to_string(), Value::Int(id));
            } else {
                query.insert(db.writer(), data)?;
            }
            tracing::debug!(model = def.name(), key = %self.key(), "inserted");
        } else {
            let mut dirty = self.get_dirty();
            if dirty.is_empty() {
                tracing::trace!(model = def.name(), key = %self.key(), "nothing dirty; skipping update");
                return Ok(());
            }
            if def.uses_timestamps() && !dirty.iter().any(|(k, _)| k == UPDATED_AT) {
                let now = fresh_timestamp();
                self.set_raw(UPDATED_AT, now);
                dirty.push((UPDATED_AT.to_string(), Value::DateTime(now)));
            }
            QueryBuilder::table(table)
                .where_(pk, self.key())
                .update(db.writer(), dirty)?;
            tracing::debug!(model = def.name(), key = %self.key(), "updated");
        }

        self.state_mut().exists = true;
        self.sync_original();
        invalidate_row::<Self>(&db, &self.key());
        Ok(())
    }

    /// Fill and save.
    fn update(&mut self, attributes: impl IntoAttributes) -> Result<()> {
        self.fill(attributes)?;
        self.save()
    }

    /// DELETE this record. Returns whether a row was removed.
    fn delete(&mut self) -> Result<bool> {
        if !self.is_persisted() {
            return Ok(false);
        }
        let def = Self::definition();
        let db = self.db().clone();
        let affected = QueryBuilder::table(def.table_name())
            .where_(def.key_name(), self.key())
            .delete(db.writer())?;
        self.state_mut().exists = false;
        invalidate_row::<Self>(&db, &self.key());
        tracing::debug!(model = def.name(), key = %self.key(), affected, "deleted");
        Ok(affected > 0)
    }

    /// A newly loaded copy of this record.
    fn fresh(&self) -> Result<Option<Self>> {
        if !self.is_persisted() {
            return Ok(None);
        }
        Self::query(self.db())
            .where_(Self::definition().key_name(), self.key())
            .first()
    }

    /// Reload attributes from the database and drop loaded relations.
    fn refresh(&mut self) -> Result<()> {
        let fresh = self.fresh()?.ok_or_else(|| {
            Error::not_found(Self::definition().name(), Some(self.key().to_key_string()))
        })?;
        let state = self.state_mut();
        state.attributes = fresh.state().attributes.clone();
        state.original = state.attributes.clone();
        state.touched.clear();
        state.relations.clear();
        Ok(())
    }

    /// `column = column + amount` on this row, mirrored in memory.
    fn increment(&mut self, column: &str, amount: i64) -> Result<()> {
        self.adjust(column, amount)
    }

    /// `column = column - amount` on this row, mirrored in memory.
    fn decrement(&mut self, column: &str, amount: i64) -> Result<()> {
        self.adjust(column, -amount)
    }

    #[doc(hidden)]
    fn adjust(&mut self, column: &str, amount: i64) -> Result<()> {
        let def = Self::definition();
        if !self.is_persisted() {
            return Err(Error::configuration(format!(
                "cannot increment `{column}` on an unsaved {}",
                def.name()
            )));
        }
        let db = self.db().clone();
        let mut extra = Vec::new();
        if def.uses_timestamps() {
            extra.push((UPDATED_AT.to_string(), Value::DateTime(fresh_timestamp())));
        }
        QueryBuilder::table(def.table_name())
            .where_(def.key_name(), self.key())
            .increment(db.writer(), column, amount, extra.clone())?;

        let current = self.get_raw(column);
        let next = match current {
            Value::Float(f) => Value::Float(f + amount as f64),
            other => Value::Int(other.as_i64().unwrap_or(0) + amount),
        };
        let state = self.state_mut();
        for (key, value) in std::iter::once((column.to_string(), next)).chain(extra) {
            state.original.insert(key.clone(), value.clone());
            state.attributes.insert(key, value);
        }
        invalidate_row::<Self>(&db, &self.key());
        Ok(())
    }

    /// Bump `updated_at` (no-op without timestamps).
    fn touch(&mut self) -> Result<()> {
        if !Self::definition().uses_timestamps() {
            return Ok(());
        }
        self.set_raw(UPDATED_AT, fresh_timestamp());
        self.save()
    }

    // ==================== Relations ====================

    /// Resolve `key`: a loaded relation, else a registered relation (loaded
    /// and cached now), else the attribute.
    fn get(&mut self, key: &str) -> Result<Resolved<'_>> {
        if self.state().relations.contains_key(key) {
            return Ok(Resolved::Relation(&self.state().relations[key]));
        }
        if let Some(resolver) = Self::definition().relation_for(key) {
            let related = resolver(self)?;
            let slot = self
                .state_mut()
                .relations
                .entry(key.to_string())
                .or_insert(related);
            return Ok(Resolved::Relation(slot));
        }
        Ok(Resolved::Attribute(self.get_attribute(key)))
    }

    /// The relation `name`, loading it on first access.
    fn relation(&mut self, name: &str) -> Result<&Related> {
        match self.get(name)? {
            Resolved::Relation(related) => Ok(related),
            Resolved::Attribute(_) => Err(Error::configuration(format!(
                "relation `{name}` is not defined on {}",
                Self::definition().name()
            ))),
        }
    }

    /// Single related model of relation `name`.
    fn related_one<R: Model>(&mut self, name: &str) -> Result<Option<R>> {
        Ok(self.relation(name)?.as_one::<R>().cloned())
    }

    /// Related models of relation `name`.
    fn related_many<R: Model>(&mut self, name: &str) -> Result<Vec<R>> {
        Ok(self
            .relation(name)?
            .as_many::<R>()
            .into_iter()
            .cloned()
            .collect())
    }

    /// Store a loaded relation.
    fn set_relation(&mut self, name: &str, related: Related) {
        self.state_mut()
            .relations
            .insert(name.to_string(), related);
    }

    /// Drop a loaded relation so the next access reloads it.
    fn unset_relation(&mut self, name: &str) {
        self.state_mut().relations.remove(name);
    }

    /// Whether relation `name` is loaded.
    fn relation_loaded(&self, name: &str) -> bool {
        self.state().relations.contains_key(name)
    }

    /// One child row keyed by this model's default foreign key.
    fn has_one<R: Model>(&self) -> HasOne<R> {
        let def = Self::definition();
        self.has_one_with(&def.foreign_key(), def.key_name())
    }

    /// One child row with explicit keys.
    fn has_one_with<R: Model>(&self, foreign_key: &str, local_key: &str) -> HasOne<R> {
        HasOne::new(self.db(), foreign_key, self.get_raw(local_key))
    }

    /// Child rows keyed by this model's default foreign key.
    fn has_many<R: Model>(&self) -> HasMany<R> {
        let def = Self::definition();
        self.has_many_with(&def.foreign_key(), def.key_name())
    }

    /// Child rows with explicit keys.
    fn has_many_with<R: Model>(&self, foreign_key: &str, local_key: &str) -> HasMany<R> {
        HasMany::new(self.db(), foreign_key, self.get_raw(local_key))
    }

    /// Owning row through `R`'s default foreign key on this model.
    fn belongs_to<R: Model>(&self) -> BelongsTo<R> {
        let related = R::definition();
        self.belongs_to_with(&related.foreign_key(), related.key_name())
    }

    /// Owning row with explicit keys.
    fn belongs_to_with<R: Model>(&self, foreign_key: &str, owner_key: &str) -> BelongsTo<R> {
        BelongsTo::new(self.db(), foreign_key, self.get_raw(foreign_key), owner_key)
    }

    /// Many-to-many through the conventional pivot table (`role_user`).
    fn belongs_to_many<R: Model>(&self) -> BelongsToMany<R> {
        let def = Self::definition();
        let related = R::definition();
        let pivot = joining_table(def.table_name(), related.table_name());
        self.belongs_to_many_with(&pivot, &def.foreign_key(), &related.foreign_key())
    }

    /// Many-to-many with explicit pivot table and keys.
    fn belongs_to_many_with<R: Model>(
        &self,
        pivot_table: &str,
        foreign_pivot_key: &str,
        related_pivot_key: &str,
    ) -> BelongsToMany<R> {
        BelongsToMany::new(
            self.db(),
            self.key(),
            pivot_table,
            foreign_pivot_key,
            related_pivot_key,
        )
    }

    /// Distant rows reached through the intermediate model `I`.
    fn has_many_through<R: Model, I: Model>(&self) -> HasManyThrough<R> {
        let def = Self::definition();
        let through = I::definition();
        self.has_many_through_with::<R>(
            through.table_name(),
            &def.foreign_key(),
            &through.foreign_key(),
            def.key_name(),
            through.key_name(),
        )
    }

    /// Distant rows with explicit tables and keys.
    fn has_many_through_with<R: Model>(
        &self,
        through_table: &str,
        first_key: &str,
        second_key: &str,
        local_key: &str,
        second_local_key: &str,
    ) -> HasManyThrough<R> {
        HasManyThrough::new(
            self.db(),
            self.get_raw(local_key),
            through_table,
            first_key,
            second_key,
            second_local_key,
        )
    }

    // ==================== Serialization ====================

    /// Attribute values (casts and accessors applied), hidden excluded,
    /// appended attributes included.
    fn to_map(&self) -> BTreeMap<String, Value> {
        let def = Self::definition();
        self.state()
            .attributes
            .keys()
            .chain(def.appended_keys())
            .filter(|key| !def.hidden_keys().contains(key))
            .map(|key| (key.clone(), self.get_attribute(key)))
            .collect()
    }

    /// JSON object of [`to_map`](Self::to_map) plus loaded relations.
    fn to_json(&self) -> serde_json::Value {
        let def = Self::definition();
        let mut object: serde_json::Map<String, serde_json::Value> = self
            .to_map()
            .into_iter()
            .map(|(k, v)| (k, v.to_json()))
            .collect();
        for (name, related) in &self.state().relations {
            if !def.hidden_keys().contains(name) {
                object.insert(name.clone(), related.to_json());
            }
        }
        serde_json::Value::Object(object)
    }
}

/// Declare a model struct and its [`Model`] implementation.
///
/// ```ignore
/// forge_model::model! {
///     /// Blog posts.
///     pub struct Post;
///     |def| def.fillable(&["title", "body", "user_id"]).timestamps(true)
/// }
/// ```
#[macro_export]
macro_rules! model {
    ($(#[$meta:meta])* $vis:vis struct $name:ident; $define:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            state: $crate::ModelState,
        }

        impl $crate::Model for $name {
            fn definition() -> &'static $crate::ModelDef<Self> {
                static DEFINITION: ::std::sync::OnceLock<$crate::ModelDef<$name>> =
                    ::std::sync::OnceLock::new();
                DEFINITION.get_or_init(|| {
                    let define: fn($crate::ModelDef<$name>) -> $crate::ModelDef<$name> = $define;
                    define($crate::ModelDef::new(stringify!($name)))
                })
            }

            fn state(&self) -> &$crate::ModelState {
                &self.state
            }

            fn state_mut(&mut self) -> &mut $crate::ModelState {
                &mut self.state
            }

            fn from_state(state: $crate::ModelState) -> Self {
                Self { state }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Post, Profile, Tag, User, cached_db, counting, db};

    #[test]
    fn test_joining_table_is_sorted_singulars() {
        assert_eq!(joining_table("users", "roles"), "role_user");
        assert_eq!(joining_table("roles", "users"), "role_user");
        assert_eq!(joining_table("blog_posts", "tags"), "blog_post_tag");
    }

    #[test]
    fn test_create_then_find_round_trip() {
        let db = db();
        let user = User::create(&db, [("name", "  Ada "), ("email", "ada@example.com")]).unwrap();
        assert!(user.is_persisted());
        assert_eq!(user.key(), Value::Int(1));
        assert!(matches!(user.get_raw(CREATED_AT), Value::DateTime(_)));

        let found = User::find_or_fail(&db, 1).unwrap();
        assert_eq!(found.get_attribute("name"), Value::from("Ada"));
        assert_eq!(found.get_attribute("email"), Value::from("ada@example.com"));
        assert!(matches!(found.get_attribute(UPDATED_AT), Value::DateTime(_)));
        assert!(found.is_clean());

        assert!(User::find(&db, 99).unwrap().is_none());
        assert!(User::find_or_fail(&db, 99).unwrap_err().is_not_found());
    }

    #[test]
    fn test_fill_respects_mass_assignment_rules() {
        let db = db();
        let mut user = User::make(&db);
        user.fill([("name", Value::from("Ada")), ("id", Value::Int(7)), ("admin", Value::Bool(true))])
            .unwrap();
        assert_eq!(user.get_raw("name"), Value::from("Ada"));
        assert!(user.get_raw("id").is_null());
        assert!(user.get_raw("admin").is_null());

        let mut profile = Profile::make(&db);
        profile.fill([("bio", "hi"), ("id", "5")]).unwrap();
        assert_eq!(profile.get_raw("bio"), Value::from("hi"));
        assert!(profile.get_raw("id").is_null());
    }

    #[test]
    fn test_casts_apply_on_write_and_read() {
        let db = db();
        let user = User::create(&db, [("name", "Ada"), ("age", "36"), ("settings", r#"{"theme":"dark"}"#)])
            .unwrap();
        assert_eq!(user.get_raw("age"), Value::Int(36));
        assert_eq!(
            user.get_attribute("settings"),
            Value::Json(serde_json::json!({"theme": "dark"}))
        );

        let loaded = User::find_or_fail(&db, user.key()).unwrap();
        assert_eq!(
            loaded.get_attribute("settings"),
            Value::Json(serde_json::json!({"theme": "dark"}))
        );

        let mut bad = User::make(&db);
        assert!(matches!(
            bad.set_attribute("age", "old"),
            Err(Error::Conversion(_))
        ));
    }

    #[test]
    fn test_dirty_tracking_and_empty_update() {
        let conn = counting();
        let db = Db::new(conn.clone());
        User::create(&db, [("name", "Ada"), ("age", "36")]).unwrap();

        let mut user = User::find_or_fail(&db, 1).unwrap();
        assert!(!user.is_dirty());

        user.set_attribute("name", "Ada").unwrap();
        assert!(user.is_dirty_key("name"));
        assert!(!user.is_dirty_key("age"));

        user.set_raw("id", 1);
        assert!(!user.is_dirty_key("id"));
        assert_eq!(
            user.get_dirty().iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["name"]
        );

        user.save().unwrap();
        assert!(user.is_clean());
        assert_eq!(user.get_original("name"), Some(&Value::from("Ada")));

        let before = conn.executes.get();
        user.save().unwrap();
        assert_eq!(conn.executes.get(), before);
    }

    #[test]
    fn test_update_delete_refresh() {
        let db = db();
        let mut user = User::create(&db, [("name", "Ada")]).unwrap();
        user.update([("name", "Grace")]).unwrap();
        assert_eq!(
            User::find_or_fail(&db, user.key()).unwrap().get_raw("name"),
            Value::from("Grace")
        );

        db.table("users")
            .where_("id", user.key())
            .update(db.writer(), [("name", "Hopper")])
            .unwrap();
        user.refresh().unwrap();
        assert_eq!(user.get_raw("name"), Value::from("Hopper"));

        assert!(user.delete().unwrap());
        assert!(!user.is_persisted());
        assert!(!user.delete().unwrap());
        assert_eq!(User::count(&db).unwrap(), 0);
    }

    #[test]
    fn test_increment_updates_row_and_memory() {
        let db = db();
        let mut user = User::create(&db, [("name", "Ada")]).unwrap();
        user.refresh().unwrap();
        user.increment("votes", 5).unwrap();
        user.decrement("votes", 2).unwrap();
        assert_eq!(user.get_raw("votes"), Value::Int(3));
        assert!(!user.is_dirty_key("votes"));
        assert_eq!(
            User::find_or_fail(&db, user.key()).unwrap().get_raw("votes"),
            Value::Int(3)
        );

        let mut unsaved = User::make(&db);
        assert!(unsaved.increment("votes", 1).is_err());
    }

    #[test]
    fn test_first_or_create_and_update_or_create() {
        let db = db();
        let first = User::first_or_create(&db, [("name", "Ada")], [("age", 36)]).unwrap();
        let again = User::first_or_create(&db, [("name", "Ada")], [("age", 99)]).unwrap();
        assert_eq!(first.key(), again.key());
        assert_eq!(again.get_raw("age"), Value::Int(36));

        let updated = User::update_or_create(&db, [("name", "Ada")], [("age", 37)]).unwrap();
        assert_eq!(updated.key(), first.key());
        assert_eq!(updated.get_raw("age"), Value::Int(37));

        let created = User::update_or_create(&db, [("name", "Grace")], [("age", 40)]).unwrap();
        assert_ne!(created.key(), first.key());
        assert_eq!(User::count(&db).unwrap(), 2);
    }

    #[test]
    fn test_scopes() {
        let db = db();
        User::create(&db, [("name", "kid"), ("age", "10")]).unwrap();
        User::create(&db, [("name", "adult"), ("age", "30")]).unwrap();
        User::create(&db, [("name", "elder"), ("age", "80")]).unwrap();

        assert_eq!(User::scope(&db, "adults", &[]).unwrap().count().unwrap(), 2);
        let older = User::scope(&db, "older_than", &[Value::Int(50)])
            .unwrap()
            .get()
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].get_raw("name"), Value::from("elder"));

        assert!(matches!(
            User::scope(&db, "missing", &[]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_json_hides_and_appends() {
        let db = db();
        let user = User::create(&db, [("name", "Ada"), ("email", "ada@example.com")]).unwrap();
        let json = user.to_json();
        assert_eq!(json["name"], "Ada");
        assert_eq!(json["display_name"], "@Ada");
        assert!(json.get("email").is_none());
    }

    #[test]
    fn test_relation_access_is_cached_on_the_instance() {
        let conn = counting();
        let db = Db::new(conn.clone());
        let mut user = User::create(&db, [("name", "Ada")]).unwrap();
        user.has_many::<Post>().create([("title", "one")]).unwrap();
        user.has_many::<Post>().create([("title", "two")]).unwrap();

        let queries = conn.queries.get();
        let posts = user.related_many::<Post>("posts").unwrap();
        assert_eq!(posts.len(), 2);
        assert!(user.relation_loaded("posts"));
        user.related_many::<Post>("posts").unwrap();
        assert_eq!(conn.queries.get(), queries + 1);

        assert!(matches!(user.get("name").unwrap(), Resolved::Attribute(Value::Text(_))));
        assert!(user.get("profile").unwrap().as_relation().is_some_and(Related::is_empty));

        let json = user.to_json();
        assert_eq!(json["posts"].as_array().map(Vec::len), Some(2));

        let mut post = Post::find_or_fail(&db, 1).unwrap();
        let author = post.related_one::<User>("author").unwrap().unwrap();
        assert_eq!(author.key(), user.key());
        assert!(user.relation("nope").is_err());
    }

    #[test]
    fn test_cache_read_through_and_invalidation() {
        let (db, conn) = cached_db();
        let mut tag = Tag::create(&db, [("label", "rust")]).unwrap();

        let queries = conn.queries.get();
        assert!(Tag::find(&db, 1).unwrap().is_some());
        assert!(Tag::find(&db, 1).unwrap().is_some());
        assert_eq!(Tag::all(&db).unwrap().len(), 1);
        assert_eq!(Tag::all(&db).unwrap().len(), 1);
        assert_eq!(conn.queries.get(), queries + 2);

        tag.update([("label", "go")]).unwrap();
        let found = Tag::find(&db, 1).unwrap().unwrap();
        assert_eq!(found.get_raw("label"), Value::from("go"));

        Tag::create(&db, [("label", "zig")]).unwrap();
        assert_eq!(Tag::all(&db).unwrap().len(), 2);

        Tag::query(&db).where_("label", "zig").delete().unwrap();
        assert_eq!(Tag::all(&db).unwrap().len(), 1);

        let cache = db.cache().unwrap();
        assert!(cache.get("tags:all").is_some());
        tag.delete().unwrap();
        assert!(cache.get("tags:all").is_none());
        assert!(cache.get("tags:find:1").is_none());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = db();
        let result: Result<()> = User::transaction(&db, |db| {
            User::create(db, [("name", "ghost")])?;
            Err(Error::configuration("abort"))
        });
        assert!(result.is_err());
        assert_eq!(User::count(&db).unwrap(), 0);

        let created = User::transaction(&db, |db| User::create(db, [("name", "real")])).unwrap();
        assert!(created.is_persisted());
        assert_eq!(User::count(&db).unwrap(), 1);
    }

    #[test]
    fn test_destroy_and_pagination() {
        let db = db();
        for i in 0..5 {
            User::create(&db, [("name", format!("u{i}"))]).unwrap();
        }
        let page = User::paginate(&db, 2, 2).unwrap();
        assert_eq!(page.total(), 5);
        assert_eq!(page.items().len(), 2);
        assert_eq!(page.last_page(), 3);

        let simple = User::simple_paginate(&db, 2, 3).unwrap();
        assert_eq!(simple.items().len(), 1);
        assert!(!simple.has_more_pages());

        assert_eq!(User::destroy(&db, [1, 2]).unwrap(), 2);
        assert_eq!(User::pluck(&db, "name").unwrap().len(), 3);
    }
}
