//! `HasOne` and `HasMany`: the related table carries a foreign key to the
//! parent.

use std::fmt;
use std::ops::Deref;

use forge_core::{Error, Result, Value};
use forge_query::Collection;

use super::{Relation, constrain_key};
use crate::db::Db;
use crate::model::{IntoAttributes, Model};
use crate::query::ModelQuery;

/// State and write helpers shared by [`HasOne`] and [`HasMany`].
pub struct HasOneOrMany<R> {
    db: Db,
    foreign_key: String,
    parent_key: Value,
    query: ModelQuery<R>,
}

impl<R: Model> HasOneOrMany<R> {
    fn new(db: &Db, foreign_key: &str, parent_key: Value) -> Self {
        let qualified = R::definition().qualify(foreign_key);
        let query = constrain_key(ModelQuery::new(db), &qualified, &parent_key);
        Self {
            db: db.clone(),
            foreign_key: foreign_key.to_string(),
            parent_key,
            query,
        }
    }

    /// Foreign key column on the related table.
    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    /// The parent's key value.
    pub fn parent_key(&self) -> &Value {
        &self.parent_key
    }

    fn require_parent(&self) -> Result<()> {
        if self.parent_key.is_null() {
            return Err(Error::configuration(format!(
                "cannot attach {} to a parent that has not been saved",
                R::definition().name()
            )));
        }
        Ok(())
    }

    /// An unsaved related model with the foreign key set.
    pub fn make(&self, attributes: impl IntoAttributes) -> Result<R> {
        self.require_parent()?;
        let mut model = R::new_with(&self.db, attributes)?;
        model.set_raw(&self.foreign_key, self.parent_key.clone());
        Ok(model)
    }

    /// Create and save a related model.
    pub fn create(&self, attributes: impl IntoAttributes) -> Result<R> {
        let mut model = self.make(attributes)?;
        model.save()?;
        Ok(model)
    }

    /// Create several related models.
    pub fn create_many<I, A>(&self, records: I) -> Result<Vec<R>>
    where
        I: IntoIterator<Item = A>,
        A: IntoAttributes,
    {
        records.into_iter().map(|attrs| self.create(attrs)).collect()
    }

    /// Point `model` at the parent and save it.
    pub fn save(&self, model: &mut R) -> Result<()> {
        self.require_parent()?;
        model.set_raw(&self.foreign_key, self.parent_key.clone());
        model.save()
    }

    /// [`save`](Self::save) each model.
    pub fn save_many(&self, models: &mut [R]) -> Result<()> {
        models.iter_mut().try_for_each(|model| self.save(model))
    }

    /// First related model matching `search`, or a new one created from
    /// `search` and `extra`.
    pub fn first_or_create(
        &self,
        search: impl IntoAttributes,
        extra: impl IntoAttributes,
    ) -> Result<R> {
        let search = search.into_attributes();
        let query = search
            .iter()
            .fold(self.query.clone(), |q, (k, v)| q.where_(k, v.clone()));
        if let Some(found) = query.first()? {
            return Ok(found);
        }
        let mut model = self.make(search)?;
        model.fill(extra)?;
        model.save()?;
        Ok(model)
    }

    /// Update the related model matching `search`, or create it.
    pub fn update_or_create(
        &self,
        search: impl IntoAttributes,
        values: impl IntoAttributes,
    ) -> Result<R> {
        let search = search.into_attributes();
        let query = search
            .iter()
            .fold(self.query.clone(), |q, (k, v)| q.where_(k, v.clone()));
        let mut model = match query.first()? {
            Some(found) => found,
            None => self.make(search)?,
        };
        model.fill(values)?;
        model.save()?;
        Ok(model)
    }

    /// Bulk UPDATE of every related row.
    pub fn update(&self, values: impl IntoAttributes) -> Result<u64> {
        self.query.update(values.into_attributes())
    }
}

impl<R> fmt::Debug for HasOneOrMany<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HasOneOrMany")
            .field("foreign_key", &self.foreign_key)
            .field("parent_key", &self.parent_key)
            .finish_non_exhaustive()
    }
}

/// At most one related row.
#[derive(Debug)]
pub struct HasOne<R>(HasOneOrMany<R>);

impl<R: Model> HasOne<R> {
    pub(crate) fn new(db: &Db, foreign_key: &str, parent_key: Value) -> Self {
        Self(HasOneOrMany::new(db, foreign_key, parent_key))
    }
}

impl<R> Deref for HasOne<R> {
    type Target = HasOneOrMany<R>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<R: Model> Relation for HasOne<R> {
    type Related = R;
    type Output = Option<R>;

    fn query(&self) -> &ModelQuery<R> {
        &self.0.query
    }

    fn get_results(&self) -> Result<Option<R>> {
        self.0.query.first()
    }
}

/// Any number of related rows.
#[derive(Debug)]
pub struct HasMany<R>(HasOneOrMany<R>);

impl<R: Model> HasMany<R> {
    pub(crate) fn new(db: &Db, foreign_key: &str, parent_key: Value) -> Self {
        Self(HasOneOrMany::new(db, foreign_key, parent_key))
    }
}

impl<R> Deref for HasMany<R> {
    type Target = HasOneOrMany<R>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<R: Model> Relation for HasMany<R> {
    type Related = R;
    type Output = Collection<R>;

    fn query(&self) -> &ModelQuery<R> {
        &self.0.query
    }

    fn get_results(&self) -> Result<Collection<R>> {
        self.0.query.get()
    }
}
