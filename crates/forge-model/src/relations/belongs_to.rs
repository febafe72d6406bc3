//! `BelongsTo`: the child carries a foreign key to its owner.

use std::fmt;

use forge_core::{Result, Value};

use super::{Relation, constrain_key};
use crate::db::Db;
use crate::model::Model;
use crate::query::ModelQuery;

/// The owning row of a child model.
pub struct BelongsTo<R> {
    foreign_key: String,
    owner_key: String,
    child_key: Value,
    query: ModelQuery<R>,
}

impl<R: Model> BelongsTo<R> {
    pub(crate) fn new(db: &Db, foreign_key: &str, child_key: Value, owner_key: &str) -> Self {
        let qualified = R::definition().qualify(owner_key);
        let query = constrain_key(ModelQuery::new(db), &qualified, &child_key);
        Self {
            foreign_key: foreign_key.to_string(),
            owner_key: owner_key.to_string(),
            child_key,
            query,
        }
    }

    /// Foreign key column on the child.
    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    /// Referenced column on the owner.
    pub fn owner_key(&self) -> &str {
        &self.owner_key
    }

    /// The child's foreign key value at construction.
    pub fn child_key(&self) -> &Value {
        &self.child_key
    }

    /// Point `child` at `owner`. The child is not saved.
    pub fn associate<P: Model>(&self, child: &mut P, owner: &R) {
        child.set_raw(&self.foreign_key, owner.get_raw(&self.owner_key));
    }

    /// Clear the foreign key on `child`. The child is not saved.
    pub fn dissociate<P: Model>(&self, child: &mut P) {
        child.set_raw(&self.foreign_key, Value::Null);
    }
}

impl<R> fmt::Debug for BelongsTo<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BelongsTo")
            .field("foreign_key", &self.foreign_key)
            .field("owner_key", &self.owner_key)
            .field("child_key", &self.child_key)
            .finish_non_exhaustive()
    }
}

impl<R: Model> Relation for BelongsTo<R> {
    type Related = R;
    type Output = Option<R>;

    fn query(&self) -> &ModelQuery<R> {
        &self.query
    }

    fn get_results(&self) -> Result<Option<R>> {
        self.query.first()
    }
}
