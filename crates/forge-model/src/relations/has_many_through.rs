//! `HasManyThrough`: distant rows reached across an intermediate table.
//!
//! For `Country -> User -> Post` the query is
//! `SELECT posts.* FROM posts INNER JOIN users ON users.id = posts.user_id
//! WHERE users.country_id = ?`.

use std::fmt;

use forge_core::{Result, Value};
use forge_query::Collection;

use super::{Relation, constrain_key};
use crate::db::Db;
use crate::model::Model;
use crate::query::ModelQuery;

/// Read-only relation across two foreign-key hops.
pub struct HasManyThrough<R> {
    through_table: String,
    first_key: String,
    second_key: String,
    parent_key: Value,
    query: ModelQuery<R>,
}

impl<R: Model> HasManyThrough<R> {
    /// `first_key` lives on the intermediate table and points at the
    /// parent; `second_key` lives on the related table and points at the
    /// intermediate row's `second_local_key`.
    pub(crate) fn new(
        db: &Db,
        parent_key: Value,
        through_table: &str,
        first_key: &str,
        second_key: &str,
        second_local_key: &str,
    ) -> Self {
        let related = R::definition();
        let all = format!("{}.*", related.table_name());
        let query = ModelQuery::new(db).select(&[all.as_str()]).join(
            through_table,
            &format!("{through_table}.{second_local_key}"),
            "=",
            &related.qualify(second_key),
        );
        let query = constrain_key(query, &format!("{through_table}.{first_key}"), &parent_key);
        Self {
            through_table: through_table.to_string(),
            first_key: first_key.to_string(),
            second_key: second_key.to_string(),
            parent_key,
            query,
        }
    }

    /// Intermediate table.
    pub fn through_table(&self) -> &str {
        &self.through_table
    }
}

impl<R> fmt::Debug for HasManyThrough<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HasManyThrough")
            .field("through_table", &self.through_table)
            .field("first_key", &self.first_key)
            .field("second_key", &self.second_key)
            .field("parent_key", &self.parent_key)
            .finish_non_exhaustive()
    }
}

impl<R: Model> Relation for HasManyThrough<R> {
    type Related = R;
    type Output = Collection<R>;

    fn query(&self) -> &ModelQuery<R> {
        &self.query
    }

    fn get_results(&self) -> Result<Collection<R>> {
        self.query.get()
    }
}
