//! Relations between models.
//!
//! Each relation captures the parent's key value and builds its constrained
//! query once, at construction. Reads go through that query; the helpers on
//! [`Relation`] return a derived query and never modify the stored one.
//!
//! | Relation | Constraint |
//! |----------|------------|
//! | [`HasOne`] / [`HasMany`] | `related.fk = parent.key` |
//! | [`BelongsTo`] | `owner.key = child.fk` |
//! | [`BelongsToMany`] | `JOIN pivot ON pivot.related_fk = related.key WHERE pivot.parent_fk = parent.key` |
//! | [`HasManyThrough`] | `JOIN through ON through.key = related.second_key WHERE through.first_key = parent.key` |
//!
//! An unsaved parent (null key) constrains with an empty `IN`, so the
//! relation reads as empty instead of matching rows with a `NULL` key.

mod belongs_to;
mod belongs_to_many;
mod has_many_through;
mod has_one_or_many;

pub use belongs_to::BelongsTo;
pub use belongs_to_many::{BelongsToMany, SyncChanges};
pub use has_many_through::HasManyThrough;
pub use has_one_or_many::{HasMany, HasOne, HasOneOrMany};

use forge_core::{Result, Value};
use forge_query::Collection;

use crate::model::Model;
use crate::query::ModelQuery;

/// Behavior shared by every relation.
pub trait Relation {
    /// The related model.
    type Related: Model;

    /// What [`get_results`](Self::get_results) yields.
    type Output;

    /// The constrained query.
    fn query(&self) -> &ModelQuery<Self::Related>;

    /// Load the relation in its natural shape (one or many).
    fn get_results(&self) -> Result<Self::Output>;

    /// Every related model.
    fn get(&self) -> Result<Collection<Self::Related>> {
        self.query().get()
    }

    /// First related model.
    fn first(&self) -> Result<Option<Self::Related>> {
        self.query().first()
    }

    /// Number of related rows.
    fn count(&self) -> Result<i64> {
        self.query().count()
    }

    /// Whether any related row exists.
    fn exists(&self) -> Result<bool> {
        self.query().exists()
    }

    /// The relation query with extra constraints; the relation is unchanged.
    fn constrain<F>(&self, f: F) -> ModelQuery<Self::Related>
    where
        F: FnOnce(ModelQuery<Self::Related>) -> ModelQuery<Self::Related>,
    {
        f(self.query().clone())
    }

    /// `WHERE column = value` on top of the relation constraint.
    fn where_(&self, column: &str, value: impl Into<Value>) -> ModelQuery<Self::Related> {
        self.query().clone().where_(column, value)
    }

    /// `ORDER BY` on top of the relation constraint.
    fn order_by(&self, column: &str, direction: &str) -> ModelQuery<Self::Related> {
        self.query().clone().order_by(column, direction)
    }

    /// `LIMIT` on top of the relation constraint.
    fn limit(&self, n: u64) -> ModelQuery<Self::Related> {
        self.query().clone().limit(n)
    }
}

/// `column = key`, or an always-false constraint when the key is null.
pub(crate) fn constrain_key<M: Model>(query: ModelQuery<M>, column: &str, key: &Value) -> ModelQuery<M> {
    if key.is_null() {
        query.where_in(column, std::iter::empty::<Value>())
    } else {
        query.where_(column, key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Country, Post, Profile, Role, User, db};
    use forge_core::{Dialect, Error};

    #[test]
    fn test_has_many_constrains_and_creates() {
        let db = db();
        let user = User::create(&db, [("name", "Ada")]).unwrap();
        let other = User::create(&db, [("name", "Grace")]).unwrap();
        let posts = user.has_many::<Post>();
        posts.create([("title", "a")]).unwrap();
        posts
            .create_many([[("title", "b")], [("title", "c")]])
            .unwrap();
        other.has_many::<Post>().create([("title", "x")]).unwrap();

        assert_eq!(posts.count().unwrap(), 3);
        assert_eq!(posts.get_results().unwrap().len(), 3);
        assert_eq!(posts.where_("title", "b").count().unwrap(), 1);
        assert_eq!(posts.count().unwrap(), 3);

        let (sql, bindings) = posts.query().to_sql();
        assert_eq!(sql, r#"SELECT * FROM "posts" WHERE "posts"."user_id" = ?"#);
        assert_eq!(bindings, vec![Value::Int(1)]);

        let mut moved = Post::find_or_fail(&db, 4).unwrap();
        posts.save(&mut moved).unwrap();
        assert_eq!(posts.count().unwrap(), 4);
    }

    #[test]
    fn test_unsaved_parent_reads_empty() {
        let db = db();
        Post::create(&db, [("title", "orphan")]).unwrap();
        let user = User::make(&db);
        let posts = user.has_many::<Post>();
        assert_eq!(posts.count().unwrap(), 0);
        assert!(posts.create([("title", "x")]).is_err());
        let (sql, _) = posts.query().to_sql();
        assert!(sql.contains("1 = 0"));
    }

    #[test]
    fn test_has_one_first_or_create() {
        let db = db();
        let user = User::create(&db, [("name", "Ada")]).unwrap();
        let profile = user.has_one::<Profile>();
        assert!(profile.get_results().unwrap().is_none());
        let none = Vec::<(String, Value)>::new();
        let created = profile.first_or_create([("bio", "math")], none.clone()).unwrap();
        assert_eq!(created.get_raw("user_id"), user.key());
        let again = profile.first_or_create([("bio", "math")], none).unwrap();
        assert_eq!(created.key(), again.key());
        let updated = profile.update_or_create([("bio", "math")], [("bio", "poetry")]).unwrap();
        assert_eq!(updated.get_raw("bio"), Value::from("poetry"));
        assert_eq!(profile.get_results().unwrap().map(|p| p.key()), Some(created.key()));
    }

    #[test]
    fn test_belongs_to_associate_and_dissociate() {
        let db = db();
        let user = User::create(&db, [("name", "Ada")]).unwrap();
        let mut post = Post::create(&db, [("title", "notes")]).unwrap();
        assert!(post.belongs_to::<User>().get_results().unwrap().is_none());

        post.belongs_to::<User>().associate(&mut post, &user);
        post.save().unwrap();
        let owner = post.belongs_to::<User>().get_results().unwrap().unwrap();
        assert_eq!(owner.key(), user.key());

        post.belongs_to::<User>().dissociate(&mut post);
        assert!(post.get_raw("user_id").is_null());
        assert!(post.is_dirty_key("user_id"));
    }

    #[test]
    fn test_belongs_to_many_attach_detach_sync() {
        let db = db();
        let user = User::create(&db, [("name", "Ada")]).unwrap();
        for name in ["r1", "r2", "r3", "r4"] {
            Role::create(&db, [("name", name)]).unwrap();
        }
        let roles = user.belongs_to_many::<Role>().with_pivot(&["granted_by"]);
        assert_eq!(roles.pivot_table(), "role_user");

        roles.attach([1, 2, 3], [("granted_by", "root")]).unwrap();
        let loaded = roles.get_results().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].get_raw("pivot_granted_by"), Value::from("root"));
        assert_eq!(loaded[0].get_raw("pivot_user_id"), Value::Int(1));

        let changes = roles.sync([2, 3, 4]).unwrap();
        assert_eq!(changes.detached, vec![Value::Int(1)]);
        assert_eq!(changes.attached, vec![Value::Int(4)]);
        let mut ids: Vec<i64> = roles
            .related_ids()
            .unwrap()
            .iter()
            .filter_map(Value::as_i64)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![2, 3, 4]);

        let kept = roles.sync_without_detaching([1, 2]).unwrap();
        assert_eq!(kept.attached, vec![Value::Int(1)]);
        assert!(kept.detached.is_empty());

        assert_eq!(roles.update_existing_pivot(2, [("granted_by", "admin")]).unwrap(), 1);
        assert_eq!(roles.detach([1, 4]).unwrap(), 2);
        assert_eq!(roles.detach(Vec::<i64>::new()).unwrap(), 0);
        assert_eq!(roles.count().unwrap(), 2);
        assert_eq!(roles.detach_all().unwrap(), 2);
        assert_eq!(roles.count().unwrap(), 0);
    }

    #[test]
    fn test_belongs_to_many_timestamps_and_create() {
        let db = db();
        let user = User::create(&db, [("name", "Ada")]).unwrap();
        let roles = user.belongs_to_many::<Role>().with_timestamps();
        let role = roles.create([("name", "editor")], Vec::<(String, Value)>::new()).unwrap();
        let loaded = roles.first().unwrap().unwrap();
        assert_eq!(loaded.key(), role.key());
        assert!(!loaded.get_raw("pivot_created_at").is_null());
    }

    #[test]
    fn test_has_many_through() {
        let db = db();
        let country = Country::create(&db, [("name", "UK")]).unwrap();
        let elsewhere = Country::create(&db, [("name", "FR")]).unwrap();
        let ada = User::create(&db, [("name", "Ada"), ("country_id", "1")]).unwrap();
        let marie = User::create(&db, [("name", "Marie"), ("country_id", "2")]).unwrap();
        ada.has_many::<Post>().create([("title", "engine")]).unwrap();
        ada.has_many::<Post>().create([("title", "notes")]).unwrap();
        marie.has_many::<Post>().create([("title", "radium")]).unwrap();

        let posts = country.has_many_through::<Post, User>();
        assert_eq!(posts.through_table(), "users");
        let titles: Vec<Value> = posts
            .order_by("posts.title", "asc")
            .pluck("posts.title")
            .unwrap();
        assert_eq!(titles, vec![Value::from("engine"), Value::from("notes")]);
        assert_eq!(elsewhere.has_many_through::<Post, User>().count().unwrap(), 1);

        let (sql, _) = posts.query().builder().to_sql(Dialect::Postgres);
        assert_eq!(
            sql,
            r#"SELECT "posts".* FROM "posts" INNER JOIN "users" ON "users"."id" = "posts"."user_id" WHERE "users"."country_id" = $1"#
        );
    }

    #[test]
    fn test_unsaved_parent_cannot_attach() {
        let db = db();
        let user = User::make(&db);
        assert!(matches!(
            user.belongs_to_many::<Role>().attach([1], Vec::<(String, Value)>::new()),
            Err(Error::Configuration(_))
        ));
    }
}
