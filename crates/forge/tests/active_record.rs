use std::rc::Rc;

use forge::prelude::*;
use forge::{Dialect, SqliteConnection};

forge::model! {
    /// Application users.
    pub struct User;
    |def| def.fillable(&["name", "email", "votes", "admin"]).timestamps(true)
}

forge::model! {
    pub struct Role;
    |def| def.fillable(&["name"])
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> Db {
    init_tracing();
    let conn = Rc::new(SqliteConnection::open_in_memory().unwrap());
    let schema = Schema::new(&*conn);
    schema
        .create("users", |t| {
            t.id();
            t.string("name");
            t.string("email").nullable();
            t.integer("votes").default(0);
            t.boolean("admin").default(false);
            t.timestamps();
        })
        .unwrap();
    schema
        .create("roles", |t| {
            t.id();
            t.string("name");
        })
        .unwrap();
    schema
        .create("role_user", |t| {
            t.foreign_id("user_id").constrained().cascade_on_delete();
            t.foreign_id("role_id").constrained().cascade_on_delete();
            t.primary(&["user_id", "role_id"]);
        })
        .unwrap();
    Db::new(conn)
}

#[test]
fn placeholders_match_bindings_in_every_dialect() {
    let query = QueryBuilder::table("users")
        .where_("name", "Ada")
        .where_in("id", [1, 2, 3])
        .where_between("votes", 10, 20)
        .or_where("email", "ada@example.com")
        .limit(10);

    for dialect in [Dialect::Mysql, Dialect::Postgres, Dialect::Sqlite] {
        let (sql, bindings) = query.to_sql(dialect);
        assert_eq!(bindings.len(), 7);
        let placeholders = match dialect {
            Dialect::Postgres => (1..=bindings.len())
                .filter(|i| sql.contains(&format!("${i}")))
                .count(),
            _ => sql.matches('?').count(),
        };
        assert_eq!(placeholders, bindings.len(), "{dialect:?}: {sql}");
    }
}

#[test]
fn empty_in_lists_never_reach_the_database_as_invalid_sql() {
    let db = setup();
    User::create(&db, [("name", "Ada")]).unwrap();

    let none = User::query(&db).where_in("id", Vec::<i64>::new()).get().unwrap();
    assert!(none.is_empty());

    let all = User::query(&db)
        .where_not_in("id", Vec::<i64>::new())
        .get()
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn create_then_find_round_trips_attributes() {
    let db = setup();
    let user = User::create(
        &db,
        [
            ("name", Value::from("Ada")),
            ("email", Value::from("ada@example.com")),
            ("admin", Value::Bool(true)),
        ],
    )
    .unwrap();
    assert_eq!(user.key(), Value::Int(1));

    let found = User::find_or_fail(&db, 1).unwrap();
    for (column, value) in user.state().attributes() {
        assert_eq!(found.state().attributes().get(column), Some(value), "{column}");
    }
    assert_eq!(found.get_attribute("admin"), Value::Bool(true));
    assert_eq!(found.get_attribute("votes"), Value::Int(0));
    assert_eq!(found.get_attribute("created_at"), user.get_attribute("created_at"));
    assert!(matches!(found.get_attribute("created_at"), Value::DateTime(_)));

    assert!(User::find(&db, 42).unwrap().is_none());
    assert!(User::find_or_fail(&db, 42).unwrap_err().is_not_found());
}

#[test]
fn only_dirty_attributes_are_written() {
    let db = setup();
    User::create(&db, [("name", "Ada"), ("email", "ada@example.com")]).unwrap();

    let mut user = User::find_or_fail(&db, 1).unwrap();
    assert!(user.is_clean());
    user.set_attribute("name", "Ada").unwrap();
    assert!(user.is_dirty_key("name"));
    assert!(!user.is_dirty_key("email"));

    user.set_attribute("email", "countess@example.com").unwrap();
    user.save().unwrap();
    assert!(user.is_clean());

    // A clean model saves without touching the row.
    db.table("users")
        .where_("id", 1)
        .update(db.writer(), [("name", "Changed elsewhere")])
        .unwrap();
    user.save().unwrap();
    let stored = User::find_or_fail(&db, 1).unwrap();
    assert_eq!(stored.get_attribute("name"), Value::from("Changed elsewhere"));
    assert_eq!(stored.get_attribute("email"), Value::from("countess@example.com"));
}

#[test]
fn sync_attaches_and_detaches_the_difference() {
    let db = setup();
    let user = User::create(&db, [("name", "Ada")]).unwrap();
    for name in ["a", "b", "c", "d"] {
        Role::create(&db, [("name", name)]).unwrap();
    }

    let roles = user.belongs_to_many::<Role>();
    roles.attach([1, 2, 3], Vec::<(String, Value)>::new()).unwrap();

    let changes = roles.sync([2, 3, 4]).unwrap();
    assert_eq!(changes.attached, vec![Value::Int(4)]);
    assert_eq!(changes.detached, vec![Value::Int(1)]);
    assert_eq!(
        serde_json::to_value(&changes).unwrap(),
        serde_json::json!({"attached": [4], "detached": [1]})
    );

    let mut ids: Vec<i64> = roles
        .related_ids()
        .unwrap()
        .iter()
        .filter_map(Value::as_i64)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 3, 4]);

    let names: Vec<String> = roles
        .get()
        .unwrap()
        .iter()
        .map(|role| role.get_attribute("name").to_key_string())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(!names.contains(&"a".to_string()));
}

#[test]
fn transactions_roll_back_on_error() {
    let db = setup();
    let result: Result<()> = db.transaction(|db| {
        User::create(db, [("name", "Ghost")])?;
        Err(Error::configuration("abort"))
    });
    assert!(result.is_err());
    assert_eq!(User::count(&db).unwrap(), 0);
}

#[test]
fn paginate_reports_totals() {
    let db = setup();
    for i in 0..7 {
        User::create(&db, [("name", Value::from(format!("user{i}")))]).unwrap();
    }
    let page = User::paginate(&db, 3, 3).unwrap();
    assert_eq!(page.total(), 7);
    assert_eq!(page.last_page(), 3);
    assert_eq!(page.items().len(), 1);
}

#[test]
fn aggregates_over_a_union_see_both_sides() {
    let db = setup();
    for (name, votes) in [("Ada", 5), ("Grace", 7), ("Marie", 11)] {
        User::create(&db, [("name", Value::from(name)), ("votes", Value::from(votes))]).unwrap();
    }
    let union = db
        .table("users")
        .select(&["votes"])
        .where_("name", "Ada")
        .union_all(db.table("users").select(&["votes"]).where_("name", "Marie"));

    assert_eq!(union.sum(db.reader(), "votes").unwrap().as_i64(), Some(16));
    assert_eq!(union.max(db.reader(), "votes").unwrap().as_i64(), Some(11));
    assert_eq!(union.count(db.reader()).unwrap(), 2);
}

#[test]
fn find_by_key_matches_a_custom_key_column() {
    init_tracing();
    let conn = SqliteConnection::open_in_memory().unwrap();
    Schema::new(&conn)
        .create("settings", |t| {
            t.integer("id");
            t.string("key").primary();
            t.string("value");
        })
        .unwrap();
    let settings = QueryBuilder::table("settings");
    settings
        .insert(
            &conn,
            [
                ("id", Value::Int(7)),
                ("key", Value::from("theme")),
                ("value", Value::from("dark")),
            ],
        )
        .unwrap();

    let row = settings.find_by_key(&conn, "key", "theme").unwrap().unwrap();
    assert_eq!(row.value("value"), Some(&Value::from("dark")));
    assert!(settings.find_by_key(&conn, "key", "7").unwrap().is_none());
    assert!(settings.find(&conn, 7).unwrap().is_some());
}
