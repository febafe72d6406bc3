//! Fixtures shared by the unit tests of this crate.

use std::cell::Cell;
use std::rc::Rc;

use forge_core::{Connection, Dialect, Result, Row, Value};
use forge_sqlite::SqliteConnection;

use crate::definition::Cast;
use crate::model::Model;
use crate::related::Related;
use crate::relations::Relation;
use crate::{Db, MemoryCache};

/// SQLite connection that counts the statements it runs.
pub struct CountingConnection {
    inner: SqliteConnection,
    pub queries: Cell<usize>,
    pub executes: Cell<usize>,
}

impl Connection for CountingConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.queries.set(self.queries.get() + 1);
        self.inner.query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.executes.set(self.executes.get() + 1);
        self.inner.execute(sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.executes.set(self.executes.get() + 1);
        self.inner.insert(sql, params)
    }

    fn begin(&self) -> Result<()> {
        self.inner.begin()
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }
}

const SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        country_id INTEGER,
        name TEXT,
        email TEXT,
        age INTEGER,
        settings TEXT,
        votes INTEGER NOT NULL DEFAULT 0,
        created_at TEXT,
        updated_at TEXT
    );
    CREATE TABLE posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        title TEXT
    );
    CREATE TABLE profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        bio TEXT
    );
    CREATE TABLE roles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT
    );
    CREATE TABLE role_user (
        user_id INTEGER NOT NULL,
        role_id INTEGER NOT NULL,
        granted_by TEXT,
        created_at TEXT,
        updated_at TEXT
    );
    CREATE TABLE countries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT
    );
    CREATE TABLE tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        label TEXT
    );
";

/// Counting connection with the fixture schema.
pub fn counting() -> Rc<CountingConnection> {
    let inner = SqliteConnection::open_in_memory().unwrap();
    inner.execute_batch(SCHEMA).unwrap();
    Rc::new(CountingConnection {
        inner,
        queries: Cell::new(0),
        executes: Cell::new(0),
    })
}

/// Database with the fixture schema and no cache.
pub fn db() -> Db {
    Db::new(counting())
}

/// Database with the fixture schema and a memory cache.
pub fn cached_db() -> (Db, Rc<CountingConnection>) {
    let conn = counting();
    let db = Db::new(conn.clone()).with_cache(Rc::new(MemoryCache::new()));
    (db, conn)
}

crate::model! {
    pub struct User;
    |def| def
        .fillable(&["name", "email", "age", "settings", "country_id", "votes"])
        .hidden(&["email"])
        .cast("age", Cast::Int)
        .cast("settings", Cast::Json)
        .mutator("name", |v| Value::Text(v.to_key_string().trim().to_string()))
        .accessor("display_name", |u, _| Value::Text(format!("@{}", u.get_raw("name").to_key_string())))
        .appends(&["display_name"])
        .scope("adults", |q, _| q.where_op("age", ">=", 18))
        .scope("older_than", |q, args| {
            q.where_op("age", ">", args.first().cloned().unwrap_or(Value::Int(0)))
        })
        .relation("posts", |u| Ok(Related::many(u.has_many::<Post>().get()?)))
        .relation("profile", |u| Ok(Related::one(u.has_one::<Profile>().first()?)))
        .timestamps(true)
}

crate::model! {
    pub struct Post;
    |def| def
        .fillable(&["title", "user_id"])
        .relation("author", |p| Ok(Related::one(p.belongs_to::<User>().first()?)))
}

crate::model! {
    pub struct Profile;
    |def| def.guarded(&["id"])
}

crate::model! {
    pub struct Role;
    |def| def.fillable(&["name"])
}

crate::model! {
    pub struct Country;
    |def| def.fillable(&["name"])
}

crate::model! {
    pub struct Tag;
    |def| def.fillable(&["label"]).cached(true)
}
