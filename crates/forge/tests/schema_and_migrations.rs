use std::cell::RefCell;
use std::rc::Rc;

use forge::prelude::*;
use forge::{Dialect, FnMigration, MigrationState, SqliteConnection};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn users_blueprint() -> Anvil {
    let mut t = Anvil::create("users");
    t.id();
    t.string("name");
    t.timestamps();
    t
}

#[test]
fn users_table_renders_for_every_dialect() {
    let blueprint = users_blueprint();

    assert_eq!(
        blueprint.to_sql(Dialect::Mysql).unwrap(),
        vec![
            "CREATE TABLE IF NOT EXISTS `users` (`id` BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY, \
             `name` VARCHAR(255) NOT NULL, `created_at` TIMESTAMP NULL, `updated_at` TIMESTAMP NULL)"
        ]
    );
    assert_eq!(
        blueprint.to_sql(Dialect::Postgres).unwrap(),
        vec![
            "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" BIGSERIAL NOT NULL PRIMARY KEY, \
             \"name\" VARCHAR(255) NOT NULL, \"created_at\" TIMESTAMP(0) WITHOUT TIME ZONE NULL, \
             \"updated_at\" TIMESTAMP(0) WITHOUT TIME ZONE NULL)"
        ]
    );
    assert_eq!(
        blueprint.to_sql(Dialect::Sqlite).unwrap(),
        vec![
            "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \
             \"name\" VARCHAR NOT NULL, \"created_at\" DATETIME, \"updated_at\" DATETIME)"
        ]
    );
}

#[test]
fn invalid_referential_action_is_rejected_before_sql() {
    let mut t = Anvil::create("posts");
    t.id();
    t.foreign_id("user_id").constrained().on_delete("explode");
    for dialect in [Dialect::Mysql, Dialect::Postgres, Dialect::Sqlite] {
        assert!(matches!(t.to_sql(dialect), Err(Error::Configuration(_))));
    }
}

#[test]
fn schema_facade_creates_and_inspects() {
    init_tracing();
    let conn = SqliteConnection::open_in_memory().unwrap();
    let schema = Schema::new(&conn);
    schema
        .create("users", |t| {
            t.id();
            t.string("name");
            t.timestamps();
        })
        .unwrap();

    assert!(schema.has_table("users").unwrap());
    assert!(schema.has_column("users", "created_at").unwrap());
    schema.drop_if_exists("users").unwrap();
    assert!(!schema.has_table("users").unwrap());
}

type Log = Rc<RefCell<Vec<String>>>;

fn table_migration(name: &'static str, table: &'static str, log: &Log) -> impl Migration {
    let up_log = Rc::clone(log);
    let down_log = Rc::clone(log);
    FnMigration::new(
        name,
        move |schema: &Schema<'_>| {
            up_log.borrow_mut().push(format!("up {name}"));
            schema.create(table, |t| {
                t.id();
                t.timestamps();
            })
        },
        move |schema: &Schema<'_>| {
            down_log.borrow_mut().push(format!("down {name}"));
            schema.drop_if_exists(table)
        },
    )
}

#[test]
fn migrate_is_idempotent() {
    init_tracing();
    let conn = SqliteConnection::open_in_memory().unwrap();
    let log = Log::default();
    let mut migrator = Migrator::new(&conn);
    migrator
        .add(table_migration("2024_01_01_000000_create_users", "users", &log))
        .unwrap();
    migrator
        .add(table_migration("2024_01_02_000000_create_posts", "posts", &log))
        .unwrap();

    let first = migrator.migrate().unwrap();
    assert_eq!(first.batch, Some(1));
    assert_eq!(first.succeeded.len(), 2);

    let second = migrator.migrate().unwrap();
    assert!(second.is_empty());
    assert_eq!(log.borrow().len(), 2);

    let statuses = migrator.status().unwrap();
    assert!(
        statuses
            .iter()
            .all(|s| s.state == MigrationState::Completed { batch: 1 })
    );
}

#[test]
fn rollback_one_batch_runs_down_in_reverse_order() {
    init_tracing();
    let conn = SqliteConnection::open_in_memory().unwrap();
    let log = Log::default();
    let mut migrator = Migrator::new(&conn);
    for (name, table) in [
        ("2024_01_01_000000_create_users", "users"),
        ("2024_01_02_000000_create_posts", "posts"),
        ("2024_01_03_000000_create_tags", "tags"),
    ] {
        migrator.add(table_migration(name, table, &log)).unwrap();
    }
    migrator.migrate().unwrap();
    log.borrow_mut().clear();

    let report = migrator.rollback(1).unwrap();
    assert!(report.is_success());
    assert_eq!(
        *log.borrow(),
        vec![
            "down 2024_01_03_000000_create_tags",
            "down 2024_01_02_000000_create_posts",
            "down 2024_01_01_000000_create_users",
        ]
    );

    let schema = Schema::new(&conn);
    for table in ["users", "posts", "tags"] {
        assert!(!schema.has_table(table).unwrap());
    }
    assert_eq!(migrator.pending().unwrap().len(), 3);
}

#[test]
fn sql_file_migrations_run_through_the_manager_connection() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("20240101000000_create_notes.up.sql"),
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("20240101000000_create_notes.down.sql"),
        "DROP TABLE notes;",
    )
    .unwrap();

    let manager = ConnectionManager::in_memory().unwrap();
    let conn = manager.default_connection().unwrap();
    let mut migrator = Migrator::new(conn.as_ref());
    migrator.load_dir(dir.path()).unwrap();
    let report = migrator.migrate().unwrap();
    assert_eq!(report.succeeded, vec!["20240101000000_create_notes"]);

    let db = manager.default_db().unwrap();
    db.table("notes")
        .insert(db.writer(), [("body", "hello")])
        .unwrap();
    assert_eq!(db.table("notes").count(db.reader()).unwrap(), 1);
}
