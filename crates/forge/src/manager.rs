//! Named connections built from a [`DatabaseConfig`].
//!
//! Connections open lazily on first use and are memoized per name, so every
//! `Db` handed out for the same name shares one driver handle. A connection
//! with a `read` override gets a second handle for reads.
//!
//! Only SQLite ships with the workspace. MySQL and PostgreSQL drivers are
//! supplied by the application through [`ConnectionManager::register_connector`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use forge_core::{Connection, ConnectionConfig, DatabaseConfig, Dialect, Error, Result};
use forge_model::{Cache, Db, MemoryCache};
use forge_sqlite::SqliteConnection;

/// Opens a driver connection for a config.
pub type Connector = Box<dyn Fn(&ConnectionConfig) -> Result<Rc<dyn Connection>>>;

/// Suffix of the memo key used for read handles.
const READ_SUFFIX: &str = "::read";

/// Lazily opened, memoized named connections.
pub struct ConnectionManager {
    config: DatabaseConfig,
    connectors: HashMap<Dialect, Connector>,
    connections: RefCell<HashMap<String, Rc<dyn Connection>>>,
    cache: Option<Rc<dyn Cache>>,
}

impl ConnectionManager {
    /// Validate `config` and register the built-in SQLite connector.
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let cache: Option<Rc<dyn Cache>> = if config.cache.enabled {
            Some(Rc::new(MemoryCache::from_config(&config.cache)))
        } else {
            None
        };
        let mut manager = Self {
            config,
            connectors: HashMap::new(),
            connections: RefCell::new(HashMap::new()),
            cache,
        };
        manager.register_connector(Dialect::Sqlite, |cfg| {
            Ok(Rc::new(SqliteConnection::from_config(cfg)?) as Rc<dyn Connection>)
        });
        Ok(manager)
    }

    /// Manager over one in-memory SQLite connection named `default`.
    pub fn in_memory() -> Result<Self> {
        Self::new(DatabaseConfig::single("default", ConnectionConfig::memory()))
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Install (or replace) the connector for a dialect.
    pub fn register_connector<F>(&mut self, dialect: Dialect, connector: F) -> &mut Self
    where
        F: Fn(&ConnectionConfig) -> Result<Rc<dyn Connection>> + 'static,
    {
        self.connectors.insert(dialect, Box::new(connector));
        self
    }

    /// The write connection for `name`, opening it on first use.
    pub fn connection(&self, name: &str) -> Result<Rc<dyn Connection>> {
        let cfg = self.config.connection(name)?;
        self.open_memoized(name.to_string(), name, cfg)
    }

    /// The read connection for `name`, when its config has a read override.
    pub fn read_connection(&self, name: &str) -> Result<Option<Rc<dyn Connection>>> {
        let Some(read_cfg) = self.config.connection(name)?.read_config() else {
            return Ok(None);
        };
        self.open_memoized(format!("{name}{READ_SUFFIX}"), name, &read_cfg)
            .map(Some)
    }

    /// The default connection.
    pub fn default_connection(&self) -> Result<Rc<dyn Connection>> {
        let name = self.config.default.clone();
        self.connection(&name)
    }

    /// A `Db` for `name`: write handle, read handle if configured, and the
    /// shared cache if caching is enabled.
    pub fn db(&self, name: &str) -> Result<Db> {
        let mut db = Db::new(self.connection(name)?);
        if let Some(read) = self.read_connection(name)? {
            db = db.with_read(read);
        }
        if let Some(cache) = &self.cache {
            db = db.with_cache(Rc::clone(cache));
        }
        Ok(db)
    }

    /// A `Db` for the default connection.
    pub fn default_db(&self) -> Result<Db> {
        let name = self.config.default.clone();
        self.db(&name)
    }

    /// Whether `name` has been opened.
    pub fn is_connected(&self, name: &str) -> bool {
        self.connections.borrow().contains_key(name)
    }

    /// Drop the memoized handles for `name`. Returns whether any existed.
    ///
    /// Outstanding `Db` values keep their handles alive until dropped.
    pub fn disconnect(&self, name: &str) -> bool {
        let mut connections = self.connections.borrow_mut();
        let write = connections.remove(name).is_some();
        let read = connections.remove(&format!("{name}{READ_SUFFIX}")).is_some();
        if write || read {
            tracing::debug!(connection = %name, "disconnected");
        }
        write || read
    }

    fn open_memoized(
        &self,
        key: String,
        name: &str,
        cfg: &ConnectionConfig,
    ) -> Result<Rc<dyn Connection>> {
        if let Some(existing) = self.connections.borrow().get(&key) {
            return Ok(Rc::clone(existing));
        }

        let dialect = cfg.dialect()?;
        let connector = self.connectors.get(&dialect).ok_or_else(|| {
            Error::configuration(format!(
                "connection `{name}`: no connector registered for driver `{}`",
                cfg.driver
            ))
        })?;
        tracing::info!(connection = %name, handle = %key, driver = %cfg.driver, "opening connection");
        let conn = connector(cfg)?;
        self.connections
            .borrow_mut()
            .insert(key, Rc::clone(&conn));
        Ok(conn)
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut open: Vec<String> = self.connections.borrow().keys().cloned().collect();
        open.sort();
        f.debug_struct("ConnectionManager")
            .field("default", &self.config.default)
            .field("open", &open)
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::{CacheConfig, ReadOverride};
    use std::cell::Cell;

    #[test]
    fn test_connections_are_memoized() {
        let manager = ConnectionManager::in_memory().unwrap();
        assert!(!manager.is_connected("default"));

        let first = manager.connection("default").unwrap();
        first
            .execute("CREATE TABLE notes (id INTEGER PRIMARY KEY)", &[])
            .unwrap();
        let second = manager.default_connection().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(manager.is_connected("default"));
        assert!(manager.read_connection("default").unwrap().is_none());

        assert!(manager.disconnect("default"));
        assert!(!manager.disconnect("default"));
    }

    #[test]
    fn test_unknown_connection_name() {
        let manager = ConnectionManager::in_memory().unwrap();
        assert!(matches!(
            manager.connection("replica"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_connector_for_driver() {
        let config = DatabaseConfig::single(
            "main",
            ConnectionConfig::new("pgsql", "app").host("localhost"),
        );
        let manager = ConnectionManager::new(config).unwrap();
        let err = manager.connection("main").err().unwrap();
        assert!(err.to_string().contains("no connector registered"));
    }

    #[test]
    fn test_registered_connector_is_used() {
        let config = DatabaseConfig::single("main", ConnectionConfig::new("mysql", "app"));
        let mut manager = ConnectionManager::new(config).unwrap();
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        manager.register_connector(Dialect::Mysql, move |_| {
            seen.set(seen.get() + 1);
            Ok(Rc::new(SqliteConnection::open_in_memory()?) as Rc<dyn Connection>)
        });
        manager.connection("main").unwrap();
        manager.connection("main").unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_db_routes_reads_and_shares_cache() {
        let dir = tempfile::tempdir().unwrap();
        let write_path = dir.path().join("write.db");
        let read_path = dir.path().join("read.db");
        let cfg = ConnectionConfig::sqlite(write_path.to_string_lossy()).read(ReadOverride {
            database: Some(read_path.to_string_lossy().into_owned()),
            ..ReadOverride::default()
        });
        let config = DatabaseConfig::single("main", cfg).with_cache(CacheConfig {
            enabled: true,
            ttl_secs: Some(60),
        });
        let manager = ConnectionManager::new(config).unwrap();

        let db = manager.db("main").unwrap();
        assert!(db.cache().is_some());
        let read = manager.read_connection("main").unwrap().unwrap();
        read.execute("CREATE TABLE marker (id INTEGER)", &[]).unwrap();

        let rows = db
            .reader()
            .query("SELECT name FROM sqlite_master WHERE name = 'marker'", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        let rows = db
            .writer()
            .query("SELECT name FROM sqlite_master WHERE name = 'marker'", &[])
            .unwrap();
        assert!(rows.is_empty());
    }
}
