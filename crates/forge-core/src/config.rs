//! Connection configuration.
//!
//! A `DatabaseConfig` names one or more logical connections. Each connection
//! may carry a `read` override: reads are routed to it while writes stay on the
//! main settings (configuration-only read/write split, no load balancing).
//!
//! # Example
//!
//! ```
//! use forge_core::DatabaseConfig;
//!
//! let config = DatabaseConfig::from_json_str(r#"{
//!     "default": "main",
//!     "connections": {
//!         "main": { "driver": "sqlite", "database": ":memory:" }
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(config.default_connection().unwrap().driver, "sqlite");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// Settings for one logical connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver name: `mysql`, `sqlite` or `pgsql`.
    pub driver: String,
    /// Database name, or file path for SQLite (`:memory:` for in-memory).
    #[serde(default)]
    pub database: String,
    /// Server hostname.
    #[serde(default)]
    pub host: Option<String>,
    /// Server port.
    #[serde(default)]
    pub port: Option<u16>,
    /// User name.
    #[serde(default)]
    pub username: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Driver specific options.
    #[serde(default)]
    pub options: HashMap<String, String>,
    /// Overrides applied to the connection used for reads.
    #[serde(default)]
    pub read: Option<ReadOverride>,
}

/// Fields a read connection may override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadOverride {
    /// Replacement host.
    #[serde(default)]
    pub host: Option<String>,
    /// Replacement port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Replacement database / file.
    #[serde(default)]
    pub database: Option<String>,
}

impl ConnectionConfig {
    /// Create a configuration for `driver` and `database`.
    pub fn new(driver: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            database: database.into(),
            host: None,
            port: None,
            username: None,
            password: None,
            options: HashMap::new(),
            read: None,
        }
    }

    /// SQLite database at `path`.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new("sqlite", path)
    }

    /// In-memory SQLite database.
    pub fn memory() -> Self {
        Self::new("sqlite", ":memory:")
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set a driver option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Route reads to a different host/database.
    pub fn read(mut self, read: ReadOverride) -> Self {
        self.read = Some(read);
        self
    }

    /// Validate the driver name.
    pub fn dialect(&self) -> Result<Dialect> {
        Dialect::from_driver(&self.driver)
    }

    /// The effective settings for the read side, if a read override exists.
    pub fn read_config(&self) -> Option<ConnectionConfig> {
        let read = self.read.as_ref()?;
        let mut cfg = self.clone();
        cfg.read = None;
        if let Some(host) = &read.host {
            cfg.host = Some(host.clone());
        }
        if let Some(port) = read.port {
            cfg.port = Some(port);
        }
        if let Some(database) = &read.database {
            cfg.database.clone_from(database);
        }
        Some(cfg)
    }
}

/// Read-through cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether models that opt in are cached.
    #[serde(default)]
    pub enabled: bool,
    /// Entry lifetime in seconds; `None` keeps entries until invalidated.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: Some(3600),
        }
    }
}

/// All named connections plus the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Name of the default connection.
    pub default: String,
    /// Connections by name.
    pub connections: HashMap<String, ConnectionConfig>,
    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl DatabaseConfig {
    /// A configuration with a single connection named `name`.
    pub fn single(name: impl Into<String>, connection: ConnectionConfig) -> Self {
        let name = name.into();
        let mut connections = HashMap::new();
        connections.insert(name.clone(), connection);
        Self {
            default: name,
            connections,
            cache: CacheConfig::default(),
        }
    }

    /// Parse from JSON and validate every driver name.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Enable the cache.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Check that the default exists and every driver is supported.
    pub fn validate(&self) -> Result<()> {
        if !self.connections.contains_key(&self.default) {
            return Err(Error::configuration(format!(
                "default connection `{}` is not configured",
                self.default
            )));
        }
        for (name, cfg) in &self.connections {
            cfg.dialect().map_err(|e| {
                Error::configuration(format!("connection `{name}`: {e}"))
            })?;
        }
        Ok(())
    }

    /// Look up a connection by name.
    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig> {
        self.connections
            .get(name)
            .ok_or_else(|| Error::configuration(format!("connection `{name}` is not configured")))
    }

    /// The default connection.
    pub fn default_connection(&self) -> Result<&ConnectionConfig> {
        self.connection(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_driver_is_fatal() {
        let err = DatabaseConfig::from_json_str(
            r#"{"default": "x", "connections": {"x": {"driver": "oracle"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_missing_default() {
        let err = DatabaseConfig::from_json_str(r#"{"default": "x", "connections": {}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("default connection"));
    }

    #[test]
    fn test_read_override() {
        let cfg = ConnectionConfig::new("mysql", "app")
            .host("primary.db")
            .port(3306)
            .read(ReadOverride {
                host: Some("replica.db".to_string()),
                ..ReadOverride::default()
            });
        let read = cfg.read_config().unwrap();
        assert_eq!(read.host.as_deref(), Some("replica.db"));
        assert_eq!(read.port, Some(3306));
        assert_eq!(read.database, "app");
        assert!(ConnectionConfig::memory().read_config().is_none());
    }

    #[test]
    fn test_cache_defaults() {
        let config = DatabaseConfig::single("main", ConnectionConfig::memory());
        assert!(!config.cache.enabled);
        assert_eq!(config.default_connection().unwrap().database, ":memory:");
    }
}
