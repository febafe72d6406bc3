//! Read-through cache for model lookups.
//!
//! Models that opt in cache `all()` under `<table>:all` and `find(id)` under
//! `<table>:find:<id>`. Writes invalidate eagerly: a single-row save or
//! delete forgets the `:all` key and that row's `:find` key, bulk writes
//! forget every key under the table prefix.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use forge_core::{CacheConfig, Row};

/// Storage for cached result rows.
pub trait Cache {
    /// Cached rows for `key`, if present and fresh.
    fn get(&self, key: &str) -> Option<Vec<Row>>;

    /// Store rows under `key`; `ttl` of `None` uses the cache default.
    fn put(&self, key: &str, rows: Vec<Row>, ttl: Option<Duration>);

    /// Remove one key.
    fn forget(&self, key: &str);

    /// Remove every key starting with `prefix`.
    fn forget_prefix(&self, prefix: &str);

    /// Remove everything.
    fn flush(&self);
}

/// `<table>:all`
pub fn all_key(table: &str) -> String {
    format!("{table}:all")
}

/// `<table>:find:<id>`
pub fn find_key(table: &str, id: &str) -> String {
    format!("{table}:find:{id}")
}

/// `<table>:` prefix covering every key of a table.
pub fn table_prefix(table: &str) -> String {
    format!("{table}:")
}

#[derive(Debug)]
struct Entry {
    rows: Vec<Row>,
    expires_at: Option<Instant>,
}

/// In-process cache with optional expiry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RefCell<HashMap<String, Entry>>,
    default_ttl: Option<Duration>,
}

impl MemoryCache {
    /// Cache whose entries never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose entries expire after `ttl` unless `put` says otherwise.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RefCell::default(),
            default_ttl: Some(ttl),
        }
    }

    /// Cache configured from [`CacheConfig`].
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            entries: RefCell::default(),
            default_ttl: config.ttl_secs.map(Duration::from_secs),
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Whether `key` is stored and fresh.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<Row>> {
        let mut entries = self.entries.borrow_mut();
        let expired = match entries.get(key) {
            None => {
                tracing::trace!(key, "cache miss");
                return None;
            }
            Some(entry) => entry.expires_at.is_some_and(|at| Instant::now() >= at),
        };
        if expired {
            entries.remove(key);
            tracing::trace!(key, "cache entry expired");
            return None;
        }
        tracing::trace!(key, "cache hit");
        entries.get(key).map(|entry| entry.rows.clone())
    }

    fn put(&self, key: &str, rows: Vec<Row>, ttl: Option<Duration>) {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        self.entries
            .borrow_mut()
            .insert(key.to_string(), Entry { rows, expires_at });
    }

    fn forget(&self, key: &str) {
        if self.entries.borrow_mut().remove(key).is_some() {
            tracing::trace!(key, "cache key forgotten");
        }
    }

    fn forget_prefix(&self, prefix: &str) {
        self.entries
            .borrow_mut()
            .retain(|key, _| !key.starts_with(prefix));
        tracing::trace!(prefix, "cache prefix forgotten");
    }

    fn flush(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::Value;

    fn rows() -> Vec<Row> {
        vec![Row::from_pairs([("id", Value::Int(1))])]
    }

    #[test]
    fn test_put_get_forget() {
        let cache = MemoryCache::new();
        cache.put(&all_key("users"), rows(), None);
        cache.put(&find_key("users", "1"), rows(), None);
        cache.put(&all_key("posts"), rows(), None);
        assert_eq!(cache.get("users:all"), Some(rows()));

        cache.forget("users:all");
        assert!(!cache.contains("users:all"));

        cache.forget_prefix(&table_prefix("users"));
        assert!(!cache.contains("users:find:1"));
        assert!(cache.contains("posts:all"));

        cache.flush();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = MemoryCache::new();
        cache.put("k", rows(), Some(Duration::ZERO));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }
}
