//! Ordered result container.
//!
//! `Collection<T>` is what `get()` returns: rows from the query builder or
//! models from a model query. It derefs to a slice, so `len`, `iter`, `first`
//! and friends come for free; the inherent methods add the Laravel-style
//! conveniences on top.

use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Deref;

use forge_core::{Row, Value};

/// An ordered list of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    items: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Collection<T> {
    /// Wrap `items`.
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    /// Borrow every item.
    pub fn all(&self) -> &[T] {
        &self.items
    }

    /// Unwrap into the underlying vector.
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    /// Append an item.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Take the first item, dropping the rest.
    pub fn into_first(self) -> Option<T> {
        self.items.into_iter().next()
    }

    /// Transform every item.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Collection<U> {
        Collection::new(self.items.into_iter().map(f).collect())
    }

    /// Keep the items matching `predicate`.
    pub fn filter<F: FnMut(&T) -> bool>(self, mut predicate: F) -> Self {
        Self::new(self.items.into_iter().filter(|t| predicate(t)).collect())
    }

    /// First item matching `predicate`.
    pub fn find<F: FnMut(&T) -> bool>(&self, mut predicate: F) -> Option<&T> {
        self.items.iter().find(|t| predicate(t))
    }

    /// Project one value per item.
    pub fn pluck<U, F: FnMut(&T) -> U>(&self, f: F) -> Vec<U> {
        self.items.iter().map(f).collect()
    }

    /// Index items by a string key; later items win on duplicates.
    pub fn key_by<F: FnMut(&T) -> String>(self, mut key: F) -> BTreeMap<String, T> {
        self.items.into_iter().map(|t| (key(&t), t)).collect()
    }

    /// Group items by a string key, preserving order within each group.
    pub fn group_by<F: FnMut(&T) -> String>(self, mut key: F) -> BTreeMap<String, Vec<T>> {
        let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
        for item in self.items {
            groups.entry(key(&item)).or_default().push(item);
        }
        groups
    }

    /// Split into chunks of `size` items (the last may be shorter).
    pub fn chunk(self, size: usize) -> Vec<Collection<T>> {
        let size = size.max(1);
        let mut out = Vec::new();
        let mut iter = self.items.into_iter().peekable();
        while iter.peek().is_some() {
            out.push(Collection::new(iter.by_ref().take(size).collect()));
        }
        out
    }

    /// Sort in place with a comparator.
    pub fn sort_by<F: FnMut(&T, &T) -> std::cmp::Ordering>(mut self, compare: F) -> Self {
        self.items.sort_by(compare);
        self
    }

    /// Sum an `f64` projection.
    pub fn sum_by<F: FnMut(&T) -> f64>(&self, f: F) -> f64 {
        self.items.iter().map(f).sum()
    }
}

impl<T: Serialize> Collection<T> {
    /// Serialize to a JSON array.
    pub fn to_json(&self) -> forge_core::Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.items)?)
    }
}

impl Collection<Row> {
    /// Values of column `name`, `Null` where a row lacks it.
    pub fn pluck_column(&self, name: &str) -> Vec<Value> {
        self.items
            .iter()
            .map(|row| row.value(name).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

impl<T> Deref for Collection<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> From<Vec<T>> for Collection<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T> FromIterator<T> for Collection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for Collection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for Collection<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}
