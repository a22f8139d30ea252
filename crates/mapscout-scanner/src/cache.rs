//! In-memory caches for extracted places and assembled results.
//!
//! Callers decide what is worth persisting; the scanner only writes to a
//! [`ResultCache`] when the assembled result is cacheable.

use mapscout_core::{Place, ResultSet};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Cache of detail results keyed by listing reference.
pub trait DetailCache: Send + Sync {
    /// Previously extracted place for a reference.
    fn get(&self, link: &str) -> Option<Place>;

    /// Remember a successfully extracted place.
    fn put(&self, link: &str, place: Place);
}

/// Cache of whole scan results keyed by query.
pub trait ResultCache: Send + Sync {
    /// Previously assembled result for a query key.
    fn get(&self, key: &str) -> Option<ResultSet>;

    /// Remember a complete result.
    fn put(&self, key: &str, result: ResultSet);
}

/// Shared in-process map usable as either cache.
#[derive(Debug)]
pub struct MemoryCache<V> {
    entries: Arc<RwLock<HashMap<String, V>>>,
}

impl<V> Clone for MemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryCache<V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is cached.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl<V: Clone> MemoryCache<V> {
    fn lookup(&self, key: &str) -> Option<V> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn store(&self, key: &str, value: V) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }
}

impl DetailCache for MemoryCache<Place> {
    fn get(&self, link: &str) -> Option<Place> {
        self.lookup(link)
    }

    fn put(&self, link: &str, place: Place) {
        self.store(link, place);
    }
}

impl ResultCache for MemoryCache<ResultSet> {
    fn get(&self, key: &str) -> Option<ResultSet> {
        self.lookup(key)
    }

    fn put(&self, key: &str, result: ResultSet) {
        self.store(key, result);
    }
}
