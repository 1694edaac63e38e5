//! Create-once handle cache
//!
//! Registering the same metric twice is rejected by the registry, and
//! recording happens on the per-request hot path, so every handle a scope
//! hands out is memoized here. Lookups take a read lock only; creation takes
//! the write lock and re-checks before invoking the factory, so concurrent
//! first use of a key runs the factory exactly once.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};

/// Concurrent create-if-absent map from a key to a cloneable handle
pub struct HandleCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> HandleCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a cached handle without creating one
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        // A panic while holding the lock cannot leave the map half-written:
        // inserts are a single HashMap::insert after the factory returned.
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Return the cached handle for `key`, creating it with `factory` on first use
    ///
    /// The factory runs at most once per key for the lifetime of the cache,
    /// even when many threads miss on the same key at the same time.
    pub fn get_or_create<Q, F>(&self, key: &Q, factory: F) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(key) {
            return value;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have inserted between our read and write lock
        if let Some(value) = entries.get(key) {
            return value.clone();
        }

        let value = factory();
        entries.insert(key.to_owned(), value.clone());
        value
    }

    /// Number of cached handles
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no handles
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for HandleCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
