//! Map wrapper whose lookups never create entries.
//!
//! Orchestration state is keyed by ids coming from outside (router ids,
//! port ids). A lookup for an unknown id must report absence rather than
//! silently materialize a default entry, so `SyncMap` only creates entries
//! through explicitly named methods:
//!
//! - `get()` / `get_mut()` return `Option`
//! - `insert()` / `get_or_insert_with()` are the only ways to add a key

use std::collections::HashMap;
use std::hash::Hash;

/// A map that never creates entries implicitly.
///
/// # Example
///
/// ```
/// use fwaas_orch_common::SyncMap;
///
/// let mut map: SyncMap<String, u32> = SyncMap::new();
///
/// assert!(map.get(&"router-1".to_string()).is_none());
/// assert!(map.is_empty());
///
/// map.insert("router-1".to_string(), 3);
/// assert_eq!(map.get(&"router-1".to_string()), Some(&3));
/// ```
#[derive(Debug, Clone)]
pub struct SyncMap<K, V> {
    inner: HashMap<K, V>,
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
{
    /// Creates a new empty map.
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns true if the map contains the given key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns a reference to the value for the given key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Returns a mutable reference to the value for the given key.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    /// Inserts a key-value pair, returning the previous value if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    /// Removes a key, returning its value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    /// Gets the value for a key, inserting one built by `f` if absent.
    ///
    /// This is the one lookup that creates entries; call it only where
    /// creation is the intent.
    pub fn get_or_insert_with<F>(&mut self, key: K, f: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        self.inner.entry(key).or_insert_with(f)
    }
}

impl<K, V> Default for SyncMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_never_creates() {
        let mut map: SyncMap<String, Vec<String>> = SyncMap::new();

        assert!(map.get(&"router-1".to_string()).is_none());
        assert!(map.get_mut(&"router-1".to_string()).is_none());
        assert!(!map.contains_key(&"router-1".to_string()));
        assert!(map.is_empty());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut map: SyncMap<String, u32> = SyncMap::new();

        assert!(map.insert("port-1".to_string(), 1).is_none());
        assert_eq!(map.insert("port-1".to_string(), 2), Some(1));
        assert_eq!(map.len(), 1);

        assert_eq!(map.remove(&"port-1".to_string()), Some(2));
        assert!(map.is_empty());
    }

    #[test]
    fn test_get_or_insert_with_keeps_existing() {
        let mut map: SyncMap<String, u32> = SyncMap::new();

        *map.get_or_insert_with("router-1".to_string(), || 10) += 1;
        let value = map.get_or_insert_with("router-1".to_string(), || 100);

        assert_eq!(*value, 11);
        assert_eq!(map.len(), 1);
    }
}
