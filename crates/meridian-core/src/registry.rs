//! Keyed creation-or-lookup store.
//!
//! Long-lived shared resources (controller instances, connection managers)
//! are created once per key and handed out as `Arc`s afterwards. The store is
//! passed around explicitly rather than living in a global.
//!
//! # Example
//!
//! ```
//! use meridian_core::Registry;
//! use std::sync::Arc;
//!
//! let registry: Registry<&str, String> = Registry::new();
//! let first = registry.get_or_create("db", || Arc::new("primary".to_string()));
//! let second = registry.get_or_create("db", || Arc::new("replica".to_string()));
//!
//! assert!(Arc::ptr_eq(&first, &second));
//! assert_eq!(*second, "primary");
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Creation-or-lookup store keyed by `K`.
pub struct Registry<K, V: ?Sized> {
    entries: RwLock<HashMap<K, Arc<V>>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash,
    V: ?Sized,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the entry for `key`, creating it with `create` on first use.
    ///
    /// `create` runs at most once per key, even under concurrent callers.
    pub fn get_or_create<F>(&self, key: K, create: F) -> Arc<V>
    where
        F: FnOnce() -> Arc<V>,
    {
        if let Some(existing) = self.entries.read().get(&key) {
            return Arc::clone(existing);
        }
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(key).or_insert_with(create))
    }

    /// Returns the entry for `key`, if present.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.read().get(key).cloned()
    }

    /// Inserts or replaces an entry, returning the previous one.
    pub fn insert(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        self.entries.write().insert(key, value)
    }

    /// Removes an entry.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.entries.write().remove(key)
    }

    /// Returns `true` if `key` has an entry.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K: Eq + Hash, V: ?Sized> Default for Registry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: ?Sized> fmt::Debug for Registry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("Registry")
            .field("keys", &entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Fixed(&'static str);

    impl Named for Fixed {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_get_or_create_runs_once() {
        let registry: Registry<String, usize> = Registry::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = registry.get_or_create("k".to_string(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Arc::new(5)
            });
            assert_eq!(*value, 5);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_trait_objects() {
        let registry: Registry<u32, dyn Named> = Registry::new();
        registry.get_or_create(1, || Arc::new(Fixed("one")));
        assert_eq!(registry.get(&1).map(|n| n.name().to_string()), Some("one".into()));
        assert!(registry.get(&2).is_none());
    }

    #[test]
    fn test_insert_and_remove() {
        let registry: Registry<&str, i32> = Registry::default();
        assert!(registry.is_empty());
        assert!(registry.insert("a", Arc::new(1)).is_none());
        assert_eq!(registry.insert("a", Arc::new(2)).as_deref(), Some(&1));
        assert!(registry.contains(&"a"));
        assert_eq!(registry.remove(&"a").as_deref(), Some(&2));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let registry = Arc::new(Registry::<u8, AtomicUsize>::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .get_or_create(0, || Arc::new(AtomicUsize::new(0)))
                        .fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.get(&0).unwrap().load(Ordering::SeqCst), 8);
    }
}
