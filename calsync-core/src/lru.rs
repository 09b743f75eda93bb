//! Bounded per-process session state.
//!
//! UI-facing flows (edit state, event detail views) need short-lived
//! per-user scratch state. This is an owned, fixed-capacity store handed to
//! whoever needs it instead of a module-level map, so capacity is enforced
//! and the state is droppable with its owner.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

pub const DEFAULT_SESSION_CAPACITY: usize = 100;

/// Fixed-capacity key-value store with least-recently-used eviction.
pub struct SessionStore<V> {
    entries: Mutex<LruCache<String, V>>,
}

impl<V: Clone> SessionStore<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        SessionStore {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Insert or replace; evicts the least recently used entry at capacity.
    pub fn put(&self, key: &str, value: V) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key.to_string(), value);
        }
    }

    /// Fetch a value, marking it as most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries
            .lock()
            .ok()
            .and_then(|mut entries| entries.get(key).cloned())
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries
            .lock()
            .ok()
            .and_then(|mut entries| entries.pop(key))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for SessionStore<V> {
    fn default() -> Self {
        SessionStore::new(DEFAULT_SESSION_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let store: SessionStore<u32> = SessionStore::new(2);
        store.put("a", 1);
        store.put("b", 2);

        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(store.get("a"), Some(1));
        store.put("c", 3);

        assert_eq!(store.get("a"), Some(1));
        assert_eq!(store.get("b"), None);
        assert_eq!(store.get("c"), Some(3));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn put_replaces_without_growing() {
        let store: SessionStore<&str> = SessionStore::new(2);
        store.put("a", "one");
        store.put("a", "uno");
        assert_eq!(store.get("a"), Some("uno"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_drops_the_entry() {
        let store: SessionStore<u32> = SessionStore::new(4);
        store.put("a", 1);
        assert_eq!(store.remove("a"), Some(1));
        assert!(store.is_empty());
    }
}
