//! Local resource store.

use std::num::NonZeroUsize;
use std::time::Instant;

use bytes::Bytes;
use lru::LruCache;

use crate::common::Id;

/// Maximum number of locally stored resources.
pub const MAX_VALUES: usize = 1000;

#[derive(Debug, Clone)]
/// A locally held resource.
pub struct ResourceEntry {
    value: Bytes,
    last_republished: Instant,
}

impl ResourceEntry {
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn last_republished(&self) -> Instant {
        self.last_republished
    }
}

#[derive(Debug)]
/// Bounded key/value store for resources this node holds, either its own or
/// replicated to it via STORE.
pub struct ResourceStore {
    entries: LruCache<Id, ResourceEntry>,
}

impl ResourceStore {
    pub fn new() -> Self {
        ResourceStore {
            entries: LruCache::new(NonZeroUsize::new(MAX_VALUES).expect("infallible")),
        }
    }

    /// Upsert a resource and stamp it as freshly (re)published.
    pub fn set(&mut self, key: Id, value: Bytes) {
        self.entries.put(
            key,
            ResourceEntry {
                value,
                last_republished: Instant::now(),
            },
        );
    }

    pub fn get(&mut self, key: &Id) -> Option<&Bytes> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Explicitly remove a resource. Returns `false` when the key is absent;
    /// absence is not an error.
    pub fn delete(&mut self, key: &Id) -> bool {
        self.entries.pop(key).is_some()
    }

    /// Reset the republish staleness of a key, if present.
    pub fn mark_republished(&mut self, key: &Id) {
        if let Some(entry) = self.entries.peek_mut(key) {
            entry.last_republished = Instant::now();
        }
    }

    /// Snapshot of all held resources, for republishing.
    pub fn snapshot(&self) -> Vec<(Id, Bytes)> {
        self.entries
            .iter()
            .map(|(key, entry)| (*key, entry.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let mut store = ResourceStore::new();
        let key = Id::derive("greeting");

        store.set(key, Bytes::from_static(b"hello"));

        assert_eq!(store.get(&key).map(|v| &v[..]), Some(&b"hello"[..]));
        assert_eq!(store.get(&Id::derive("other")), None);
    }

    #[test]
    fn set_updates_in_place() {
        let mut store = ResourceStore::new();
        let key = Id::derive("greeting");

        store.set(key, Bytes::from_static(b"hello"));
        store.set(key, Bytes::from_static(b"goodbye"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).map(|v| &v[..]), Some(&b"goodbye"[..]));
    }

    #[test]
    fn delete_is_explicit_and_reports_absence() {
        let mut store = ResourceStore::new();
        let key = Id::derive("greeting");

        assert!(!store.delete(&key));

        store.set(key, Bytes::from_static(b"hello"));

        assert!(store.delete(&key));
        assert!(!store.delete(&key));
        assert_eq!(store.get(&key), None);
    }

    #[test]
    fn snapshot_lists_everything() {
        let mut store = ResourceStore::new();

        store.set(Id::derive("a"), Bytes::from_static(b"1"));
        store.set(Id::derive("b"), Bytes::from_static(b"2"));

        let mut snapshot = store.snapshot();
        snapshot.sort();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&(Id::derive("a"), Bytes::from_static(b"1"))));
    }
}
