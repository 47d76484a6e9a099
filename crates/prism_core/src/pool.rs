//! Deduplicating, usage-counted resource pools.

use std::collections::HashMap;
use std::sync::Arc;

use slotmap::{Key, SlotMap};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

use crate::handle::{Binding, UsageTracker};

/// Errors from explicit pool operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Invalid {kind} handle")]
    InvalidHandle { kind: &'static str },

    #[error("{kind} '{path}' is still in use ({usage} references)")]
    InUse {
        kind: &'static str,
        path: String,
        usage: u32,
    },

    #[error("{kind} '{path}' is a built-in default and cannot be unloaded")]
    Pinned { kind: &'static str, path: String },
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Normalize a resource path for identity: forward slashes, ASCII lowercase.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").to_ascii_lowercase()
}

/// Content hash used to deduplicate loads.
pub fn path_hash(path: &str) -> u64 {
    xxh3_64(normalize_path(path).as_bytes())
}

struct PoolEntry<T> {
    path: String,
    hash: u64,
    usage: Arc<UsageTracker>,
    pinned: bool,
    value: T,
}

/// A pool of resources of one kind, addressed by generation-tagged handles
/// and deduplicated by [`path_hash`].
///
/// Usage never removes an entry on its own. [`ResourcePool::remove`] reclaims
/// an entry only when nothing uses it.
pub struct ResourcePool<K: Key, T> {
    kind: &'static str,
    entries: SlotMap<K, PoolEntry<T>>,
    by_hash: HashMap<u64, K>,
}

impl<K: Key, T> ResourcePool<K, T> {
    /// Create an empty pool. `kind` names the resource in errors and logs.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: SlotMap::with_key(),
            by_hash: HashMap::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Find the entry previously inserted under an equivalent path.
    pub fn find(&self, path: &str) -> Option<K> {
        self.by_hash
            .get(&path_hash(path))
            .copied()
            .filter(|&key| self.entries.contains_key(key))
    }

    /// Insert a new entry with zero usage.
    pub fn insert(&mut self, path: &str, value: T) -> K {
        self.insert_entry(path, value, false)
    }

    /// Insert a built-in default that [`ResourcePool::remove`] refuses to reclaim.
    pub fn insert_pinned(&mut self, path: &str, value: T) -> K {
        self.insert_entry(path, value, true)
    }

    fn insert_entry(&mut self, path: &str, value: T, pinned: bool) -> K {
        let hash = path_hash(path);
        debug_assert!(
            self.find(path).is_none(),
            "{} '{}' inserted twice",
            self.kind,
            path
        );

        let key = self.entries.insert(PoolEntry {
            path: path.to_string(),
            hash,
            usage: Arc::new(UsageTracker::new()),
            pinned,
            value,
        });
        self.by_hash.insert(hash, key);
        key
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(key)
    }

    /// Resolve a handle. Null, stale, and vacated handles resolve to `None`.
    pub fn get(&self, key: K) -> Option<&T> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.entries.get_mut(key).map(|entry| &mut entry.value)
    }

    pub fn path(&self, key: K) -> Option<&str> {
        self.entries.get(key).map(|entry| entry.path.as_str())
    }

    pub fn hash(&self, key: K) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.hash)
    }

    pub fn is_pinned(&self, key: K) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.pinned)
    }

    pub fn usage(&self, key: K) -> Option<u32> {
        self.entries.get(key).map(|entry| entry.usage.get())
    }

    /// Add one unit of usage. Returns the new count, or `None` for an invalid handle.
    pub fn increment_usage(&self, key: K) -> Option<u32> {
        self.entries.get(key).map(|entry| entry.usage.increment())
    }

    /// Remove one unit of usage, saturating at zero. The entry stays in the pool.
    pub fn decrement_usage(&self, key: K) -> Option<u32> {
        self.entries.get(key).map(|entry| entry.usage.decrement())
    }

    /// Take an owned unit of usage on the entry.
    pub fn acquire(&self, key: K) -> Option<Binding<K>> {
        self.entries
            .get(key)
            .map(|entry| Binding::new(key, Arc::clone(&entry.usage)))
    }

    /// Reclaim an unused, non-default entry and return its value.
    pub fn remove(&mut self, key: K) -> PoolResult<T> {
        let entry = self.entries.get(key).ok_or(PoolError::InvalidHandle {
            kind: self.kind,
        })?;

        if entry.pinned {
            return Err(PoolError::Pinned {
                kind: self.kind,
                path: entry.path.clone(),
            });
        }
        let usage = entry.usage.get();
        if usage > 0 {
            return Err(PoolError::InUse {
                kind: self.kind,
                path: entry.path.clone(),
                usage,
            });
        }

        let entry = self
            .entries
            .remove(key)
            .ok_or(PoolError::InvalidHandle { kind: self.kind })?;
        if self.by_hash.get(&entry.hash) == Some(&key) {
            self.by_hash.remove(&entry.hash);
        }
        log::debug!("Reclaimed {} '{}'", self.kind, entry.path);
        Ok(entry.value)
    }

    /// Remove every entry regardless of usage, for teardown.
    pub fn drain(&mut self) -> Vec<T> {
        self.by_hash.clear();
        self.entries.drain().map(|(_, entry)| entry.value).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.entries.iter().map(|(key, entry)| (key, &entry.value))
    }

    /// Source paths of every live entry.
    pub fn paths(&self) -> Vec<String> {
        self.entries
            .values()
            .map(|entry| entry.path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::TextureHandle;

    fn pool() -> ResourcePool<TextureHandle, u32> {
        ResourcePool::new("texture")
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(normalize_path("Data\\Textures\\Rock.PNG"), "data/textures/rock.png");
        assert_eq!(path_hash("a\\B.png"), path_hash("A/b.png"));
        assert_ne!(path_hash("a.png"), path_hash("b.png"));
    }

    #[test]
    fn test_find_deduplicates() {
        let mut pool = pool();
        let handle = pool.insert("tex/a.png", 7);

        assert_eq!(pool.find("TEX\\A.png"), Some(handle));
        assert_eq!(pool.find("tex/b.png"), None);
        assert_eq!(pool.get(handle), Some(&7));
        assert_eq!(pool.usage(handle), Some(0));
    }

    #[test]
    fn test_null_handle_resolves_to_none() {
        let pool = pool();
        assert!(pool.get(TextureHandle::null()).is_none());
        assert!(pool.usage(TextureHandle::null()).is_none());
        assert!(pool.acquire(TextureHandle::null()).is_none());
    }

    #[test]
    fn test_usage_is_explicit() {
        let mut pool = pool();
        let handle = pool.insert("a", 1);

        assert_eq!(pool.increment_usage(handle), Some(1));
        assert_eq!(pool.increment_usage(handle), Some(2));
        assert_eq!(pool.decrement_usage(handle), Some(1));
        assert_eq!(pool.decrement_usage(handle), Some(0));
        assert_eq!(pool.decrement_usage(handle), Some(0));
        // Dropping to zero never removes the entry
        assert!(pool.contains(handle));
    }

    #[test]
    fn test_remove_refuses_in_use_and_pinned() {
        let mut pool = pool();
        let used = pool.insert("used", 1);
        let pinned = pool.insert_pinned("@@base", 2);

        let binding = pool.acquire(used).unwrap();
        assert!(matches!(
            pool.remove(used),
            Err(PoolError::InUse { usage: 1, .. })
        ));
        assert!(matches!(pool.remove(pinned), Err(PoolError::Pinned { .. })));

        drop(binding);
        assert_eq!(pool.remove(used), Ok(1));
        assert!(pool.find("used").is_none());
        assert!(matches!(
            pool.remove(used),
            Err(PoolError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut pool = pool();
        let old = pool.insert("old", 1);
        pool.remove(old).unwrap();

        let new = pool.insert("new", 2);
        assert_ne!(old, new);
        assert!(pool.get(old).is_none());
        assert_eq!(pool.get(new), Some(&2));
    }

    #[test]
    fn test_paths_and_drain() {
        let mut pool = pool();
        pool.insert("a", 1);
        pool.insert_pinned("b", 2);

        let mut paths = pool.paths();
        paths.sort();
        assert_eq!(paths, vec!["a".to_string(), "b".to_string()]);

        let mut values = pool.drain();
        values.sort();
        assert_eq!(values, vec![1, 2]);
        assert!(pool.is_empty());
        assert!(pool.find("a").is_none());
    }
}
