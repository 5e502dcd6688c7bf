//! In-process reply cache with optional LRU eviction.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::error::ConfabError;

use super::{CacheEntry, CacheSeed, ReplyCache, LEGACY_DEFAULT_SEED};

/// A shared, thread-safe in-memory cache.
#[derive(Clone)]
pub struct InMemoryCache {
    inner: Arc<RwLock<CacheInner>>,
}

struct CacheInner {
    entries: HashMap<(u64, String), Slot>,
    max_entries: Option<usize>,
    default_seed: u64,
}

struct Slot {
    entry: CacheEntry,
    last_accessed: Instant,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    /// Unbounded cache.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                entries: HashMap::new(),
                max_entries: None,
                default_seed: LEGACY_DEFAULT_SEED,
            })),
        }
    }

    /// Cache evicting the least recently used entry beyond `max_entries`.
    pub fn with_capacity(max_entries: usize) -> Self {
        let cache = Self::new();
        cache.write().max_entries = Some(max_entries);
        cache
    }

    pub fn with_default_seed(self, seed: u64) -> Self {
        self.write().default_seed = seed;
        self
    }

    /// Current number of entries across all namespaces.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReplyCache for InMemoryCache {
    fn get(&self, seed: CacheSeed, fingerprint: &str) -> Result<Option<CacheEntry>, ConfabError> {
        let mut inner = self.write();
        let Some(seed) = seed.resolve(inner.default_seed) else {
            return Ok(None);
        };
        Ok(inner
            .entries
            .get_mut(&(seed, fingerprint.to_string()))
            .map(|slot| {
                slot.last_accessed = Instant::now();
                slot.entry.clone()
            }))
    }

    fn put(&self, seed: CacheSeed, fingerprint: &str, entry: &CacheEntry) -> Result<(), ConfabError> {
        let mut inner = self.write();
        let Some(seed) = seed.resolve(inner.default_seed) else {
            return Ok(());
        };
        let key = (seed, fingerprint.to_string());

        let existing = inner.entries.get(&key).map(|slot| slot.entry.same_content(entry));
        if existing == Some(false) {
            tracing::warn!(seed, fingerprint, "overwriting cached reply with different content");
        }
        if let (None, Some(max)) = (existing, inner.max_entries) {
            if inner.entries.len() >= max {
                if let Some(lru_key) = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, slot)| slot.last_accessed)
                    .map(|(k, _)| k.clone())
                {
                    inner.entries.remove(&lru_key);
                }
            }
        }

        inner.entries.insert(
            key,
            Slot {
                entry: entry.clone(),
                last_accessed: Instant::now(),
            },
        );
        Ok(())
    }

    fn clear(&self, seed: CacheSeed) -> Result<(), ConfabError> {
        let mut inner = self.write();
        if let Some(seed) = seed.resolve(inner.default_seed) {
            inner.entries.retain(|(s, _), _| *s != seed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cost, Usage};

    fn entry(text: &str) -> CacheEntry {
        CacheEntry::new(text, Usage::new(3, 4), Cost::new(0.5))
    }

    #[test]
    fn disabled_seed_never_stores() {
        let cache = InMemoryCache::new();
        cache.put(CacheSeed::Disabled, "fp", &entry("x")).unwrap();
        assert!(cache.is_empty());
        assert!(cache.get(CacheSeed::Disabled, "fp").unwrap().is_none());
    }

    #[test]
    fn default_seed_shares_namespace_with_explicit_default_value() {
        let cache = InMemoryCache::new().with_default_seed(9);
        cache.put(CacheSeed::Default, "fp", &entry("x")).unwrap();
        assert!(cache.get(CacheSeed::Seed(9), "fp").unwrap().is_some());
        assert!(cache.get(CacheSeed::Seed(10), "fp").unwrap().is_none());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = InMemoryCache::with_capacity(2);
        cache.put(CacheSeed::Seed(1), "a", &entry("a")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.put(CacheSeed::Seed(1), "b", &entry("b")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.get(CacheSeed::Seed(1), "a").unwrap();
        cache.put(CacheSeed::Seed(1), "c", &entry("c")).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(CacheSeed::Seed(1), "b").unwrap().is_none());
        assert!(cache.get(CacheSeed::Seed(1), "a").unwrap().is_some());
    }

    #[test]
    fn clear_only_touches_one_namespace() {
        let cache = InMemoryCache::new();
        cache.put(CacheSeed::Seed(1), "fp", &entry("a")).unwrap();
        cache.put(CacheSeed::Seed(2), "fp", &entry("b")).unwrap();
        cache.clear(CacheSeed::Seed(1)).unwrap();
        assert!(cache.get(CacheSeed::Seed(1), "fp").unwrap().is_none());
        assert!(cache.get(CacheSeed::Seed(2), "fp").unwrap().is_some());
    }
}
