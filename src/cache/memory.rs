//! Bounded in-process LRU cache

use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::debug;

use crate::cache::{Cache, CacheKey};

/// In-process cache evicting the least recently used entry once full
///
/// Entries are kept in recency order, oldest first. A `max_entries` of zero
/// means no limit: eviction is then left to the owner via [`Cache::remove`].
pub struct MemoryCache {
    max_entries: usize,
    entries: Mutex<IndexMap<CacheKey, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A poisoned lock still guards consistent data: every mutation below
    /// completes without panicking points in between.
    fn lock(&self) -> MutexGuard<'_, IndexMap<CacheKey, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Cache for MemoryCache {
    async fn add(&self, key: &CacheKey, value: Vec<u8>) {
        let mut entries = self.lock();
        entries.shift_remove(key);
        entries.insert(key.clone(), value);

        if self.max_entries > 0 {
            while entries.len() > self.max_entries {
                if let Some((evicted, _)) = entries.shift_remove_index(0) {
                    debug!("Evicted cache entry {}", evicted);
                }
            }
        }
    }

    async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let mut entries = self.lock();
        let index = entries.get_index_of(key)?;
        let last = entries.len() - 1;
        entries.move_index(index, last);
        entries.get_index(last).map(|(_, value)| value.clone())
    }

    async fn remove(&self, key: &CacheKey) {
        self.lock().shift_remove(key);
    }
}
