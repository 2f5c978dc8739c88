//! Key/value cache abstraction
//!
//! Every backend implements the same three operations and none of them can
//! fail from the caller's point of view: an unreachable or erroring backend
//! reads as a miss and writes are dropped after logging.
//!
//! # Modules
//!
//! - [`memory`]: Bounded in-process LRU cache
//! - [`redis`]: Shared networked cache with a fixed per-entry expiry
//! - [`version_cache`]: Catalog-specific wrapper for latest/list results

pub mod memory;
pub mod redis;
pub mod version_cache;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::config::SlotConfig;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;
pub use self::version_cache::VersionCache;

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uniform cache contract shared by all backends
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    /// Store `value` under `key`, replacing any previous entry
    async fn add(&self, key: &CacheKey, value: Vec<u8>);

    /// Look up `key`; `None` on miss, expiry or backend failure
    async fn get(&self, key: &CacheKey) -> Option<Vec<u8>>;

    /// Drop `key`; removing an absent key is a no-op
    async fn remove(&self, key: &CacheKey);
}

/// Build the backend described by a cache slot configuration
pub fn from_slot_config(slot: &SlotConfig) -> Result<Arc<dyn Cache>, ::redis::RedisError> {
    match slot {
        SlotConfig::Memory { max_entries } => Ok(Arc::new(MemoryCache::new(*max_entries))),
        SlotConfig::Redis { url, ttl_secs } => Ok(Arc::new(RedisCache::new(
            url,
            Duration::from_secs(*ttl_secs),
        )?)),
    }
}
