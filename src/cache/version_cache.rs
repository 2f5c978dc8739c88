//! Cache of latest-version and version-list lookups

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheKey};
use crate::catalog::types::{AppVersions, Version};
use crate::version::channel::Channel;

/// Catalog view over two cache slots
///
/// Latest-version results and version-list results live in separate slots,
/// so their keys never collide even though both use
/// `<spacePrefix>/<appSlug>/<channel>`.
#[derive(Clone)]
pub struct VersionCache {
    latest: Arc<dyn Cache>,
    list: Arc<dyn Cache>,
}

impl VersionCache {
    pub fn new(latest: Arc<dyn Cache>, list: Arc<dyn Cache>) -> Self {
        Self { latest, list }
    }

    pub fn key(prefix: &str, slug: &str, channel: Channel) -> CacheKey {
        CacheKey::new(format!("{}/{}/{}", prefix, slug, channel.as_str()))
    }

    pub async fn get_latest(&self, prefix: &str, slug: &str, channel: Channel) -> Option<Version> {
        read(&*self.latest, &Self::key(prefix, slug, channel)).await
    }

    /// Store a latest-version result, always without its storage identity
    pub async fn put_latest(&self, prefix: &str, slug: &str, channel: Channel, version: &Version) {
        let stripped = version.clone().without_storage_identity();
        write(&*self.latest, &Self::key(prefix, slug, channel), &stripped).await;
    }

    pub async fn get_versions(
        &self,
        prefix: &str,
        slug: &str,
        channel: Channel,
    ) -> Option<AppVersions> {
        read(&*self.list, &Self::key(prefix, slug, channel)).await
    }

    pub async fn put_versions(
        &self,
        prefix: &str,
        slug: &str,
        channel: Channel,
        versions: &AppVersions,
    ) {
        write(&*self.list, &Self::key(prefix, slug, channel), versions).await;
    }

    /// Drop every cached lookup of an app, e.g. after a publication
    pub async fn invalidate(&self, prefix: &str, slug: &str) {
        for channel in Channel::ALL {
            let key = Self::key(prefix, slug, channel);
            self.latest.remove(&key).await;
            self.list.remove(&key).await;
        }
        debug!("Invalidated cached versions of {}/{}", prefix, slug);
    }
}

/// Undecodable entries read as a miss; the caller recomputes and overwrites
async fn read<T: DeserializeOwned>(cache: &dyn Cache, key: &CacheKey) -> Option<T> {
    let data = cache.get(key).await?;
    match serde_json::from_slice(&data) {
        Ok(value) => {
            debug!("Cache hit for {}", key);
            Some(value)
        }
        Err(e) => {
            debug!("Discarding undecodable cache entry {}: {}", key, e);
            None
        }
    }
}

async fn write<T: Serialize>(cache: &dyn Cache, key: &CacheKey, value: &T) {
    match serde_json::to_vec(value) {
        Ok(data) => cache.add(key, data).await,
        Err(e) => warn!("Failed to serialize cache entry {}: {}", key, e),
    }
}
