//! Redis-backed shared cache

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheKey};

/// Upper bound for opening the connection, retries included
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound for a single command round trip
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Networked cache where every entry written through one instance expires
/// after the same `ttl`
///
/// The connection is opened on first use. Until it succeeds, every read is a
/// miss and every write is dropped.
pub struct RedisCache {
    client: redis::Client,
    ttl: Duration,
    connection: OnceCell<ConnectionManager>,
}

impl RedisCache {
    /// Creates a cache for the server at `url` (e.g. `redis://127.0.0.1:6379/0`)
    ///
    /// Only the URL is validated here; no connection is attempted.
    pub fn new(url: &str, ttl: Duration) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            ttl,
            connection: OnceCell::new(),
        })
    }

    /// Expiry in whole seconds; redis rejects a zero expiry
    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        // No internal retries: the manager's backoff outlives CONNECT_TIMEOUT
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(0)
            .set_connection_timeout(CONNECT_TIMEOUT)
            .set_response_timeout(RESPONSE_TIMEOUT);

        self.connection
            .get_or_try_init(|| async move {
                let connect = ConnectionManager::new_with_config(self.client.clone(), config);
                match timeout(CONNECT_TIMEOUT, connect).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("no connection within {:?}", CONNECT_TIMEOUT)),
                }
            })
            .await
            .inspect_err(|e| warn!("Redis cache unreachable: {}", e))
            .ok()
            .cloned()
    }
}

#[async_trait::async_trait]
impl Cache for RedisCache {
    async fn add(&self, key: &CacheKey, value: Vec<u8>) {
        let Some(mut conn) = self.connection().await else {
            return;
        };

        let result: redis::RedisResult<()> =
            conn.set_ex(key.as_str(), value, self.ttl_secs()).await;
        if let Err(e) = result {
            warn!("Failed to write cache entry {}: {}", key, e);
        }
    }

    async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let mut conn = self.connection().await?;

        let result: redis::RedisResult<Option<Vec<u8>>> = conn.get(key.as_str()).await;
        match result {
            Ok(value) => value,
            Err(e) => {
                debug!("Cache read for {} failed, treating as miss: {}", key, e);
                None
            }
        }
    }

    async fn remove(&self, key: &CacheKey) {
        let Some(mut conn) = self.connection().await else {
            return;
        };

        let result: redis::RedisResult<()> = conn.del(key.as_str()).await;
        if let Err(e) = result {
            warn!("Failed to remove cache entry {}: {}", key, e);
        }
    }
}
