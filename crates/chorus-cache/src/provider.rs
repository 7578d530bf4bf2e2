//! Cache manager that dispatches to the configured provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use chorus_core::config::cache::CacheConfig;
use chorus_core::error::AppError;
use chorus_core::result::AppResult;
use chorus_core::traits::cache::{CacheOp, CacheProvider};

/// Cache manager that wraps the configured cache provider.
#[derive(Debug, Clone)]
pub struct CacheManager {
    inner: Arc<dyn CacheProvider>,
    #[cfg(feature = "redis-backend")]
    redis: Option<crate::redis::RedisClient>,
}

impl CacheManager {
    /// Create a new cache manager from configuration.
    pub async fn new(config: &CacheConfig) -> AppResult<Self> {
        match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis cache provider");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                let provider = crate::redis::RedisCacheProvider::new(client.clone());
                Ok(Self {
                    inner: Arc::new(provider),
                    redis: Some(client),
                })
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory cache provider");
                let provider = crate::memory::MemoryCacheProvider::new(&config.memory);
                Ok(Self::from_provider(Arc::new(provider)))
            }
            other => Err(AppError::configuration(format!(
                "Unknown cache provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }

    /// Create a cache manager from an existing provider (for testing).
    pub fn from_provider(provider: Arc<dyn CacheProvider>) -> Self {
        Self {
            inner: provider,
            #[cfg(feature = "redis-backend")]
            redis: None,
        }
    }

    /// Get a reference to the inner provider.
    pub fn provider(&self) -> &dyn CacheProvider {
        self.inner.as_ref()
    }

    /// The Redis client when the Redis provider is active.
    #[cfg(feature = "redis-backend")]
    pub fn redis_client(&self) -> Option<&crate::redis::RedisClient> {
        self.redis.as_ref()
    }
}

#[async_trait]
impl CacheProvider for CacheManager {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> AppResult<u64> {
        self.inner.delete_many(keys).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.inner.exists(key).await
    }

    async fn get_del(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get_del(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> AppResult<Vec<String>> {
        self.inner.list_push_capped(key, value, max_len, ttl).await
    }

    async fn list_range(&self, key: &str) -> AppResult<Vec<String>> {
        self.inner.list_range(key).await
    }

    async fn list_remove(&self, key: &str, value: &str) -> AppResult<u64> {
        self.inner.list_remove(key, value).await
    }

    async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        self.inner.scan_keys(pattern).await
    }

    async fn apply_batch(&self, ops: Vec<CacheOp>) -> AppResult<()> {
        self.inner.apply_batch(ops).await
    }

    async fn counter_add(&self, key: &str, delta: i64, ttl: Duration) -> AppResult<i64> {
        self.inner.counter_add(key, delta, ttl).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    async fn flush_all(&self) -> AppResult<()> {
        self.inner.flush_all().await
    }
}
