//! Redis connection management.

use redis::Client;
use redis::aio::{ConnectionManager, PubSub};
use tracing::info;

use chorus_core::config::cache::RedisCacheConfig;
use chorus_core::error::{AppError, ErrorKind};
use chorus_core::result::AppResult;

/// Redis client wrapper.
///
/// Commands go through a reconnecting [`ConnectionManager`]; pub/sub
/// subscribers get their own dedicated connection from [`Self::pubsub`] so
/// that subscription delivery never queues behind command traffic.
#[derive(Debug, Clone)]
pub struct RedisClient {
    client: Client,
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisClient {
    /// Create a new Redis client from configuration.
    pub async fn connect(config: &RedisCacheConfig) -> AppResult<Self> {
        info!(url = %mask_redis_url(&config.url), "Connecting to Redis");

        let client = Client::open(config.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to create Redis client", e)
        })?;

        let conn = ConnectionManager::new(client.clone()).await.map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to connect to Redis", e)
        })?;

        info!("Connected to Redis");
        Ok(Self {
            client,
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// A clone of the command connection manager.
    pub fn conn_mut(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Open a new dedicated pub/sub connection.
    pub async fn pubsub(&self) -> AppResult<PubSub> {
        self.client.get_async_pubsub().await.map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to open Redis pub/sub connection", e)
        })
    }

    /// Build a full key with the configured prefix.
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    /// Strip the configured prefix from a key returned by the server.
    pub fn unprefixed_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.key_prefix.as_str()).unwrap_or(key)
    }

    pub fn prefix(&self) -> &str {
        &self.key_prefix
    }
}

/// Mask the password in a Redis URL for logging.
pub fn mask_redis_url(url: &str) -> String {
    let Some(at_pos) = url.rfind('@') else {
        return url.to_string();
    };
    let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
    match url[..at_pos].rfind(':') {
        Some(colon_pos) if colon_pos >= scheme_end => {
            format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..])
        }
        _ => url.to_string(),
    }
}
