//! Redis pub/sub transport for multi-process deployments.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::warn;

use chorus_cache::redis::RedisClient;
use chorus_core::error::{AppError, ErrorKind};
use chorus_core::result::AppResult;

use super::backend::FanoutBackend;

/// Publishes over the shared command connection and subscribes on a
/// dedicated pub/sub connection per subscription. Channel names carry the
/// cache key prefix.
#[derive(Debug, Clone)]
pub struct RedisFanoutBackend {
    client: RedisClient,
}

impl RedisFanoutBackend {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FanoutBackend for RedisFanoutBackend {
    async fn publish(&self, channel: &str, payload: String) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        redis::cmd("PUBLISH")
            .arg(self.client.prefixed_key(channel))
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis PUBLISH failed", e))?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, String>> {
        let mut pubsub = self.client.pubsub().await?;
        pubsub
            .subscribe(self.client.prefixed_key(channel))
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis SUBSCRIBE failed", e))?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(error = %e, "Dropping undecodable fanout payload");
                        None
                    }
                }
            });
        Ok(stream.boxed())
    }
}
