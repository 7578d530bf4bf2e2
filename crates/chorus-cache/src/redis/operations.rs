//! Redis cache provider implementation.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use tracing::debug;

use chorus_core::error::{AppError, ErrorKind};
use chorus_core::result::AppResult;
use chorus_core::traits::cache::{CacheOp, CacheProvider};

use super::client::RedisClient;

/// RPUSH + trim to the newest ARGV[2] entries + EXPIRE, returning the
/// trimmed entries.
static PUSH_CAPPED: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        redis.call('RPUSH', KEYS[1], ARGV[1])
        local len = redis.call('LLEN', KEYS[1])
        local max = tonumber(ARGV[2])
        local evicted = {}
        if len > max then
            evicted = redis.call('LRANGE', KEYS[1], 0, len - max - 1)
            redis.call('LTRIM', KEYS[1], len - max, -1)
        end
        redis.call('PEXPIRE', KEYS[1], ARGV[3])
        return evicted
        ",
    )
});

/// Applies one op per key. ARGV holds, per key in order, the op name
/// followed by its operands.
static APPLY_BATCH: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local i = 1
        for k = 1, #KEYS do
            local op = ARGV[i]
            if op == 'set' then
                redis.call('SET', KEYS[k], ARGV[i + 1], 'PX', ARGV[i + 2])
                i = i + 3
            elseif op == 'del' then
                redis.call('DEL', KEYS[k])
                i = i + 1
            elseif op == 'del_eq' then
                if redis.call('GET', KEYS[k]) == ARGV[i + 1] then
                    redis.call('DEL', KEYS[k])
                end
                i = i + 2
            else
                return redis.error_reply('unknown batch op ' .. tostring(op))
            end
        end
        return #KEYS
        ",
    )
});

/// INCRBY floored at zero. A zero counter is deleted, any other value gets
/// its TTL reset to ARGV[2] milliseconds.
static COUNTER_ADD: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local next = redis.call('INCRBY', KEYS[1], ARGV[1])
        if next <= 0 then
            redis.call('DEL', KEYS[1])
            return 0
        end
        redis.call('PEXPIRE', KEYS[1], ARGV[2])
        return next
        ",
    )
});

const SCAN_BATCH: usize = 200;

/// Redis-backed cache provider.
#[derive(Debug, Clone)]
pub struct RedisCacheProvider {
    client: RedisClient,
}

impl RedisCacheProvider {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    /// The underlying client, for opening pub/sub connections.
    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::Cache, format!("Redis error: {e}"), e)
    }

    fn millis(ttl: Duration) -> u64 {
        (ttl.as_millis() as u64).max(1)
    }
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let result: Option<String> = conn.get(&full_key).await.map_err(Self::map_err)?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let _: () = redis::cmd("SET")
            .arg(&full_key)
            .arg(value)
            .arg("PX")
            .arg(Self::millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let removed: i64 = conn.del(&full_key).await.map_err(Self::map_err)?;
        Ok(removed > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> AppResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let full_keys: Vec<String> = keys.iter().map(|k| self.client.prefixed_key(k)).collect();
        let mut conn = self.client.conn_mut();
        let removed: i64 = conn.del(&full_keys).await.map_err(Self::map_err)?;
        Ok(removed.max(0) as u64)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let result: bool = conn.exists(&full_key).await.map_err(Self::map_err)?;
        Ok(result)
    }

    async fn get_del(&self, key: &str) -> AppResult<Option<String>> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let result: Option<String> = redis::cmd("GETDEL")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(result)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let result: bool = redis::cmd("PEXPIRE")
            .arg(&full_key)
            .arg(Self::millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(result)
    }

    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> AppResult<Vec<String>> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let evicted: Vec<String> = PUSH_CAPPED
            .key(&full_key)
            .arg(value)
            .arg(max_len)
            .arg(Self::millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(evicted)
    }

    async fn list_range(&self, key: &str) -> AppResult<Vec<String>> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let items: Vec<String> = conn
            .lrange(&full_key, 0, -1)
            .await
            .map_err(Self::map_err)?;
        Ok(items)
    }

    async fn list_remove(&self, key: &str, value: &str) -> AppResult<u64> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let removed: i64 = conn
            .lrem(&full_key, 0, value)
            .await
            .map_err(Self::map_err)?;
        Ok(removed.max(0) as u64)
    }

    async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let full_pattern = self.client.prefixed_key(pattern);
        let mut conn = self.client.conn_mut();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_err)?;
            keys.extend(
                batch
                    .iter()
                    .map(|k| self.client.unprefixed_key(k).to_string()),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn apply_batch(&self, ops: Vec<CacheOp>) -> AppResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let count = ops.len();
        let mut invocation = APPLY_BATCH.prepare_invoke();
        for op in &ops {
            invocation.key(self.client.prefixed_key(op.key()));
            match op {
                CacheOp::Set { value, ttl, .. } => {
                    invocation.arg("set").arg(value).arg(Self::millis(*ttl));
                }
                CacheOp::Delete { .. } => {
                    invocation.arg("del");
                }
                CacheOp::DeleteIfEquals { expected, .. } => {
                    invocation.arg("del_eq").arg(expected);
                }
            }
        }

        let mut conn = self.client.conn_mut();
        let _: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        debug!(ops = count, "Applied cache batch");
        Ok(())
    }

    async fn counter_add(&self, key: &str, delta: i64, ttl: Duration) -> AppResult<i64> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let value: i64 = COUNTER_ADD
            .key(&full_key)
            .arg(delta)
            .arg(Self::millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(value)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }

    async fn flush_all(&self) -> AppResult<()> {
        // Only our prefix, never the whole server.
        let keys = self.scan_keys("*").await?;
        let removed = self.delete_many(&keys).await?;
        debug!(removed, "Flushed prefixed keys");
        Ok(())
    }
}
