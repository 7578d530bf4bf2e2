//! Cache provider trait for pluggable caching backends.
//!
//! The cache holds the refresh-token store and the session mirror keys.
//! Values are strings (JSON where structured). Providers own key prefixing
//! and TTL enforcement.

use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// One step of an atomic multi-key update, see [`CacheProvider::apply_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    /// Write `value` under `key` with a TTL.
    Set {
        key: String,
        value: String,
        ttl: Duration,
    },
    /// Remove `key` unconditionally.
    Delete { key: String },
    /// Remove `key` only if it currently holds `expected`.
    DeleteIfEquals { key: String, expected: String },
}

impl CacheOp {
    pub fn set(key: impl Into<String>, value: impl Into<String>, ttl: Duration) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    pub fn delete_if_equals(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::DeleteIfEquals {
            key: key.into(),
            expected: expected.into(),
        }
    }

    /// The key this operation touches.
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Delete { key } | Self::DeleteIfEquals { key, .. } => key,
        }
    }
}

/// Trait for cache backends (Redis or in-memory).
#[async_trait]
pub trait CacheProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> AppResult<bool>;

    /// Delete several keys, returning how many existed.
    async fn delete_many(&self, keys: &[String]) -> AppResult<u64>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Atomically read and remove a key (GETDEL).
    ///
    /// Two concurrent callers on the same key never both observe the value.
    async fn get_del(&self, key: &str) -> AppResult<Option<String>>;

    /// Set the TTL on an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    /// Append `value` to the list at `key`, trim it to the newest `max_len`
    /// entries, and refresh the list TTL. Returns the entries trimmed off
    /// the front, oldest first.
    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> AppResult<Vec<String>>;

    /// Every entry of the list at `key`, oldest first.
    async fn list_range(&self, key: &str) -> AppResult<Vec<String>>;

    /// Remove every occurrence of `value` from the list at `key`.
    async fn list_remove(&self, key: &str, value: &str) -> AppResult<u64>;

    /// Keys matching a glob pattern (`*` only), without the provider prefix.
    async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>>;

    /// Apply every operation as one unit: either all are applied or none.
    async fn apply_batch(&self, ops: Vec<CacheOp>) -> AppResult<()>;

    /// Atomically add `delta` to the integer counter at `key` and return the
    /// new value. The counter never drops below zero and is removed when it
    /// reaches zero; otherwise its TTL is reset to `ttl`.
    async fn counter_add(&self, key: &str, delta: i64, ttl: Duration) -> AppResult<i64>;

    /// Get a typed value by deserializing from JSON.
    async fn get_json<T: serde::de::DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> AppResult<Option<T>>
    where
        Self: Sized,
    {
        match self.get(key).await? {
            Some(value) => {
                let parsed = serde_json::from_str(&value)?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Set a typed value by serializing to JSON.
    async fn set_json<T: serde::Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()>
    where
        Self: Sized,
    {
        let json = serde_json::to_string(value)?;
        self.set(key, &json, ttl).await
    }

    /// Check that the cache backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Flush all entries from the cache.
    async fn flush_all(&self) -> AppResult<()>;
}

/// Match `key` against a glob containing only `*` wildcards.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    let first = parts[0];
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];

    let last = parts[parts.len() - 1];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
