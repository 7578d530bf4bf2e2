//! In-memory cache implementation using the moka crate.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::Expiry;
use moka::future::Cache;
use tokio::sync::Mutex;
use tracing::debug;

use chorus_core::config::cache::MemoryCacheConfig;
use chorus_core::error::{AppError, ErrorKind};
use chorus_core::result::AppResult;
use chorus_core::traits::cache::{CacheOp, CacheProvider, glob_match};

/// A string value with its own TTL.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    ttl: Duration,
}

/// Expires every entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Debug)]
struct ListEntry {
    items: VecDeque<String>,
    expires_at: Instant,
}

impl ListEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache provider using moka for strings and a DashMap for lists.
///
/// Writes are serialized through one lock so that [`CacheProvider::apply_batch`]
/// is observed as a single step by every other writer.
#[derive(Debug, Clone)]
pub struct MemoryCacheProvider {
    cache: Cache<String, CacheEntry>,
    lists: Arc<DashMap<String, ListEntry>>,
    write_lock: Arc<Mutex<()>>,
}

impl MemoryCacheProvider {
    /// Create a new in-memory cache from configuration.
    pub fn new(config: &MemoryCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            cache,
            lists: Arc::new(DashMap::new()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn insert(&self, key: &str, value: &str, ttl: Duration) {
        self.cache
            .insert(
                key.to_string(),
                CacheEntry {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
    }

    /// Drop a list if it has expired. Returns whether a live list remains.
    fn live_list(&self, key: &str, now: Instant) -> bool {
        self.lists.remove_if(key, |_, list| list.is_expired(now));
        self.lists.contains_key(key)
    }

    async fn remove_key(&self, key: &str) -> bool {
        let string_removed = self.cache.remove(key).await.is_some();
        let list_removed = self
            .lists
            .remove(key)
            .is_some_and(|(_, list)| !list.is_expired(Instant::now()));
        string_removed || list_removed
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        self.insert(key, value, ttl).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let _guard = self.write_lock.lock().await;
        Ok(self.remove_key(key).await)
    }

    async fn delete_many(&self, keys: &[String]) -> AppResult<u64> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0u64;
        for key in keys {
            if self.remove_key(key).await {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.cache.contains_key(key) || self.live_list(key, Instant::now()))
    }

    async fn get_del(&self, key: &str) -> AppResult<Option<String>> {
        let _guard = self.write_lock.lock().await;
        Ok(self.cache.remove(key).await.map(|entry| entry.value))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let _guard = self.write_lock.lock().await;
        if let Some(entry) = self.cache.get(key).await {
            self.insert(key, &entry.value, ttl).await;
            return Ok(true);
        }
        let now = Instant::now();
        if self.live_list(key, now) {
            if let Some(mut list) = self.lists.get_mut(key) {
                list.expires_at = now + ttl;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> AppResult<Vec<String>> {
        let _guard = self.write_lock.lock().await;
        let now = Instant::now();
        self.live_list(key, now);

        let mut list = self.lists.entry(key.to_string()).or_insert_with(|| ListEntry {
            items: VecDeque::new(),
            expires_at: now + ttl,
        });
        list.items.push_back(value.to_string());
        list.expires_at = now + ttl;

        let mut evicted = Vec::new();
        while list.items.len() > max_len {
            if let Some(oldest) = list.items.pop_front() {
                evicted.push(oldest);
            }
        }
        Ok(evicted)
    }

    async fn list_range(&self, key: &str) -> AppResult<Vec<String>> {
        if !self.live_list(key, Instant::now()) {
            return Ok(Vec::new());
        }
        Ok(self
            .lists
            .get(key)
            .map(|list| list.items.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_remove(&self, key: &str, value: &str) -> AppResult<u64> {
        let _guard = self.write_lock.lock().await;
        if !self.live_list(key, Instant::now()) {
            return Ok(0);
        }
        let mut removed = 0u64;
        if let Some(mut list) = self.lists.get_mut(key) {
            let before = list.items.len();
            list.items.retain(|item| item != value);
            removed = (before - list.items.len()) as u64;
        }
        // Redis drops a list once it is empty.
        self.lists.remove_if(key, |_, list| list.items.is_empty());
        Ok(removed)
    }

    async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .cache
            .iter()
            .map(|(key, _)| key.to_string())
            .filter(|key| glob_match(pattern, key))
            .collect();
        keys.extend(
            self.lists
                .iter()
                .filter(|entry| !entry.value().is_expired(now) && glob_match(pattern, entry.key()))
                .map(|entry| entry.key().clone()),
        );
        Ok(keys)
    }

    async fn apply_batch(&self, ops: Vec<CacheOp>) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let count = ops.len();
        for op in ops {
            match op {
                CacheOp::Set { key, value, ttl } => self.insert(&key, &value, ttl).await,
                CacheOp::Delete { key } => {
                    self.remove_key(&key).await;
                }
                CacheOp::DeleteIfEquals { key, expected } => {
                    let matches = self
                        .cache
                        .get(&key)
                        .await
                        .is_some_and(|entry| entry.value == expected);
                    if matches {
                        self.cache.remove(&key).await;
                    }
                }
            }
        }
        debug!(ops = count, "Applied cache batch");
        Ok(())
    }

    async fn counter_add(&self, key: &str, delta: i64, ttl: Duration) -> AppResult<i64> {
        let _guard = self.write_lock.lock().await;
        let current = match self.cache.get(key).await {
            Some(entry) => entry.value.parse::<i64>().map_err(|e| {
                AppError::with_source(
                    ErrorKind::Cache,
                    format!("Value at '{key}' is not a counter"),
                    e,
                )
            })?,
            None => 0,
        };
        let next = current.saturating_add(delta).max(0);
        if next == 0 {
            self.cache.remove(key).await;
        } else {
            self.insert(key, &next.to_string(), ttl).await;
        }
        Ok(next)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn flush_all(&self) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        self.cache.invalidate_all();
        self.lists.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_provider() -> MemoryCacheProvider {
        MemoryCacheProvider::new(&MemoryCacheConfig { max_capacity: 1000 })
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let provider = make_provider();
        provider
            .set("key1", "value1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(provider.get("key1").await.unwrap(), Some("value1".to_string()));
        assert!(provider.delete("key1").await.unwrap());
        assert!(!provider.delete("key1").await.unwrap());
        assert_eq!(provider.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let provider = make_provider();
        provider
            .set("short", "v", Duration::from_millis(50))
            .await
            .unwrap();
        provider
            .set("long", "v", Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(provider.get("short").await.unwrap(), None);
        assert_eq!(provider.get("long").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_get_del_is_single_use() {
        let provider = make_provider();
        provider
            .set("once", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(provider.get_del("once").await.unwrap(), Some("v".to_string()));
        assert_eq!(provider.get_del("once").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_push_capped_evicts_oldest() {
        let provider = make_provider();
        let ttl = Duration::from_secs(60);
        let mut evicted = Vec::new();
        for i in 1..=7 {
            evicted.extend(
                provider
                    .list_push_capped("l", &format!("t{i}"), 5, ttl)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(evicted, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(
            provider.list_range("l").await.unwrap(),
            vec!["t3", "t4", "t5", "t6", "t7"]
        );
    }

    #[tokio::test]
    async fn test_list_remove_drops_empty_list() {
        let provider = make_provider();
        let ttl = Duration::from_secs(60);
        provider.list_push_capped("l", "a", 5, ttl).await.unwrap();
        assert_eq!(provider.list_remove("l", "a").await.unwrap(), 1);
        assert!(!provider.exists("l").await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_batch_delete_if_equals() {
        let provider = make_provider();
        let ttl = Duration::from_secs(60);
        provider.set("a", "1", ttl).await.unwrap();
        provider.set("b", "theirs", ttl).await.unwrap();
        provider
            .apply_batch(vec![
                CacheOp::delete("a"),
                CacheOp::delete_if_equals("b", "mine"),
                CacheOp::set("c", "3", ttl),
            ])
            .await
            .unwrap();
        assert_eq!(provider.get("a").await.unwrap(), None);
        assert_eq!(provider.get("b").await.unwrap(), Some("theirs".to_string()));
        assert_eq!(provider.get("c").await.unwrap(), Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_scan_keys_matches_strings_and_lists() {
        let provider = make_provider();
        let ttl = Duration::from_secs(60);
        provider.set("sessions:details:1", "x", ttl).await.unwrap();
        provider.set("sessions:user:1", "x", ttl).await.unwrap();
        provider
            .list_push_capped("sessions:details:list", "x", 5, ttl)
            .await
            .unwrap();
        let mut keys = provider.scan_keys("sessions:details:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["sessions:details:1", "sessions:details:list"]);
    }

    #[tokio::test]
    async fn test_counter_add_floors_at_zero() {
        let provider = make_provider();
        let ttl = Duration::from_secs(60);
        assert_eq!(provider.counter_add("online:u", 1, ttl).await.unwrap(), 1);
        assert_eq!(provider.counter_add("online:u", 1, ttl).await.unwrap(), 2);
        assert_eq!(provider.counter_add("online:u", -1, ttl).await.unwrap(), 1);
        assert_eq!(provider.counter_add("online:u", -1, ttl).await.unwrap(), 0);
        assert!(!provider.exists("online:u").await.unwrap());
        assert_eq!(provider.counter_add("online:u", -1, ttl).await.unwrap(), 0);

        provider.set("text", "abc", ttl).await.unwrap();
        let err = provider.counter_add("text", 1, ttl).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cache);
    }

    #[tokio::test]
    async fn test_json_roundtrip() {
        let provider = make_provider();
        let data = serde_json::json!({"name": "test", "count": 42});
        provider
            .set_json("json_key", &data, Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<serde_json::Value> = provider.get_json("json_key").await.unwrap();
        assert_eq!(result, Some(data));
    }
}
