//! Cache store backend
//!
//! The warm cache lives in an external key-value store. [`CacheStore`] is the
//! narrow batched contract the alias cache needs from it; every call is one
//! round trip. [`MemoryStore`] is the in-process implementation used when no
//! Redis URL is configured and by tests; [`super::RedisStore`] talks to a
//! shared server. The memory store tracks per-key idle time the same way Redis
//! `OBJECT IDLETIME` does: reads and writes refresh the access clock, idle
//! queries do not.

use crate::types::CacheError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Batched key-value operations against the cache backend
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch values; output is aligned with `keys`
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;

    /// Upsert values, optionally expiring after `ttl`
    async fn set_many(
        &self,
        entries: Vec<(String, String)>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Write values only where the key is absent (`SET NX`)
    ///
    /// Each key is checked and written atomically, so concurrent writers
    /// cannot both succeed. Output is aligned with `entries`: `true` where
    /// this call created the key.
    async fn set_many_if_absent(
        &self,
        entries: Vec<(String, String)>,
        ttl: Option<Duration>,
    ) -> Result<Vec<bool>, CacheError>;

    /// Delete keys, returning how many existed
    async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError>;

    /// All live keys starting with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Time since last access per key; aligned with `keys`
    async fn idle_times(&self, keys: &[String]) -> Result<Vec<Option<Duration>>, CacheError>;

    /// Bytes currently used by the store
    async fn used_memory(&self) -> Result<u64, CacheError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    last_access: Instant,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredValue>>,
    /// Reported instead of the computed footprint when set
    memory_override: RwLock<Option<u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the value reported by `used_memory`
    pub async fn set_used_memory(&self, bytes: Option<u64>) {
        *self.memory_override.write().await = bytes;
    }

    /// Backdate a key's last access so it reports `idle` idle time
    pub async fn set_idle(&self, key: &str, idle: Duration) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = Instant::now().checked_sub(idle).unwrap_or(entry.last_access);
                true
            }
            None => false,
        }
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let values = keys
            .iter()
            .map(|key| {
                let expired = entries.get(key).is_some_and(|e| e.is_expired(now));
                if expired {
                    entries.remove(key);
                    return None;
                }
                entries.get_mut(key).map(|entry| {
                    entry.last_access = now;
                    entry.value.clone()
                })
            })
            .collect();

        Ok(values)
    }

    async fn set_many(
        &self,
        entries: Vec<(String, String)>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);
        let mut stored = self.entries.write().await;

        for (key, value) in entries {
            stored.insert(
                key,
                StoredValue {
                    value,
                    last_access: now,
                    expires_at,
                },
            );
        }

        Ok(())
    }

    async fn set_many_if_absent(
        &self,
        entries: Vec<(String, String)>,
        ttl: Option<Duration>,
    ) -> Result<Vec<bool>, CacheError> {
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);
        let mut stored = self.entries.write().await;

        Ok(entries
            .into_iter()
            .map(|(key, value)| {
                if stored.get(&key).is_some_and(|e| !e.is_expired(now)) {
                    return false;
                }
                stored.insert(
                    key,
                    StoredValue {
                        value,
                        last_access: now,
                        expires_at,
                    },
                );
                true
            })
            .collect())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        Ok(keys.iter().filter(|key| entries.remove(*key).is_some()).count())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| !e.is_expired(now));

        Ok(entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn idle_times(&self, keys: &[String]) -> Result<Vec<Option<Duration>>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|e| !e.is_expired(now))
                    .map(|e| now.saturating_duration_since(e.last_access))
            })
            .collect())
    }

    async fn used_memory(&self) -> Result<u64, CacheError> {
        if let Some(bytes) = *self.memory_override.read().await {
            return Ok(bytes);
        }

        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .map(|(key, entry)| (key.len() + entry.value.len()) as u64)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_many_is_aligned_with_keys() {
        let store = MemoryStore::new();
        store
            .set_many(vec![("a".into(), "1".into()), ("c".into(), "3".into())], None)
            .await
            .unwrap();

        let values = store.get_many(&keys(&["a", "b", "c"])).await.unwrap();
        assert_eq!(values, vec![Some("1".to_string()), None, Some("3".to_string())]);
    }

    #[tokio::test]
    async fn test_expired_entries_are_absent() {
        let store = MemoryStore::new();
        store
            .set_many(vec![("a".into(), "1".into())], Some(Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(store.get_many(&keys(&["a"])).await.unwrap(), vec![None]);
        assert!(store.idle_times(&keys(&["a"])).await.unwrap()[0].is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_if_absent_keeps_existing_values() {
        let store = MemoryStore::new();
        store.set_many(vec![("a".into(), "old".into())], None).await.unwrap();

        let created = store
            .set_many_if_absent(
                vec![("a".into(), "new".into()), ("b".into(), "2".into()), ("b".into(), "3".into())],
                None,
            )
            .await
            .unwrap();

        assert_eq!(created, vec![false, true, false]);
        let values = store.get_many(&keys(&["a", "b"])).await.unwrap();
        assert_eq!(values, vec![Some("old".to_string()), Some("2".to_string())]);
    }

    #[tokio::test]
    async fn test_set_if_absent_replaces_expired_values() {
        let store = MemoryStore::new();
        store
            .set_many(vec![("a".into(), "old".into())], Some(Duration::ZERO))
            .await
            .unwrap();

        let created = store
            .set_many_if_absent(vec![("a".into(), "new".into())], None)
            .await
            .unwrap();
        assert_eq!(created, vec![true]);
        assert_eq!(store.get_many(&keys(&["a"])).await.unwrap(), vec![Some("new".to_string())]);
    }

    #[tokio::test]
    async fn test_reads_refresh_idle_time() {
        let store = MemoryStore::new();
        store.set_many(vec![("a".into(), "1".into())], None).await.unwrap();
        assert!(store.set_idle("a", Duration::from_secs(5)).await);

        let idle = store.idle_times(&keys(&["a"])).await.unwrap();
        assert!(idle[0].unwrap() >= Duration::from_secs(5));

        store.get_many(&keys(&["a"])).await.unwrap();
        let idle = store.idle_times(&keys(&["a"])).await.unwrap();
        assert!(idle[0].unwrap() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_scan_prefix_and_delete() {
        let store = MemoryStore::new();
        store
            .set_many(
                vec![
                    ("cache:a".into(), "1".into()),
                    ("cache:b".into(), "2".into()),
                    ("alias:a".into(), "x".into()),
                ],
                None,
            )
            .await
            .unwrap();

        let mut scanned = store.scan_prefix("cache:").await.unwrap();
        scanned.sort();
        assert_eq!(scanned, keys(&["cache:a", "cache:b"]));

        let deleted = store.delete_many(&keys(&["cache:a", "cache:zzz"])).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_used_memory_override() {
        let store = MemoryStore::new();
        store.set_many(vec![("ab".into(), "cde".into())], None).await.unwrap();
        assert_eq!(store.used_memory().await.unwrap(), 5);

        store.set_used_memory(Some(1_000)).await;
        assert_eq!(store.used_memory().await.unwrap(), 1_000);
    }
}
