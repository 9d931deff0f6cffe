//! In-memory state store implementation using moka + dashmap
//!
//! Uses moka for the main store (TTL-bound entries, atomic `entry()` API for
//! `put_if_absent`) and dashmap for the atomic counters used by `incr`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::Expiry;
use moka::future::Cache;

use super::backend::StoreBackend;
use super::error::StoreError;
use crate::core::config::StateStoreConfig;

/// Store entry with data and metadata
#[derive(Clone)]
struct StoreEntry {
    data: Vec<u8>,
    ttl: Option<Duration>,
    created_at: Instant,
}

/// Per-entry expiry tracking for variable TTLs
struct VariableTtlExpiry;

impl Expiry<String, StoreEntry> for VariableTtlExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoreEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoreEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_read(
        &self,
        _key: &String,
        _value: &StoreEntry,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        duration_until_expiry
    }
}

/// Counter entry for atomic incr
struct CounterEntry {
    count: AtomicI64,
    expires_at: Instant,
}

/// In-memory state store
pub struct InMemoryStore {
    cache: Cache<String, StoreEntry>,
    counters: DashMap<String, CounterEntry>,
    cleanup_ops: AtomicU64,
}

impl InMemoryStore {
    /// Create a new in-memory store with the given configuration
    pub fn new(config: &StateStoreConfig) -> Self {
        let builder = Cache::builder()
            .max_capacity(config.max_entries)
            .initial_capacity((config.max_entries as usize / 4).min(10_000));

        let cache = builder.expire_after(VariableTtlExpiry).build();

        Self {
            cache,
            counters: DashMap::new(),
            cleanup_ops: AtomicU64::new(0),
        }
    }

    fn cleanup_expired_counters(&self) {
        let now = Instant::now();
        self.counters.retain(|_, entry| now < entry.expires_at);
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.cache.get(key).await.map(|entry| entry.data.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let entry = StoreEntry {
            data: value,
            ttl,
            created_at: Instant::now(),
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        // moka's `entry().or_insert_with` only runs the init future for the
        // first caller that reaches a given key; concurrent callers await
        // the same in-flight computation, giving compare-and-set semantics
        // without a separate lock.
        let entry = self
            .cache
            .entry(key.to_string())
            .or_insert_with(async move {
                StoreEntry {
                    data: value,
                    ttl,
                    created_at: Instant::now(),
                }
            })
            .await;

        Ok(entry.is_fresh())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.cache.contains_key(key);
        self.cache.invalidate(key).await;
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.cache.contains_key(key))
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, StoreError> {
        use dashmap::mapref::entry::Entry;

        let now = Instant::now();
        let ttl_duration = ttl.unwrap_or(Duration::from_secs(60));
        let expires_at = now + ttl_duration;

        let count = match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                if now >= counter.expires_at {
                    counter.count.store(1, Ordering::SeqCst);
                    counter.expires_at = expires_at;
                    1
                } else {
                    counter.count.fetch_add(1, Ordering::SeqCst) + 1
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CounterEntry {
                    count: AtomicI64::new(1),
                    expires_at,
                });
                1
            }
        };

        let ops = self.cleanup_ops.fetch_add(1, Ordering::Relaxed);
        if ops.is_multiple_of(256) {
            self.cleanup_expired_counters();
        }

        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        if let Some(entry) = self.counters.get(key) {
            let now = Instant::now();
            let remaining = entry.expires_at.saturating_duration_since(now);
            if remaining > Duration::ZERO {
                return Ok(Some(remaining));
            }
            return Ok(None);
        }

        if let Some(entry) = self.cache.get(key).await {
            if let Some(ttl) = entry.ttl {
                let elapsed = entry.created_at.elapsed();
                if let Some(remaining) = ttl.checked_sub(elapsed)
                    && remaining > Duration::ZERO
                {
                    return Ok(Some(remaining));
                }
                return Ok(None);
            }
            return Ok(None);
        }

        Ok(None)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .cache
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| (*k).clone())
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StateStoreConfig {
        StateStoreConfig {
            backend: crate::core::config::EngineBackendType::Memory,
            redis_url: None,
            max_entries: 1000,
            default_ttl: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = InMemoryStore::new(&test_config());
        store.set("key1", b"value1".to_vec(), None).await.unwrap();
        let result = store.get("key1").await.unwrap();
        assert_eq!(result, Some(b"value1".to_vec()));
    }

    #[tokio::test]
    async fn test_put_if_absent_first_wins() {
        let store = InMemoryStore::new(&test_config());

        let created = store
            .put_if_absent("key1", b"first".to_vec(), None)
            .await
            .unwrap();
        assert!(created);

        let created_again = store
            .put_if_absent("key1", b"second".to_vec(), None)
            .await
            .unwrap();
        assert!(!created_again);

        let value = store.get("key1").await.unwrap();
        assert_eq!(value, Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new(&test_config());
        store.set("key1", b"value1".to_vec(), None).await.unwrap();
        let deleted = store.delete("key1").await.unwrap();
        assert!(deleted);
        assert_eq!(store.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_atomic() {
        let store = InMemoryStore::new(&test_config());
        let ttl = Some(Duration::from_secs(60));
        assert_eq!(store.incr("counter", ttl).await.unwrap(), 1);
        assert_eq!(store.incr("counter", ttl).await.unwrap(), 2);
        assert_eq!(store.incr("counter", ttl).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let store = InMemoryStore::new(&test_config());
        store
            .set("key1", b"value1".to_vec(), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(store.exists("key1").await.unwrap());

        tokio::time::sleep(Duration::from_millis(100)).await;
        store.cache.run_pending_tasks().await;

        assert_eq!(store.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_pattern() {
        let store = InMemoryStore::new(&test_config());
        store.set("cmd:1", b"a".to_vec(), None).await.unwrap();
        store.set("cmd:2", b"b".to_vec(), None).await.unwrap();
        store.set("other:1", b"c".to_vec(), None).await.unwrap();

        let mut keys = store.keys("cmd:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["cmd:1".to_string(), "cmd:2".to_string()]);
    }

    #[tokio::test]
    async fn test_backend_name() {
        let store = InMemoryStore::new(&test_config());
        assert_eq!(store.backend_name(), "memory");
    }
}
