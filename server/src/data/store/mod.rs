//! State store module (§4.B)
//!
//! Provides the durable, TTL-bound key/value primitive used to persist
//! [`crate::domain::command::CommandState`], with pluggable backends:
//! - In-memory (default) — moka + dashmap, single process
//! - Redis — `deadpool-redis`, durable and shared across replicas
//!
//! [`StateStoreService`] layers key namespacing (§4.B "Key namespacing") and
//! typed JSON encode/decode on top of the raw [`StoreBackend`] trait.

mod backend;
mod error;
mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

pub use backend::StoreBackend;
pub use error::StoreError;
use memory::InMemoryStore;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::config::{EngineBackendType, StateStoreConfig};

/// State store service: key-namespaced, TTL-bound, JSON-encoded key/value
/// storage with a secondary request-id index (§4.B).
pub struct StateStoreService {
    backend: Arc<dyn StoreBackend>,
    prefix: String,
    default_ttl: Duration,
}

impl std::fmt::Debug for StateStoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStoreService")
            .field("backend", &self.backend.backend_name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl StateStoreService {
    pub async fn init(config: &StateStoreConfig) -> Result<Self, StoreError> {
        Self::init_with_prefix(config, crate::core::constants::STATE_STORE_PREFIX).await
    }

    pub async fn init_with_prefix(
        config: &StateStoreConfig,
        prefix: &str,
    ) -> Result<Self, StoreError> {
        let backend: Arc<dyn StoreBackend> = match config.backend {
            EngineBackendType::Memory => {
                tracing::debug!("Initializing in-memory state store backend");
                Arc::new(InMemoryStore::new(config))
            }
            EngineBackendType::Redis => {
                let url = config.redis_url.as_ref().ok_or_else(|| {
                    StoreError::Config("redis_url required for Redis store backend".into())
                })?;
                Arc::new(redis::RedisStore::new(url).await?)
            }
        };

        Ok(Self {
            backend,
            prefix: prefix.to_string(),
            default_ttl: config.default_ttl,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    fn primary_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn request_id_key(&self, request_id: &str) -> String {
        format!("{}/request-id:{}", self.prefix, request_id)
    }

    fn resolve_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        Some(ttl.unwrap_or(self.default_ttl))
    }

    /// Fetch and decode a value, or `None` if absent or TTL-expired.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.backend.get(&self.primary_key(key)).await? {
            Some(raw) => {
                let value = serde_json::from_slice(&raw)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Fetch the raw bytes stored under `key`, with no JSON decode applied.
    /// Lets a caller with its own encode/decode choke point (e.g.
    /// [`crate::domain::command::serializer`]) own the wire format while
    /// still going through this store's namespacing and TTL handling.
    pub async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.backend.get(&self.primary_key(key)).await
    }

    /// Store already-encoded bytes under `key`, resetting its TTL. See
    /// [`Self::get_raw`].
    pub async fn put_raw(
        &self,
        key: &str,
        raw: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.backend
            .set(&self.primary_key(key), raw, self.resolve_ttl(ttl))
            .await
    }

    /// Overwrite (or create) an entry, resetting its TTL.
    pub async fn put<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.backend
            .set(&self.primary_key(key), raw, self.resolve_ttl(ttl))
            .await
    }

    /// Atomic create-if-absent. TTL only applies to a freshly created entry.
    pub async fn put_if_absent<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let raw = serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.backend
            .put_if_absent(&self.primary_key(key), raw, self.resolve_ttl(ttl))
            .await
    }

    /// Atomic create-if-absent over already-encoded bytes. See [`Self::get_raw`].
    pub async fn put_if_absent_raw(
        &self,
        key: &str,
        raw: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.backend
            .put_if_absent(&self.primary_key(key), raw, self.resolve_ttl(ttl))
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.backend.delete(&self.primary_key(key)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.backend.exists(&self.primary_key(key)).await
    }

    /// List user keys (prefix stripped) matching a glob pattern, e.g. `"*"`.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let namespaced = format!("{}:{}", self.prefix, pattern);
        let found = self.backend.keys(&namespaced).await?;
        let strip = format!("{}:", self.prefix);
        Ok(found
            .into_iter()
            .filter_map(|k| k.strip_prefix(&strip).map(str::to_string))
            .collect())
    }

    pub async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, StoreError> {
        self.backend
            .incr(&self.primary_key(key), self.resolve_ttl(ttl))
            .await
    }

    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.backend.ttl(&self.primary_key(key)).await
    }

    /// Record that `request_id` maps to the entry at `key` (a plain,
    /// un-namespaced user key, as passed to [`Self::put`]), for idempotent
    /// lookup via [`Self::find_by_request_id`]. Returns `true` if this call
    /// created the mapping (first submission); `false` if it already existed.
    pub async fn index_request_id(
        &self,
        request_id: &str,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.backend
            .put_if_absent(
                &self.request_id_key(request_id),
                self.primary_key(key).into_bytes(),
                self.resolve_ttl(ttl),
            )
            .await
    }

    /// Resolve a request id to its stored value via the secondary index.
    pub async fn find_by_request_id<T: DeserializeOwned>(
        &self,
        request_id: &str,
    ) -> Result<Option<T>, StoreError> {
        let Some(primary_key_raw) = self.backend.get(&self.request_id_key(request_id)).await?
        else {
            return Ok(None);
        };
        let primary_key = String::from_utf8(primary_key_raw)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        match self.backend.get(&primary_key).await? {
            Some(raw) => {
                let value = serde_json::from_slice(&raw)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.backend.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn test_config() -> StateStoreConfig {
        StateStoreConfig {
            backend: EngineBackendType::Memory,
            redis_url: None,
            max_entries: 1000,
            default_ttl: Duration::from_secs(60),
        }
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn put_get_roundtrip_is_namespaced() {
        let store = StateStoreService::init(&test_config()).await.unwrap();
        let widget = Widget {
            name: "gizmo".into(),
            count: 3,
        };
        store.put("w1", &widget, None).await.unwrap();

        let fetched: Option<Widget> = store.get("w1").await.unwrap();
        assert_eq!(fetched, Some(widget));
    }

    #[tokio::test]
    async fn put_if_absent_single_winner() {
        let store = StateStoreService::init(&test_config()).await.unwrap();
        let first = store.put_if_absent("k", &1u32, None).await.unwrap();
        let second = store.put_if_absent("k", &2u32, None).await.unwrap();
        assert!(first);
        assert!(!second);
        let value: Option<u32> = store.get("k").await.unwrap();
        assert_eq!(value, Some(1));
    }

    #[tokio::test]
    async fn request_id_index_resolves_to_primary_value() {
        let store = StateStoreService::init(&test_config()).await.unwrap();
        store.put("cmd-1", &"payload", None).await.unwrap();
        let created = store
            .index_request_id("req-abc", "cmd-1", None)
            .await
            .unwrap();
        assert!(created);

        let found: Option<String> = store.find_by_request_id("req-abc").await.unwrap();
        assert_eq!(found.as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn keys_strips_prefix() {
        let store = StateStoreService::init(&test_config()).await.unwrap();
        store.put("a", &1, None).await.unwrap();
        store.put("b", &2, None).await.unwrap();

        let mut keys = store.keys("*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
