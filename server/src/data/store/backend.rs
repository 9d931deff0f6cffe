//! State store backend trait definition

use std::time::Duration;

use async_trait::async_trait;

use super::error::StoreError;

/// State store backend trait
///
/// Defines the interface for state store implementations. Both the in-memory
/// and Redis backends implement this trait.
///
/// # Consistency Notes
///
/// Operations on individual keys are atomic, but the return values of some
/// operations (like `delete` and `exists`) may be stale in concurrent
/// scenarios. `put_if_absent` is the one operation callers rely on for
/// correctness (duplicate-submission detection), and is atomic on both
/// backends.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Get a value from the store
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Set a value in the store with optional TTL, overwriting any existing entry
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
    -> Result<(), StoreError>;

    /// Set a value only if the key is absent (atomic compare-and-set).
    ///
    /// Returns `true` if this call created the entry, `false` if the key
    /// already existed (in which case the existing value and remaining TTL
    /// are left untouched).
    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Delete a key from the store
    ///
    /// Returns `true` if the key existed before deletion, `false` otherwise.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Check if a key exists in the store
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomic increment with TTL (creates key if not exists)
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, StoreError>;

    /// Get the TTL remaining for a key
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// List keys matching a glob pattern (e.g. "cmd:*")
    ///
    /// Performance: O(n) for memory backend, uses SCAN for Redis
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Health check (validates connection)
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
