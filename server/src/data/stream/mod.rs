//! Stream module
//!
//! Provides the durable, at-least-once message stream with pluggable backends:
//! - In-memory (default) - single process, `VecDeque` + `parking_lot::RwLock`
//! - Redis - Redis Streams via `deadpool-redis`

mod backend;
mod error;
mod memory;
mod redis;

use std::sync::Arc;

pub use backend::{StreamBackend, StreamMessage, StreamStats, StreamSubscription};
pub use error::StreamError;
use memory::MemoryStreamBackend;

use crate::core::config::{EngineBackendType, StreamConfig};

/// Stream service providing the durable queue primitive used by command
/// submission and delivery.
///
/// Wraps the underlying backend (memory or Redis); callers interact with it
/// exclusively through `offer`/`consume`/`ack`/`claim`.
pub struct StreamService {
    backend: Arc<dyn StreamBackend>,
}

impl std::fmt::Debug for StreamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamService")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl StreamService {
    /// Initialize the stream backend from configuration
    pub async fn init(config: &StreamConfig) -> Result<Self, StreamError> {
        let backend: Arc<dyn StreamBackend> = match config.backend {
            EngineBackendType::Memory => {
                tracing::debug!("Initializing in-memory stream backend");
                Arc::new(MemoryStreamBackend::new())
            }
            EngineBackendType::Redis => {
                let url = config.redis_url.as_ref().ok_or_else(|| {
                    StreamError::Config("redis_url required for Redis stream backend".into())
                })?;
                Arc::new(redis::RedisStreamBackend::new(url).await?)
            }
        };

        Ok(Self { backend })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Offer a message for durable, at-least-once delivery.
    pub async fn offer(&self, topic: &str, payload: &[u8]) -> Result<String, StreamError> {
        self.backend.stream_publish(topic, payload).await
    }

    /// Attach a consumer to the stream's consumer group; returns a stream of
    /// undelivered messages addressed to this consumer.
    pub async fn consume(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<StreamSubscription, StreamError> {
        self.backend.stream_subscribe(topic, group, consumer).await
    }

    /// Acknowledge a message, removing it from the pending list.
    pub async fn ack(&self, topic: &str, group: &str, id: &str) -> Result<(), StreamError> {
        self.backend.stream_ack(topic, group, id).await
    }

    /// Claim pending messages idle longer than `min_idle_ms`, reassigning
    /// them to `consumer`. Fair across repeated calls (see `StreamBackend::stream_claim`).
    pub async fn claim(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        self.backend
            .stream_claim(topic, group, consumer, min_idle_ms, count)
            .await
    }

    /// Total number of messages ever published to the stream.
    pub async fn length(&self, topic: &str) -> Result<u64, StreamError> {
        self.backend.stream_len(topic).await
    }

    /// Stream statistics for monitoring.
    pub async fn stats(&self, topic: &str, group: &str) -> Result<StreamStats, StreamError> {
        self.backend.stream_stats(topic, group).await
    }

    pub async fn health_check(&self) -> Result<(), StreamError> {
        self.backend.health_check().await
    }
}
