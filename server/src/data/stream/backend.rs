//! Stream backend trait definition
//!
//! Defines the interface for the at-least-once message stream: one consumer
//! group per queue, one delivery per message until acknowledged.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::error::StreamError;

/// Message received from a stream with its ID for acknowledgment
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// Unique message ID (Redis stream ID or memory sequence)
    pub id: String,
    /// Message payload
    pub payload: Vec<u8>,
}

/// Subscription to a stream (at-least-once semantics)
pub struct StreamSubscription {
    /// Stream of received messages with IDs
    pub receiver: Pin<Box<dyn Stream<Item = Result<StreamMessage, StreamError>> + Send>>,
}

/// Stream backend trait
///
/// At-least-once delivery with acknowledgment. Messages persist until
/// acknowledged; consumers that crash without acknowledging leave their
/// messages pending for another consumer to claim.
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Publish a message to the stream.
    ///
    /// Returns the message ID. Messages persist until acknowledged.
    async fn stream_publish(&self, topic: &str, payload: &[u8]) -> Result<String, StreamError>;

    /// Subscribe to the stream with a consumer group.
    ///
    /// Messages are distributed across consumers in the group.
    /// Each message is delivered to exactly one consumer until acknowledged.
    ///
    /// # Arguments
    /// - `topic`: Stream name
    /// - `group`: Consumer group name (e.g., "cmdengine")
    /// - `consumer`: Unique consumer name (e.g., "{uuid}:{pid}")
    async fn stream_subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<StreamSubscription, StreamError>;

    /// Acknowledge message processing complete.
    ///
    /// Removes the message from the pending list. Must be called after
    /// successful processing to prevent re-delivery.
    async fn stream_ack(&self, topic: &str, group: &str, id: &str) -> Result<(), StreamError>;

    /// Claim pending messages that have been idle too long.
    ///
    /// Used for recovery when consumers crash without acknowledging. Scans
    /// are round-robin and fair: each call resumes from where the previous
    /// call for this (topic, group) left off, wrapping back to the start of
    /// the pending entries list once exhausted, so no subset of pending
    /// messages is starved by messages that sort earlier.
    ///
    /// # Arguments
    /// - `topic`: Stream name
    /// - `group`: Consumer group name
    /// - `consumer`: Consumer claiming the messages
    /// - `min_idle_ms`: Minimum idle time before claiming (e.g., 60000 for 1 min)
    /// - `count`: Maximum messages to claim
    async fn stream_claim(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>, StreamError>;

    /// Approximate count of entries currently in the stream (§4.A `length`).
    /// Acked entries are deleted (see `stream_ack`), so this shrinks as
    /// messages are processed rather than growing monotonically.
    async fn stream_len(&self, topic: &str) -> Result<u64, StreamError>;

    /// Get stream statistics for monitoring.
    async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, StreamError>;

    /// Health check (validates connection)
    async fn health_check(&self) -> Result<(), StreamError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}

/// Stream statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Total messages in the stream
    pub length: u64,
    /// Messages pending acknowledgment
    pub pending: u64,
    /// Number of consumers in the group
    pub consumers: u64,
    /// Oldest pending message age in milliseconds
    pub oldest_pending_ms: Option<u64>,
}
