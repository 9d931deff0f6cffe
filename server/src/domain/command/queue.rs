//! Queue wrapper (§4.E): typed submit/consume of [`CommandMsg`] over the raw
//! stream primitive, plus the background listener loop and its backoff
//! policy. [`super::service::CommandService`] supplies the per-message
//! callback that implements the consume-loop algorithm; this module only
//! knows how to keep one listener alive, periodically reclaim stalled
//! entries, and back off on transient stream errors.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::EngineError;
use crate::core::constants::{BACKOFF_BASE_MS, BACKOFF_MAX_MS, CONSUMER_GROUP, QUEUE_NAME};
use crate::data::stream::{StreamMessage, StreamService, StreamStats};

use super::msg::CommandMsg;

/// Number of pending entries reclaimed per claim-scan tick.
const CLAIM_BATCH_SIZE: usize = 16;

/// Typed wrapper around [`StreamService`] for the fixed command queue.
pub struct CommandQueue {
    stream: Arc<StreamService>,
    topic: String,
    group: String,
    consumer: String,
    claim_timeout: Duration,
    poll_interval: Duration,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl CommandQueue {
    pub fn new(stream: Arc<StreamService>, claim_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            stream,
            topic: format!("{QUEUE_NAME}/v1"),
            group: CONSUMER_GROUP.to_string(),
            consumer: format!("{}:{}", Uuid::new_v4(), std::process::id()),
            claim_timeout,
            poll_interval,
            listener: Mutex::new(None),
        }
    }

    /// Encode and offer a [`CommandMsg`] on the fixed queue stream (§4.E
    /// `submit`).
    pub async fn submit(&self, msg: &CommandMsg) -> Result<String, EngineError> {
        let payload =
            serde_json::to_vec(msg).map_err(|e| EngineError::Serialization(e.to_string()))?;
        Ok(self.stream.offer(&self.topic, &payload).await?)
    }

    /// At most one consumer per process (§4.E). `handler` is called once per
    /// delivered (or reclaimed) message; returning `true` acks it, `false`
    /// leaves it pending so the stream's claim-on-stall mechanism redelivers
    /// it after `claim_timeout` (§4.A). A second call is a no-op — the first
    /// registration already owns the listener.
    pub async fn add_consumer<F, Fut>(&self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(StreamMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send,
    {
        let mut guard = self.listener.lock().await;
        if guard.is_some() {
            tracing::debug!("add_consumer called twice; ignoring second registration");
            return;
        }

        let stream = Arc::clone(&self.stream);
        let topic = self.topic.clone();
        let group = self.group.clone();
        let consumer = self.consumer.clone();
        let claim_timeout_ms: u64 = self.claim_timeout.as_millis().try_into().unwrap_or(u64::MAX);
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut backoff_ms = BACKOFF_BASE_MS;

            let subscription = loop {
                match stream.consume(&topic, &group, &consumer).await {
                    Ok(sub) => break sub,
                    Err(e) => {
                        tracing::warn!(error = %e, delay_ms = backoff_ms, "failed to subscribe to command queue; retrying");
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = (backoff_ms * 2).min(BACKOFF_MAX_MS);
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            };
            let mut receiver = subscription.receiver;
            let mut claim_ticker = tokio::time::interval(poll_interval);
            claim_ticker.tick().await; // first tick fires immediately

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("command queue listener shutting down");
                            return;
                        }
                    }

                    maybe_msg = receiver.next() => {
                        match maybe_msg {
                            Some(Ok(msg)) => {
                                backoff_ms = BACKOFF_BASE_MS;
                                Self::dispatch(&stream, &topic, &group, msg, &handler).await;
                            }
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, delay_ms = backoff_ms, "command queue read error; backing off");
                                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                                backoff_ms = (backoff_ms * 2).min(BACKOFF_MAX_MS);
                            }
                            None => {
                                tracing::warn!("command queue subscription closed");
                                return;
                            }
                        }
                    }

                    _ = claim_ticker.tick() => {
                        match stream
                            .claim(&topic, &group, &consumer, claim_timeout_ms, CLAIM_BATCH_SIZE)
                            .await
                        {
                            Ok(claimed) => {
                                for msg in claimed {
                                    Self::dispatch(&stream, &topic, &group, msg, &handler).await;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to scan for stalled command messages");
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(task);
    }

    async fn dispatch<F, Fut>(
        stream: &StreamService,
        topic: &str,
        group: &str,
        msg: StreamMessage,
        handler: &F,
    ) where
        F: Fn(StreamMessage) -> Fut,
        Fut: Future<Output = bool>,
    {
        let id = msg.id.clone();
        if handler(msg).await
            && let Err(e) = stream.ack(topic, group, &id).await
        {
            tracing::warn!(error = %e, message_id = %id, "failed to ack command message");
        }
    }

    /// Stops the listener task, if running.
    pub async fn close(&self) {
        if let Some(task) = self.listener.lock().await.take() {
            task.abort();
        }
    }

    /// Number of messages ever published to the queue's stream.
    pub async fn depth(&self) -> Result<u64, EngineError> {
        Ok(self.stream.length(&self.topic).await?)
    }

    /// Queue-level statistics (pending count, oldest pending age) for
    /// monitoring.
    pub async fn stats(&self) -> Result<StreamStats, EngineError> {
        Ok(self.stream.stats(&self.topic, &self.group).await?)
    }

    pub async fn health_check(&self) -> Result<(), EngineError> {
        Ok(self.stream.health_check().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{EngineBackendType, StreamConfig};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> StreamConfig {
        StreamConfig {
            backend: EngineBackendType::Memory,
            redis_url: None,
        }
    }

    #[tokio::test]
    async fn submit_and_consume_roundtrip() {
        let stream = Arc::new(StreamService::init(&test_config()).await.unwrap());
        let queue = CommandQueue::new(stream, Duration::from_secs(5), Duration::from_millis(20));

        let msg = CommandMsg {
            command_id: "cmd-1".into(),
            type_tag: "computation".into(),
            submitted_at: Utc::now(),
        };
        queue.submit(&msg).await.unwrap();

        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = Arc::clone(&received);
        let (_tx, rx) = watch::channel(false);
        queue
            .add_consumer(rx, move |raw| {
                let received = Arc::clone(&received_clone);
                async move {
                    let decoded: CommandMsg = serde_json::from_slice(&raw.payload).unwrap();
                    assert_eq!(decoded.command_id, "cmd-1");
                    received.fetch_add(1, Ordering::SeqCst);
                    true
                }
            })
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nacked_message_is_reclaimed_after_claim_timeout() {
        let stream = Arc::new(StreamService::init(&test_config()).await.unwrap());
        let queue = CommandQueue::new(
            stream,
            Duration::from_millis(50),
            Duration::from_millis(20),
        );

        let msg = CommandMsg {
            command_id: "cmd-1".into(),
            type_tag: "computation".into(),
            submitted_at: Utc::now(),
        };
        queue.submit(&msg).await.unwrap();

        let deliveries = Arc::new(AtomicUsize::new(0));
        let deliveries_clone = Arc::clone(&deliveries);
        let (_tx, rx) = watch::channel(false);
        queue
            .add_consumer(rx, move |_raw| {
                let deliveries = Arc::clone(&deliveries_clone);
                async move {
                    let n = deliveries.fetch_add(1, Ordering::SeqCst);
                    n >= 1 // nack the first delivery, ack the reclaim
                }
            })
            .await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(deliveries.load(Ordering::SeqCst) >= 2);
    }
}
