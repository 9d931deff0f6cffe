//! In-memory stream backend
//!
//! VecDeque with pending tracking (simulated consumer group). Suitable for
//! local development and single-process deployments:
//! - Process crash = all messages lost (no persistence)
//! - Single consumer group per process (no cross-process coordination)
//!
//! For durability and multi-machine deployments, use the Redis backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::backend::{StreamBackend, StreamMessage, StreamStats, StreamSubscription};
use super::error::StreamError;

/// Default stream max length (approximate, trimmed on publish)
const DEFAULT_STREAM_MAX_LEN: usize = 100_000;

/// Message stored in memory stream
#[derive(Clone)]
struct StreamEntry {
    id: u64,
    payload: Vec<u8>,
    timestamp: Instant,
}

/// Consumer group state for a stream
#[derive(Default)]
struct ConsumerGroup {
    /// Last delivered ID for each consumer
    last_delivered: HashMap<String, u64>,
    /// Pending messages: message_id -> (consumer, delivery_time)
    pending: HashMap<u64, (String, Instant)>,
    /// Fair-scan cursor: last message id examined by a `stream_claim` call.
    /// Resumed on the next call; reset to 0 once a scan wraps around so no
    /// pending entry is starved by ones that sort before it.
    claim_cursor: u64,
}

/// Stream state
struct StreamState {
    /// Messages in the stream
    messages: VecDeque<StreamEntry>,
    /// Consumer groups
    groups: HashMap<String, ConsumerGroup>,
    /// Next message ID
    next_id: u64,
    /// Maximum stream length
    max_len: usize,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            messages: VecDeque::new(),
            groups: HashMap::new(),
            next_id: 1,
            max_len: DEFAULT_STREAM_MAX_LEN,
        }
    }
}

/// Shared state for memory backend
struct SharedState {
    /// Stream state by topic name
    streams: RwLock<HashMap<String, StreamState>>,
    /// Per-stream notifiers for immediate subscriber wakeup (avoids polling)
    stream_notifiers: RwLock<HashMap<String, Arc<Notify>>>,
}

/// In-memory stream backend
pub struct MemoryStreamBackend {
    state: Arc<SharedState>,
}

impl Clone for MemoryStreamBackend {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MemoryStreamBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStreamBackend {
    /// Create a new in-memory stream backend
    pub fn new() -> Self {
        Self {
            state: Arc::new(SharedState {
                streams: RwLock::new(HashMap::new()),
                stream_notifiers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Trim stream to max length (approximately)
    fn trim_stream(stream: &mut StreamState) {
        while stream.messages.len() > stream.max_len {
            if let Some(entry) = stream.messages.pop_front() {
                for group in stream.groups.values_mut() {
                    group.pending.remove(&entry.id);
                }
            }
        }
    }

    /// Get or create a Notify for a stream topic (for immediate subscriber wakeup)
    fn get_or_create_notifier(&self, topic: &str) -> Arc<Notify> {
        {
            let notifiers = self.state.stream_notifiers.read();
            if let Some(n) = notifiers.get(topic) {
                return Arc::clone(n);
            }
        }
        let mut notifiers = self.state.stream_notifiers.write();
        if let Some(n) = notifiers.get(topic) {
            return Arc::clone(n);
        }
        let n = Arc::new(Notify::new());
        notifiers.insert(topic.to_string(), Arc::clone(&n));
        n
    }
}

#[async_trait]
impl StreamBackend for MemoryStreamBackend {
    async fn stream_publish(&self, topic: &str, payload: &[u8]) -> Result<String, StreamError> {
        let id = {
            let mut streams = self.state.streams.write();
            let stream = streams.entry(topic.to_string()).or_default();

            let id = stream.next_id;
            stream.next_id += 1;

            stream.messages.push_back(StreamEntry {
                id,
                payload: payload.to_vec(),
                timestamp: Instant::now(),
            });

            Self::trim_stream(stream);
            id
        };

        // Wake subscriber immediately (no polling delay)
        self.get_or_create_notifier(topic).notify_one();

        Ok(id.to_string())
    }

    async fn stream_subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<StreamSubscription, StreamError> {
        // Ensure consumer group exists
        {
            let mut streams = self.state.streams.write();
            let stream = streams.entry(topic.to_string()).or_default();
            stream.groups.entry(group.to_string()).or_default();
        }

        let topic = topic.to_string();
        let group = group.to_string();
        let consumer = consumer.to_string();
        let state = Arc::clone(&self.state);
        let notifier = self.get_or_create_notifier(&topic);

        let stream = stream! {
            let mut last_seen: u64 = 0;

            {
                let streams = state.streams.read();
                if let Some(stream_state) = streams.get(&topic)
                    && let Some(cg) = stream_state.groups.get(&group)
                    && let Some(&last) = cg.last_delivered.get(&consumer)
                {
                    last_seen = last;
                }
            }

            loop {
                let maybe_msg = {
                    let mut streams = state.streams.write();
                    let stream_state = streams.entry(topic.clone()).or_default();
                    let cg = stream_state.groups.entry(group.clone()).or_default();

                    let mut found = None;
                    for entry in &stream_state.messages {
                        if entry.id > last_seen && !cg.pending.contains_key(&entry.id) {
                            found = Some(StreamEntry {
                                id: entry.id,
                                payload: entry.payload.clone(),
                                timestamp: entry.timestamp,
                            });
                            break;
                        }
                    }

                    found.map(|entry| {
                        cg.pending.insert(entry.id, (consumer.clone(), Instant::now()));
                        cg.last_delivered.insert(consumer.clone(), entry.id);
                        last_seen = entry.id;
                        StreamMessage {
                            id: entry.id.to_string(),
                            payload: entry.payload,
                        }
                    })
                };

                if let Some(msg) = maybe_msg {
                    yield Ok(msg);
                } else {
                    notifier.notified().await;
                }
            }
        };

        Ok(StreamSubscription {
            receiver: Box::pin(stream),
        })
    }

    /// Ack-then-delete (§4.A): removing the entry from `pending` alone would
    /// leave it in the log, where a fresh consumer identity (e.g. after a
    /// process restart, whose `last_seen` starts back at zero) would read it
    /// again. Deleting it here is what actually prevents redelivery.
    async fn stream_ack(&self, topic: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let parsed_id: u64 = id
            .parse()
            .map_err(|_| StreamError::Stream(format!("invalid message id: {}", id)))?;

        let mut streams = self.state.streams.write();
        let stream = streams
            .get_mut(topic)
            .ok_or_else(|| StreamError::Stream(format!("stream not found: {}", topic)))?;

        let cg = stream.groups.get_mut(group).ok_or_else(|| {
            StreamError::ConsumerGroup(format!("consumer group not found: {}", group))
        })?;
        cg.pending.remove(&parsed_id);

        stream.messages.retain(|e| e.id != parsed_id);
        Ok(())
    }

    async fn stream_claim(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        let mut streams = self.state.streams.write();
        let stream = match streams.get_mut(topic) {
            Some(s) => s,
            None => return Ok(vec![]),
        };

        let cg = match stream.groups.get_mut(group) {
            Some(g) => g,
            None => return Ok(vec![]),
        };

        let now = Instant::now();
        let min_idle = std::time::Duration::from_millis(min_idle_ms);

        // Scan pending ids in sorted order starting just after the remembered
        // cursor, wrapping once to the front. This makes successive claim
        // scans round-robin across the pending set instead of always
        // starting from the lowest id, which would starve later entries
        // under sustained backlog.
        let mut pending_ids: Vec<u64> = cg.pending.keys().copied().collect();
        pending_ids.sort_unstable();

        let start = pending_ids
            .iter()
            .position(|id| *id > cg.claim_cursor)
            .unwrap_or(0);
        let ordered = pending_ids[start..]
            .iter()
            .chain(pending_ids[..start].iter());

        let mut idle_ids = Vec::with_capacity(count);
        for &id in ordered {
            if idle_ids.len() >= count {
                break;
            }
            if let Some((_, delivery_time)) = cg.pending.get(&id)
                && now.duration_since(*delivery_time) >= min_idle
            {
                idle_ids.push(id);
            }
        }

        if let Some(&last) = idle_ids.last() {
            cg.claim_cursor = last;
        } else if !pending_ids.is_empty() && start == 0 {
            // A full pass produced nothing claimable; wrap so the next call
            // re-examines from the start rather than sitting on a cursor
            // that may no longer exist once entries are acked.
            cg.claim_cursor = 0;
        }

        let mut claimed = Vec::with_capacity(idle_ids.len());
        for id in idle_ids {
            if let Some(entry) = stream.messages.iter().find(|e| e.id == id) {
                cg.pending
                    .insert(id, (consumer.to_string(), Instant::now()));
                claimed.push(StreamMessage {
                    id: id.to_string(),
                    payload: entry.payload.clone(),
                });
            }
        }

        Ok(claimed)
    }

    async fn stream_len(&self, topic: &str) -> Result<u64, StreamError> {
        let streams = self.state.streams.read();
        Ok(streams.get(topic).map(|s| s.messages.len() as u64).unwrap_or(0))
    }

    async fn stream_stats(&self, topic: &str, group: &str) -> Result<StreamStats, StreamError> {
        let streams = self.state.streams.read();
        let stream = match streams.get(topic) {
            Some(s) => s,
            None => return Ok(StreamStats::default()),
        };

        let cg = match stream.groups.get(group) {
            Some(g) => g,
            None => {
                return Ok(StreamStats {
                    length: stream.messages.len() as u64,
                    ..Default::default()
                });
            }
        };

        let now = Instant::now();
        let oldest_pending_ms = cg
            .pending
            .values()
            .map(|(_, delivery_time)| now.duration_since(*delivery_time).as_millis() as u64)
            .max();

        Ok(StreamStats {
            length: stream.messages.len() as u64,
            pending: cg.pending.len() as u64,
            consumers: cg.last_delivered.len() as u64,
            oldest_pending_ms,
        })
    }

    async fn health_check(&self) -> Result<(), StreamError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
