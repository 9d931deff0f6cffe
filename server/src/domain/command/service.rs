//! Command service (§4.F) — the hard part: the handler registry, the public
//! submit/query/cancel API, and the consume loop that drives every command
//! through its state machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::core::config::CommandEngineConfig;
use crate::core::constants::{HEARTBEAT_KEY, RETRY_COUNTER_TTL_SECS};
use crate::core::{EngineError, ShutdownService};
use crate::data::store::StateStoreService;
use crate::data::stream::{StreamMessage, StreamService};

use super::handler::{CommandHandler, HandlerRegistry};
use super::msg::CommandMsg;
use super::queue::CommandQueue;
use super::result::CommandResult;
use super::serializer;
use super::state::{CommandState, CommandStatus};

/// Persist a [`CommandState`] through the §4.C serializer choke point
/// rather than the store's generic `Serialize` path, so every on-wire
/// encode/decode of the durable record passes through one place.
async fn put_state(
    store: &StateStoreService,
    state: &CommandState,
    ttl: Option<Duration>,
) -> Result<(), EngineError> {
    let raw = serializer::encode(state)?;
    store.put_raw(&state.id, raw, ttl).await?;
    Ok(())
}

async fn get_state(
    store: &StateStoreService,
    command_id: &str,
) -> Result<Option<CommandState>, EngineError> {
    match store.get_raw(command_id).await? {
        Some(raw) => Ok(Some(serializer::decode(&raw)?)),
        None => Ok(None),
    }
}

/// Runtime wiring for the consume loop, copied out of [`CommandEngineConfig`]
/// so `process_message` doesn't need to thread the whole config through.
#[derive(Clone, Copy)]
struct LoopTimeouts {
    execute_timeout: Duration,
    consume_warn_timeout: Duration,
    state_ttl: Duration,
}

fn retry_counter_key(request_id: &str) -> String {
    format!("request-retry/{request_id}")
}

/// Snapshot of the engine's collaborators, returned by [`CommandService::health_report`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealthReport {
    pub heartbeat_recorded: bool,
    pub heartbeat_ttl: Option<Duration>,
    pub live_commands: usize,
    pub queue_depth: u64,
    pub queue_pending: u64,
    pub oldest_pending_ms: Option<u64>,
}

pub struct CommandService {
    store: Arc<StateStoreService>,
    queue: Arc<CommandQueue>,
    registry: Arc<HandlerRegistry>,
    timeouts: LoopTimeouts,
    shutdown: ShutdownService,
    execute_semaphore: Arc<Semaphore>,
}

impl CommandService {
    pub fn new(
        store: Arc<StateStoreService>,
        stream: Arc<StreamService>,
        config: &CommandEngineConfig,
        shutdown: ShutdownService,
    ) -> Self {
        let queue = Arc::new(CommandQueue::new(
            stream,
            config.timeouts.claim_timeout,
            config.timeouts.poll_interval,
        ));

        Self {
            store,
            queue,
            registry: Arc::new(HandlerRegistry::new()),
            timeouts: LoopTimeouts {
                execute_timeout: config.timeouts.execute_timeout,
                consume_warn_timeout: config.timeouts.consume_warn_timeout,
                state_ttl: config.timeouts.state_ttl,
            },
            shutdown,
            execute_semaphore: Arc::new(Semaphore::new(config.timeouts.max_concurrent_executions)),
        }
    }

    /// Registers a handler. Must precede [`Self::start`]; re-registering an
    /// existing type tag is an error (§4.F).
    pub fn register_handler<H: CommandHandler>(&self, handler: H) -> Result<(), EngineError> {
        self.registry.register(handler)
    }

    /// Idempotent: registers `process_message` as the queue consumer.
    pub async fn start(&self) -> Result<(), EngineError> {
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        let semaphore = Arc::clone(&self.execute_semaphore);
        let timeouts = self.timeouts;

        self.queue
            .add_consumer(self.shutdown.subscribe(), move |msg| {
                let store = Arc::clone(&store);
                let registry = Arc::clone(&registry);
                let semaphore = Arc::clone(&semaphore);
                async move { process_message(msg, store, registry, semaphore, timeouts).await }
            })
            .await;

        Ok(())
    }

    pub async fn stop(&self) {
        self.queue.close().await;
    }

    /// Persists `CommandState::submitted` then enqueues a [`CommandMsg`].
    /// The store write completes before the message is enqueued (§4.F
    /// `submit`) so a consumer picking up the message always finds state.
    pub async fn submit<P: Serialize>(&self, type_tag: &str, params: &P) -> Result<String, EngineError> {
        let params =
            serde_json::to_value(params).map_err(|e| EngineError::Serialization(e.to_string()))?;
        self.submit_with_request_id(type_tag, params, None).await
    }

    /// Idempotent variant of [`Self::submit`] (§4.B `putIfAbsent` /
    /// `findByRequestId`): a caller-supplied `request_id` lets a retried
    /// submission resolve to the command the earlier attempt created
    /// instead of enqueuing a duplicate. Two replicas racing on the same
    /// `request_id` resolve to a single winner via the secondary index;
    /// the loser discards its speculative command and returns the
    /// winner's id. Every non-winning path bumps a retry counter under
    /// `request_id` so repeated replays are observable.
    pub async fn submit_with_request_id(
        &self,
        type_tag: &str,
        params: Value,
        request_id: Option<&str>,
    ) -> Result<String, EngineError> {
        if let Some(rid) = request_id
            && let Some(existing) = self.store.find_by_request_id::<CommandState>(rid).await?
        {
            self.store
                .incr(&retry_counter_key(rid), Some(Duration::from_secs(RETRY_COUNTER_TTL_SECS)))
                .await?;
            return Ok(existing.id);
        }

        let id = Uuid::new_v4().to_string();
        let state = CommandState::submitted(&id, type_tag, params);
        let ttl = Some(self.timeouts.state_ttl);

        let raw = serializer::encode(&state)?;
        let created = self.store.put_if_absent_raw(&id, raw, ttl).await?;
        if !created {
            // A fresh UUID colliding with a live key is practically
            // impossible; treat it as "someone already submitted this id"
            // and return the existing record rather than erroring.
            if let Some(existing) = get_state(&self.store, &id).await? {
                return Ok(existing.id);
            }
        }

        if let Some(rid) = request_id {
            let won = self.store.index_request_id(rid, &id, ttl).await?;
            if !won {
                self.store.delete(&id).await?;
                self.store
                    .incr(&retry_counter_key(rid), Some(Duration::from_secs(RETRY_COUNTER_TTL_SECS)))
                    .await?;
                return match self.store.find_by_request_id::<CommandState>(rid).await? {
                    Some(winner) => Ok(winner.id),
                    None => Err(EngineError::Handler(format!(
                        "lost request-id handoff race for '{rid}' with no winner recorded"
                    ))),
                };
            }
        }

        let msg = CommandMsg {
            command_id: id.clone(),
            type_tag: type_tag.to_string(),
            submitted_at: state.created_at,
        };
        self.queue.submit(&msg).await?;
        Ok(id)
    }

    /// Collaborator health snapshot (store, queue, and a round-trip
    /// heartbeat write) for operational monitoring.
    pub async fn health_report(&self) -> Result<EngineHealthReport, EngineError> {
        self.store.health_check().await?;
        self.queue.health_check().await?;

        let live_commands = self.store.keys("*").await?.len();

        let heartbeat_ttl_setting = Some(Duration::from_secs(60));
        self.store
            .put(HEARTBEAT_KEY, &Utc::now(), heartbeat_ttl_setting)
            .await?;
        let heartbeat_recorded = self.store.exists(HEARTBEAT_KEY).await?;
        let heartbeat_ttl = self.store.ttl(HEARTBEAT_KEY).await?;

        let queue_depth = self.queue.depth().await?;
        let queue_stats = self.queue.stats().await?;

        Ok(EngineHealthReport {
            heartbeat_recorded,
            heartbeat_ttl,
            live_commands,
            queue_depth,
            queue_pending: queue_stats.pending,
            oldest_pending_ms: queue_stats.oldest_pending_ms,
        })
    }

    pub async fn get_state(&self, command_id: &str) -> Result<Option<CommandState>, EngineError> {
        get_state(&self.store, command_id).await
    }

    /// Returns `result` only if `status = SUCCEEDED`; the `from_value`
    /// deserialize is the runtime type check §4.F calls for.
    pub async fn get_result<T: DeserializeOwned>(
        &self,
        command_id: &str,
    ) -> Result<Option<T>, EngineError> {
        let Some(state) = self.get_state(command_id).await? else {
            return Ok(None);
        };
        if state.status != CommandStatus::Succeeded {
            return Ok(None);
        }
        match state.result {
            Some(value) => {
                let typed = serde_json::from_value(value)
                    .map_err(|e| EngineError::Serialization(e.to_string()))?;
                Ok(Some(typed))
            }
            None => Ok(None),
        }
    }

    /// `false` if no such command or already terminal; otherwise writes a
    /// `cancelled()` state and returns `true`. Does not interrupt an
    /// in-flight handler (§9 open question (b)).
    pub async fn cancel(&self, command_id: &str) -> Result<bool, EngineError> {
        let Some(state) = get_state(&self.store, command_id).await? else {
            return Ok(false);
        };
        if state.status.is_terminal() {
            return Ok(false);
        }
        let cancelled = state.cancelled();
        put_state(&self.store, &cancelled, Some(self.timeouts.state_ttl)).await?;
        Ok(true)
    }
}

/// One iteration of the consume loop (§4.F "Consume loop"). Returns `true`
/// to ack the stream message, `false` to nack (leave it pending for
/// claim-on-stall redelivery).
async fn process_message(
    msg: StreamMessage,
    store: Arc<StateStoreService>,
    registry: Arc<HandlerRegistry>,
    semaphore: Arc<Semaphore>,
    timeouts: LoopTimeouts,
) -> bool {
    let iteration_start = Instant::now();
    let ack = process_message_inner(msg, &store, &registry, &semaphore, timeouts.execute_timeout).await;

    let elapsed = iteration_start.elapsed();
    if elapsed > timeouts.consume_warn_timeout {
        tracing::warn!(
            elapsed_ms = elapsed.as_millis(),
            "consume-loop iteration exceeded consumeWarnTimeoutMillis"
        );
    }
    ack
}

async fn process_message_inner(
    msg: StreamMessage,
    store: &StateStoreService,
    registry: &HandlerRegistry,
    semaphore: &Arc<Semaphore>,
    execute_timeout: Duration,
) -> bool {
    let cmd_msg: CommandMsg = match serde_json::from_slice(&msg.payload) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "malformed command message; discarding");
            return true;
        }
    };

    // Step 1: load.
    let state: CommandState = match get_state(store, &cmd_msg.command_id).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            tracing::debug!(command_id = %cmd_msg.command_id, "state missing; discarding");
            return true;
        }
        Err(e) => {
            tracing::warn!(error = %e, command_id = %cmd_msg.command_id, "store error loading command state; will redeliver");
            return false;
        }
    };

    // Step 2: short-circuit terminal (multi-replica dedup).
    if state.status.is_terminal() {
        return true;
    }

    // Step 3: resolve handler.
    let Some(handler) = registry.get(&state.type_tag) else {
        tracing::warn!(command_id = %state.id, type_tag = %state.type_tag, "no handler for type");
        return terminal_write(store, &state.failed(format!("no handler for type '{}'", state.type_tag))).await;
    };

    // Steps 4-5: reconstruct + branch on status.
    let outcome = if state.status == CommandStatus::Running {
        handler
            .check_status(&state.id, state.params.clone(), &state)
            .await
    } else {
        let Ok(permit) = Arc::clone(semaphore).acquire_owned().await else {
            tracing::error!("execution semaphore closed unexpectedly");
            return terminal_write(store, &state.failed("internal: execution semaphore closed")).await;
        };

        let id = state.id.clone();
        let params = state.params.clone();
        let handler = Arc::clone(&handler);
        let execution = tokio::spawn(async move {
            let _permit = permit;
            handler.execute(&id, params).await
        });

        match tokio::time::timeout(execute_timeout, execution).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(format!("handler panicked: {join_err}")),
            Err(_elapsed) => {
                // Promote to polling; background execution keeps running.
                if state.status != CommandStatus::Running {
                    let started = state.started();
                    if let Err(e) = put_state(store, &started, None).await {
                        tracing::warn!(error = %e, command_id = %state.id, "failed to persist RUNNING state after execute timeout");
                    }
                }
                return false;
            }
        }
    };

    // Step 6: interpret result.
    match outcome {
        Ok(CommandResult::Running) => {
            if state.status != CommandStatus::Running {
                let started = state.started();
                if let Err(e) = put_state(store, &started, None).await {
                    tracing::warn!(error = %e, command_id = %state.id, "failed to persist RUNNING state");
                }
            }
            false
        }
        Ok(result) => terminal_write(store, &state.apply_result(result)).await,
        Err(message) => terminal_write(store, &state.failed(message)).await,
    }
}

async fn terminal_write(store: &StateStoreService, state: &CommandState) -> bool {
    if let Err(e) = put_state(store, state, None).await {
        tracing::warn!(error = %e, command_id = %state.id, "failed to persist terminal state");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cli::Cli;
    use crate::core::config::{EngineBackendType, StateStoreConfig, StreamConfig};
    use crate::domain::command::HandlerOutcome;
    use async_trait::async_trait;
    use clap::Parser;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::time::{Duration as TokioDuration, timeout};

    fn scaled_config() -> CommandEngineConfig {
        let cli = Cli::parse_from([
            "cmdengine",
            "--poll-interval-ms",
            "20",
            "--execute-timeout-ms",
            "100",
            "--claim-timeout-ms",
            "150",
        ]);
        CommandEngineConfig::load(&cli).unwrap()
    }

    async fn harness() -> (
        CommandService,
        CommandEngineConfig,
    ) {
        let config = scaled_config();
        let store = Arc::new(StateStoreService::init(&store_config(&config)).await.unwrap());
        let stream = Arc::new(StreamService::init(&stream_config(&config)).await.unwrap());
        let service = CommandService::new(store, stream, &config, ShutdownService::new());
        (service, config)
    }

    fn store_config(config: &CommandEngineConfig) -> StateStoreConfig {
        StateStoreConfig {
            backend: EngineBackendType::Memory,
            redis_url: None,
            max_entries: 1000,
            default_ttl: config.timeouts.state_ttl,
        }
    }

    fn stream_config(_config: &CommandEngineConfig) -> StreamConfig {
        StreamConfig {
            backend: EngineBackendType::Memory,
            redis_url: None,
        }
    }

    #[derive(Deserialize)]
    struct FactorialParams {
        value: u64,
    }

    struct FactorialHandler;

    #[async_trait]
    impl CommandHandler for FactorialHandler {
        type Params = FactorialParams;
        type Result = Value;

        fn type_tag(&self) -> &'static str {
            "computation"
        }

        async fn execute(&self, _id: &str, params: Self::Params) -> HandlerOutcome<Self::Result> {
            if params.value == 0 {
                return HandlerOutcome::Failed("Division by zero".to_string());
            }
            let product: u64 = (1..=params.value).product();
            HandlerOutcome::Succeeded(json!({"value": product}))
        }
    }

    async fn wait_for_terminal(service: &CommandService, id: &str) -> CommandState {
        timeout(TokioDuration::from_secs(2), async {
            loop {
                if let Some(state) = service.get_state(id).await.unwrap()
                    && state.status.is_terminal()
                {
                    return state;
                }
                tokio::time::sleep(TokioDuration::from_millis(10)).await;
            }
        })
        .await
        .expect("command did not reach a terminal state in time")
    }

    #[tokio::test]
    async fn fast_success_scenario() {
        let (service, _) = harness().await;
        service.register_handler(FactorialHandler).unwrap();
        service.start().await.unwrap();

        let id = service.submit("computation", &json!({"value": 5})).await.unwrap();
        let state = wait_for_terminal(&service, &id).await;

        assert_eq!(state.status, CommandStatus::Succeeded);
        assert_eq!(state.result, Some(json!({"value": 120})));
    }

    #[tokio::test]
    async fn failure_scenario() {
        let (service, _) = harness().await;
        service.register_handler(FactorialHandler).unwrap();
        service.start().await.unwrap();

        let id = service.submit("computation", &json!({"value": 0})).await.unwrap();
        let state = wait_for_terminal(&service, &id).await;

        assert_eq!(state.status, CommandStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("Division by zero"));
        assert!(state.result.is_none());
    }

    #[tokio::test]
    async fn unknown_type_scenario() {
        let (service, _) = harness().await;
        service.start().await.unwrap();

        let id = service.submit("no-such-type", &json!({})).await.unwrap();
        let state = wait_for_terminal(&service, &id).await;

        assert_eq!(state.status, CommandStatus::Failed);
        assert!(state.error.unwrap().contains("no handler"));
    }

    #[tokio::test]
    async fn cancel_before_pickup_scenario() {
        let (service, _) = harness().await;
        service.register_handler(FactorialHandler).unwrap();

        let id = service.submit("computation", &json!({"value": 5})).await.unwrap();
        let cancelled = service.cancel(&id).await.unwrap();
        assert!(cancelled);

        service.start().await.unwrap();
        tokio::time::sleep(TokioDuration::from_millis(150)).await;

        let state = service.get_state(&id).await.unwrap().unwrap();
        assert_eq!(state.status, CommandStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_on_terminal_returns_false() {
        let (service, _) = harness().await;
        service.register_handler(FactorialHandler).unwrap();
        service.start().await.unwrap();

        let id = service.submit("computation", &json!({"value": 5})).await.unwrap();
        wait_for_terminal(&service, &id).await;

        assert!(!service.cancel(&id).await.unwrap());
    }

    #[tokio::test]
    async fn get_result_is_none_until_succeeded() {
        let (service, _) = harness().await;
        let id = service.submit("computation", &json!({"value": 5})).await.unwrap();
        let result: Option<Value> = service.get_result(&id).await.unwrap();
        assert!(result.is_none());
    }
}
