// =============================================================================
// Application Identity
// =============================================================================

/// Application name (for display, logging target, and CLI banner)
pub const APP_NAME: &str = "cmdengine";

// =============================================================================
// Environment Variables - Logging
// =============================================================================

/// Environment variable for log level/filter, falls back to `RUST_LOG`
pub const ENV_LOG: &str = "CMDENGINE_LOG";

// =============================================================================
// Environment Variables - Backend selection
// =============================================================================

/// Presence selects the Redis backend for both the stream and the state
/// store; absence selects the in-memory backend.
pub const ENV_REDIS_URL: &str = "CMDENGINE_REDIS_URL";

// =============================================================================
// Environment Variables - Engine tunables (see spec table for defaults)
// =============================================================================

pub const ENV_POLL_INTERVAL_MS: &str = "CMDENGINE_POLL_INTERVAL_MS";
pub const ENV_EXECUTE_TIMEOUT_MS: &str = "CMDENGINE_EXECUTE_TIMEOUT_MS";
pub const ENV_STATE_TTL_SECS: &str = "CMDENGINE_STATE_TTL_SECS";
pub const ENV_CLAIM_TIMEOUT_MS: &str = "CMDENGINE_CLAIM_TIMEOUT_MS";
pub const ENV_CONSUME_WARN_TIMEOUT_MS: &str = "CMDENGINE_CONSUME_WARN_TIMEOUT_MS";
pub const ENV_MAX_CONCURRENT_EXECUTIONS: &str = "CMDENGINE_MAX_CONCURRENT_EXECUTIONS";

// =============================================================================
// Defaults (§6.1 of the design)
// =============================================================================

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_EXECUTE_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_STATE_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_CLAIM_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CONSUME_WARN_TIMEOUT_MS: u64 = 4_000;
pub const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 64;

/// Default in-memory store capacity (entries), used when the Redis backend
/// is not selected.
pub const DEFAULT_STORE_MAX_ENTRIES: u64 = 100_000;

// =============================================================================
// Namespacing
// =============================================================================

/// State store key prefix (§4.B "Key namespacing").
pub const STATE_STORE_PREFIX: &str = "cmd-state/v1";

/// Fixed queue name; the stream topic is derived as `"{QUEUE_NAME}/v1"`.
pub const QUEUE_NAME: &str = "commands";

/// Consumer group shared by every replica.
pub const CONSUMER_GROUP: &str = "cmdengine";

/// TTL for the per-request-id duplicate-submission retry counter (§4.B `incr`).
pub const RETRY_COUNTER_TTL_SECS: u64 = 60 * 60;

/// State-store key the periodic health report writes its heartbeat under.
pub const HEARTBEAT_KEY: &str = "engine/heartbeat";

// =============================================================================
// Shutdown
// =============================================================================

pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Backoff (queue wrapper reconnect policy, §4.E)
// =============================================================================

pub const BACKOFF_BASE_MS: u64 = 250;
pub const BACKOFF_MAX_MS: u64 = 60_000;

// =============================================================================
// Health reporting
// =============================================================================

/// How often the background health-report task logs a collaborator snapshot.
pub const HEALTH_REPORT_INTERVAL_SECS: u64 = 30;
