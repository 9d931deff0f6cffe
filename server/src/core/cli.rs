//! CLI surface: backend selection plus the five tunables of §6.1.

use clap::Parser;

use super::constants::*;

#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(version, about = "Durable asynchronous command execution engine", long_about = None)]
pub struct Cli {
    /// Redis URL; presence selects the Redis backend for both the stream and
    /// the state store. Absent ⟹ in-memory backend (dev/test).
    #[arg(long, env = ENV_REDIS_URL)]
    pub redis_url: Option<String>,

    /// Sleep between empty polls, in milliseconds.
    #[arg(long, env = ENV_POLL_INTERVAL_MS)]
    pub poll_interval_ms: Option<u64>,

    /// Max synchronous execution before promotion to RUNNING, in milliseconds.
    #[arg(long, env = ENV_EXECUTE_TIMEOUT_MS)]
    pub execute_timeout_ms: Option<u64>,

    /// TTL of persisted command state, in seconds.
    #[arg(long, env = ENV_STATE_TTL_SECS)]
    pub state_ttl_secs: Option<u64>,

    /// Stream idle threshold to reclaim stalled entries, in milliseconds.
    #[arg(long, env = ENV_CLAIM_TIMEOUT_MS)]
    pub claim_timeout_ms: Option<u64>,

    /// Log a warning when a single consume-loop iteration exceeds this, in milliseconds.
    #[arg(long, env = ENV_CONSUME_WARN_TIMEOUT_MS)]
    pub consume_warn_timeout_ms: Option<u64>,

    /// Upper bound on concurrently in-flight synchronous `execute` calls.
    #[arg(long, env = ENV_MAX_CONCURRENT_EXECUTIONS)]
    pub max_concurrent_executions: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_no_args() {
        let cli = Cli::parse_from(["cmdengine"]);
        assert!(cli.redis_url.is_none());
    }

    #[test]
    fn parses_redis_url() {
        let cli = Cli::parse_from(["cmdengine", "--redis-url", "redis://localhost:6379"]);
        assert_eq!(cli.redis_url.as_deref(), Some("redis://localhost:6379"));
    }
}
