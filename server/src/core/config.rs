//! Runtime configuration for the command execution engine.
//!
//! Mirrors the split this codebase always uses: a `clap`-derived [`Cli`]
//! carries raw CLI/env input, and [`CommandEngineConfig::load`] merges it
//! into the typed runtime config the rest of the crate consumes.

use std::fmt;
use std::time::Duration;

use super::cli::Cli;
use super::constants::*;

/// Which backend the stream and state store are wired to.
///
/// A single flag (`--redis-url`) selects both primitives together — the
/// engine has no supported configuration that splits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineBackendType {
    /// Single-process, non-durable. Development and tests.
    Memory,
    /// Distributed, durable. Production / multi-replica.
    Redis,
}

impl fmt::Display for EngineBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

/// Configuration for the state store primitive (§4.B).
#[derive(Debug, Clone)]
pub struct StateStoreConfig {
    pub backend: EngineBackendType,
    pub redis_url: Option<String>,
    /// Max entries held by the in-memory backend; ignored for Redis.
    pub max_entries: u64,
    /// Default TTL applied to writes that don't specify one.
    pub default_ttl: Duration,
}

/// Configuration for the message stream primitive (§4.A).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub backend: EngineBackendType,
    pub redis_url: Option<String>,
}

/// The five tunables enumerated in §6.1, plus the executor bound.
#[derive(Debug, Clone, Copy)]
pub struct EngineTimeouts {
    pub poll_interval: Duration,
    pub execute_timeout: Duration,
    pub state_ttl: Duration,
    pub claim_timeout: Duration,
    pub consume_warn_timeout: Duration,
    pub max_concurrent_executions: usize,
}

/// Merged, validated runtime configuration for the engine.
#[derive(Debug, Clone)]
pub struct CommandEngineConfig {
    pub backend: EngineBackendType,
    pub redis_url: Option<String>,
    pub timeouts: EngineTimeouts,
}

impl CommandEngineConfig {
    /// Build and validate the runtime config from parsed CLI/env input.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let backend = if cli.redis_url.is_some() {
            EngineBackendType::Redis
        } else {
            EngineBackendType::Memory
        };

        if backend == EngineBackendType::Redis
            && cli.redis_url.as_ref().is_some_and(|u| u.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "--redis-url was provided but empty".to_string(),
            ));
        }

        let poll_interval_ms = cli.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let execute_timeout_ms = cli.execute_timeout_ms.unwrap_or(DEFAULT_EXECUTE_TIMEOUT_MS);
        let state_ttl_secs = cli.state_ttl_secs.unwrap_or(DEFAULT_STATE_TTL_SECS);
        let claim_timeout_ms = cli.claim_timeout_ms.unwrap_or(DEFAULT_CLAIM_TIMEOUT_MS);
        let consume_warn_timeout_ms = cli
            .consume_warn_timeout_ms
            .unwrap_or(DEFAULT_CONSUME_WARN_TIMEOUT_MS);
        let max_concurrent_executions = cli
            .max_concurrent_executions
            .unwrap_or(DEFAULT_MAX_CONCURRENT_EXECUTIONS);

        if poll_interval_ms == 0 {
            return Err(ConfigError::Validation("poll-interval-ms must be > 0".into()));
        }
        if execute_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "execute-timeout-ms must be > 0".into(),
            ));
        }
        if state_ttl_secs == 0 {
            return Err(ConfigError::Validation("state-ttl-secs must be > 0".into()));
        }
        if claim_timeout_ms == 0 {
            return Err(ConfigError::Validation("claim-timeout-ms must be > 0".into()));
        }
        if max_concurrent_executions == 0 {
            return Err(ConfigError::Validation(
                "max-concurrent-executions must be > 0".into(),
            ));
        }

        Ok(Self {
            backend,
            redis_url: cli.redis_url.clone(),
            timeouts: EngineTimeouts {
                poll_interval: Duration::from_millis(poll_interval_ms),
                execute_timeout: Duration::from_millis(execute_timeout_ms),
                state_ttl: Duration::from_secs(state_ttl_secs),
                claim_timeout: Duration::from_millis(claim_timeout_ms),
                consume_warn_timeout: Duration::from_millis(consume_warn_timeout_ms),
                max_concurrent_executions,
            },
        })
    }

    pub fn store_config(&self) -> StateStoreConfig {
        StateStoreConfig {
            backend: self.backend,
            redis_url: self.redis_url.clone(),
            max_entries: DEFAULT_STORE_MAX_ENTRIES,
            default_ttl: self.timeouts.state_ttl,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            backend: self.backend,
            redis_url: self.redis_url.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_from(args: &[&str]) -> Cli {
        let mut full = vec!["cmdengine"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn defaults_select_memory_backend() {
        let cli = cli_from(&[]);
        let config = CommandEngineConfig::load(&cli).unwrap();
        assert_eq!(config.backend, EngineBackendType::Memory);
        assert_eq!(config.timeouts.poll_interval, Duration::from_secs(1));
        assert_eq!(config.timeouts.execute_timeout, Duration::from_secs(1));
        assert_eq!(config.timeouts.claim_timeout, Duration::from_secs(5));
        assert_eq!(
            config.timeouts.state_ttl,
            Duration::from_secs(7 * 24 * 60 * 60)
        );
    }

    #[test]
    fn redis_url_selects_redis_backend() {
        let cli = cli_from(&["--redis-url", "redis://localhost:6379"]);
        let config = CommandEngineConfig::load(&cli).unwrap();
        assert_eq!(config.backend, EngineBackendType::Redis);
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cli = cli_from(&["--poll-interval-ms", "0"]);
        assert!(CommandEngineConfig::load(&cli).is_err());
    }

    #[test]
    fn overrides_are_applied() {
        let cli = cli_from(&[
            "--execute-timeout-ms",
            "2500",
            "--claim-timeout-ms",
            "9000",
        ]);
        let config = CommandEngineConfig::load(&cli).unwrap();
        assert_eq!(
            config.timeouts.execute_timeout,
            Duration::from_millis(2500)
        );
        assert_eq!(config.timeouts.claim_timeout, Duration::from_millis(9000));
    }
}
