//! Top-level error type for the engine.
//!
//! One variant per collaborator primitive plus the concerns specific to the
//! command layer itself, following this crate's usual error-per-layer
//! pattern with `#[from]` conversions at the seams.

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::data::store::StoreError;
use crate::data::stream::StreamError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("stream backend error: {0}")]
    Stream(#[from] StreamError),

    #[error("state store backend error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A handler type tag has no registered handler, or decoding its params
    /// against the registered handler's declared type failed. Both are
    /// treated as permanent, non-retryable failures (§7).
    #[error("handler error: {0}")]
    Handler(String),
}
