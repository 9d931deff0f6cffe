//! Stream error types

use std::fmt;

/// Error type for stream operations
#[derive(Debug)]
pub enum StreamError {
    /// Channel or connection closed
    ChannelClosed,
    /// Connection error (Redis)
    Connection(String),
    /// Serialization/deserialization error
    Serialization(String),
    /// Stream operation error
    Stream(String),
    /// Consumer group error
    ConsumerGroup(String),
    /// Configuration error
    Config(String),
}

impl std::error::Error for StreamError {}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::ChannelClosed => write!(f, "channel closed"),
            StreamError::Connection(msg) => write!(f, "connection error: {}", msg),
            StreamError::Serialization(msg) => write!(f, "serialization error: {}", msg),
            StreamError::Stream(msg) => write!(f, "stream error: {}", msg),
            StreamError::ConsumerGroup(msg) => write!(f, "consumer group error: {}", msg),
            StreamError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl From<deadpool_redis::PoolError> for StreamError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StreamError::Connection(err.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for StreamError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        StreamError::Stream(err.to_string())
    }
}
