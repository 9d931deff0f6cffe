//! Core application infrastructure: CLI, configuration, errors, shutdown.

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod shutdown;

pub use cli::Cli;
pub use config::CommandEngineConfig;
pub use error::EngineError;
pub use shutdown::ShutdownService;
