//! Command execution domain: the durable record, the transient outcome a
//! handler returns, the stream envelope that wakes a consumer, the handler
//! registry, the queue wrapper, and the service that ties them into the
//! consume loop.

pub mod handler;
pub mod msg;
pub mod queue;
pub mod result;
pub mod serializer;
pub mod service;
pub mod state;

pub use handler::{CommandHandler, DynCommandHandler, HandlerAdapter, HandlerOutcome, HandlerRegistry};
pub use msg::CommandMsg;
pub use queue::CommandQueue;
pub use result::CommandResult;
pub use service::{CommandService, EngineHealthReport};
pub use state::{CommandState, CommandStatus};
