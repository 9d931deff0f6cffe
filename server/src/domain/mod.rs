//! Domain logic for the command execution engine.
//!
//! - `command` - the command lifecycle state machine, queue wrapper, handler
//!   registry and the service that drives the consume loop
//! - `handlers` - example command handlers built on top of `command`

pub mod command;
pub mod handlers;

pub use command::{CommandResult, CommandService, CommandState, CommandStatus};
