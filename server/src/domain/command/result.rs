//! `CommandResult` (§3.2): the transient outcome a handler hands back to the
//! consume loop. Never persisted directly — it is folded into a
//! [`super::state::CommandState`] via `CommandState::apply_result`.

use serde_json::Value;

/// Sum over `{RUNNING, SUCCEEDED(result), FAILED(error), CANCELLED}`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Running,
    Succeeded(Value),
    Failed(String),
    Cancelled,
}
