//! `CommandState` (§3.1): the durable record, and its pure transitions (§4.D).
//!
//! Immutable by convention — every transition method takes `&self` and
//! returns a new value rather than mutating in place, so the consume loop
//! can always reason about "the state as loaded" separately from "the state
//! about to be written".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::CommandResult;

/// §3.1 status enum. `Pending` is never constructed by any transition in
/// this crate (every command starts life via [`CommandState::submitted`],
/// whose initial status is `Submitted`) but is part of the wire format for
/// forward compatibility with producers that stage a command before
/// submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Pending,
    Submitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl CommandStatus {
    /// `true` for the three terminal statuses (§3.1 invariants).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// The durable, opaque-blob record persisted under `id` in the state store.
///
/// `params`/`result` are kept as raw [`serde_json::Value`] rather than a
/// generic type parameter: a single `CommandState` value flows through the
/// consume loop for commands of every registered type, so it cannot itself
/// be generic over one. Reconstructing a concrete `Params`/`Result` type
/// happens at the handler-dispatch boundary (`handler::HandlerAdapter`),
/// which is the one place that knows which concrete type applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandState {
    pub id: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub status: CommandStatus,
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CommandState {
    /// Initial state for a newly submitted command (§4.D `submitted`).
    pub fn submitted(
        id: impl Into<String>,
        type_tag: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            status: CommandStatus::Submitted,
            params,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Promotes `SUBMITTED` to `RUNNING`, stamping `startedAt` on first
    /// entry. Identity on any other status, so repeated application is safe
    /// (§8.2 transition idempotence law).
    pub fn started(&self) -> Self {
        if self.status != CommandStatus::Submitted {
            return self.clone();
        }
        let mut next = self.clone();
        next.status = CommandStatus::Running;
        next.started_at = Some(Utc::now());
        next
    }

    pub fn completed(&self, result: serde_json::Value) -> Self {
        let mut next = self.clone();
        next.status = CommandStatus::Succeeded;
        next.result = Some(result);
        next.error = None;
        next.completed_at = Some(Utc::now());
        next
    }

    pub fn failed(&self, error: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.status = CommandStatus::Failed;
        next.error = Some(error.into());
        next.result = None;
        next.completed_at = Some(Utc::now());
        next
    }

    pub fn cancelled(&self) -> Self {
        let mut next = self.clone();
        next.status = CommandStatus::Cancelled;
        next.completed_at = Some(Utc::now());
        next
    }

    /// Dispatches a handler's [`CommandResult`] onto the matching transition
    /// (§4.D `applyResult`). The consume loop handles `Running` itself
    /// before ever calling this, so it falls through the catch-all like
    /// any other unexpected status.
    pub fn apply_result(&self, result: CommandResult) -> Self {
        match result {
            CommandResult::Succeeded(value) => self.completed(value),
            CommandResult::Failed(error) => self.failed(error),
            CommandResult::Cancelled => self.cancelled(),
            CommandResult::Running => self.failed("unexpected result status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CommandState {
        CommandState::submitted("cmd-1", "computation", json!({"op": "factorial", "value": 5}))
    }

    #[test]
    fn started_is_idempotent() {
        let s = sample();
        let once = s.started();
        let twice = once.started();
        assert_eq!(once.status, CommandStatus::Running);
        assert_eq!(once.started_at, twice.started_at);
        assert_eq!(once, twice);
    }

    #[test]
    fn started_is_identity_once_running() {
        let s = sample().started();
        let other = s.started();
        assert_eq!(s, other);
    }

    #[test]
    fn completed_sets_result_and_clears_error() {
        let s = sample().started();
        let completed = s.completed(json!({"value": 120}));
        assert_eq!(completed.status, CommandStatus::Succeeded);
        assert_eq!(completed.result, Some(json!({"value": 120})));
        assert!(completed.error.is_none());
        assert!(completed.completed_at.is_some());
    }

    #[test]
    fn failed_sets_error_and_clears_result() {
        let s = sample();
        let failed = s.failed("Division by zero");
        assert_eq!(failed.status, CommandStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("Division by zero"));
        assert!(failed.result.is_none());
    }

    #[test]
    fn cancelled_is_terminal() {
        let cancelled = sample().cancelled();
        assert!(cancelled.status.is_terminal());
        assert!(cancelled.completed_at.is_some());
    }

    #[test]
    fn apply_result_dispatches_on_variant() {
        let s = sample();
        let unexpected = s.apply_result(CommandResult::Running);
        assert_eq!(unexpected.status, CommandStatus::Failed);
        assert_eq!(unexpected.error.as_deref(), Some("unexpected result status"));
        assert_eq!(
            s.apply_result(CommandResult::Succeeded(json!(1))).status,
            CommandStatus::Succeeded
        );
        assert_eq!(
            s.apply_result(CommandResult::Failed("boom".into())).status,
            CommandStatus::Failed
        );
        assert_eq!(
            s.apply_result(CommandResult::Cancelled).status,
            CommandStatus::Cancelled
        );
    }

    #[test]
    fn timestamps_are_ordered() {
        let submitted = sample();
        let running = submitted.started();
        let done = running.completed(json!(1));
        assert!(done.created_at <= done.started_at.unwrap());
        assert!(done.started_at.unwrap() <= done.completed_at.unwrap());
    }
}
