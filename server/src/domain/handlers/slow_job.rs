//! `"slow-job"` handler (§10.5): simulates a long-running external job,
//! used by scenario 2 (slow async). `execute` always returns `RUNNING`;
//! `checkStatus` compares elapsed time against `duration_ms` and resolves
//! once it's passed.
//!
//! Elapsed time is measured from `CommandState::started_at` rather than an
//! instant stashed in the result payload — the engine already stamps that
//! field the first time a command is promoted to `RUNNING`, so there's
//! nothing left for the handler itself to track.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::command::handler::{CommandHandler, HandlerOutcome};
use crate::domain::command::state::CommandState;

fn default_duration_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize)]
pub struct SlowJobParams {
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
}

pub struct SlowJobHandler;

#[async_trait]
impl CommandHandler for SlowJobHandler {
    type Params = SlowJobParams;
    type Result = Value;

    fn type_tag(&self) -> &'static str {
        "slow-job"
    }

    async fn execute(&self, _id: &str, _params: Self::Params) -> HandlerOutcome<Self::Result> {
        HandlerOutcome::Running
    }

    async fn check_status(
        &self,
        _id: &str,
        params: &Self::Params,
        state: &CommandState,
    ) -> HandlerOutcome<Self::Result> {
        let Some(started_at) = state.started_at else {
            return HandlerOutcome::Running;
        };
        let elapsed = Utc::now() - started_at;
        let target = chrono::Duration::milliseconds(params.duration_ms as i64);
        if elapsed >= target {
            HandlerOutcome::Succeeded(json!({ "elapsed_ms": elapsed.num_milliseconds() }))
        } else {
            HandlerOutcome::Running
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::state::CommandState;

    #[tokio::test]
    async fn execute_always_returns_running() {
        let outcome = SlowJobHandler
            .execute("cmd-1", SlowJobParams { duration_ms: 2000 })
            .await;
        assert!(matches!(outcome, HandlerOutcome::Running));
    }

    #[tokio::test]
    async fn check_status_stays_running_before_elapsed() {
        let state = CommandState::submitted("cmd-1", "slow-job", json!({"duration_ms": 2000})).started();
        let outcome = SlowJobHandler
            .check_status("cmd-1", &SlowJobParams { duration_ms: 2000 }, &state)
            .await;
        assert!(matches!(outcome, HandlerOutcome::Running));
    }

    #[tokio::test]
    async fn check_status_succeeds_after_elapsed() {
        let mut state =
            CommandState::submitted("cmd-1", "slow-job", json!({"duration_ms": 10})).started();
        state.started_at = Some(Utc::now() - chrono::Duration::milliseconds(50));
        let outcome = SlowJobHandler
            .check_status("cmd-1", &SlowJobParams { duration_ms: 10 }, &state)
            .await;
        assert!(matches!(outcome, HandlerOutcome::Succeeded(_)));
    }

    #[tokio::test]
    async fn check_status_without_started_at_keeps_running() {
        let state = CommandState::submitted("cmd-1", "slow-job", json!({"duration_ms": 10}));
        let outcome = SlowJobHandler
            .check_status("cmd-1", &SlowJobParams { duration_ms: 10 }, &state)
            .await;
        assert!(matches!(outcome, HandlerOutcome::Running));
    }
}
