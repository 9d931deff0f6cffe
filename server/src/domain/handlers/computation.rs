//! `"computation"` handler (§10.5): small synchronous arithmetic, used by
//! scenarios 1 (factorial success) and 3 (division-by-zero failure).
//!
//! Illustrative application code, not core-engine logic — lives outside
//! `domain::command` so the engine has no compile-time dependency on it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::command::handler::{CommandHandler, HandlerOutcome};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ComputationParams {
    Factorial { value: u64 },
    Divide { numerator: f64, divisor: f64 },
}

pub struct ComputationHandler;

#[async_trait]
impl CommandHandler for ComputationHandler {
    type Params = ComputationParams;
    type Result = Value;

    fn type_tag(&self) -> &'static str {
        "computation"
    }

    async fn execute(&self, _id: &str, params: Self::Params) -> HandlerOutcome<Self::Result> {
        match params {
            ComputationParams::Factorial { value } => {
                let product: u64 = (1..=value).product::<u64>().max(1);
                HandlerOutcome::Succeeded(json!({ "value": product }))
            }
            ComputationParams::Divide { numerator, divisor } => {
                if divisor == 0.0 {
                    HandlerOutcome::Failed("Division by zero".to_string())
                } else {
                    HandlerOutcome::Succeeded(json!({ "value": numerator / divisor }))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn factorial_of_five_is_120() {
        let outcome = ComputationHandler
            .execute("cmd-1", ComputationParams::Factorial { value: 5 })
            .await;
        match outcome {
            HandlerOutcome::Succeeded(v) => assert_eq!(v, json!({"value": 120})),
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn factorial_of_zero_is_one() {
        let outcome = ComputationHandler
            .execute("cmd-1", ComputationParams::Factorial { value: 0 })
            .await;
        match outcome {
            HandlerOutcome::Succeeded(v) => assert_eq!(v, json!({"value": 1})),
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn divide_by_zero_fails() {
        let outcome = ComputationHandler
            .execute(
                "cmd-1",
                ComputationParams::Divide {
                    numerator: 10.0,
                    divisor: 0.0,
                },
            )
            .await;
        match outcome {
            HandlerOutcome::Failed(msg) => assert_eq!(msg, "Division by zero"),
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn divide_by_nonzero_succeeds() {
        let outcome = ComputationHandler
            .execute(
                "cmd-1",
                ComputationParams::Divide {
                    numerator: 10.0,
                    divisor: 4.0,
                },
            )
            .await;
        match outcome {
            HandlerOutcome::Succeeded(v) => assert_eq!(v, json!({"value": 2.5})),
            _ => panic!("expected success"),
        }
    }
}
