//! Handler registration and dispatch (§3.4, §9 "Dynamic dispatch").
//!
//! Handler authors implement the typed [`CommandHandler`] trait against
//! concrete `Params`/`Result` types. The registry itself can't hold a
//! heterogeneous collection of `CommandHandler` trait objects directly
//! (associated types make it non-object-safe), so each registered handler is
//! wrapped in a [`HandlerAdapter`] that implements the object-safe
//! [`DynCommandHandler`] trait over raw [`serde_json::Value`] — option (b)
//! from §9's "Dynamic dispatch" note: the registry is typed via a trait
//! whose methods take/return raw values, with decode/encode internalized by
//! the adapter rather than the registry.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::result::CommandResult;
use super::state::CommandState;
use crate::core::EngineError;

/// Outcome of a typed handler call, mirroring [`CommandResult`] but keeping
/// `Result::Succeeded`'s payload as the handler's own concrete type instead
/// of `Value` — handler authors never see JSON directly.
pub enum HandlerOutcome<R> {
    Running,
    Succeeded(R),
    Failed(String),
    Cancelled,
}

/// A typed command handler (§3.4). One implementation per registered
/// `type_tag`.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    type Params: DeserializeOwned + Send + Sync + 'static;
    type Result: Serialize + Send + Sync + 'static;

    /// The type tag this handler registers under.
    fn type_tag(&self) -> &'static str;

    /// Synchronous execution (§4.F step 5). Returning `Running` promotes the
    /// command to the polling path driven by `check_status`.
    async fn execute(&self, id: &str, params: Self::Params) -> HandlerOutcome<Self::Result>;

    /// Called on redelivery while the command is `RUNNING` (§4.F step 5).
    /// `state` is the freshly-loaded record, so a handler that wants to
    /// notice a concurrent `cancel` can inspect `state.status` here (§9
    /// open question (b)) — the engine does not force this check.
    ///
    /// Default keeps polling forever; override for handlers whose external
    /// job can actually resolve.
    async fn check_status(
        &self,
        _id: &str,
        _params: &Self::Params,
        _state: &CommandState,
    ) -> HandlerOutcome<Self::Result> {
        HandlerOutcome::Running
    }
}

/// Object-safe dispatch surface held by [`HandlerRegistry`]. Operates on raw
/// `Value`; a decode failure is reported the same way a handler panic is
/// (`Err(String)`) because the consume loop treats both as a terminal
/// failure (§4.F steps 4 and 5 share one failure path).
#[async_trait]
pub trait DynCommandHandler: Send + Sync {
    fn type_tag(&self) -> &'static str;

    async fn execute(&self, id: &str, params: Value) -> Result<CommandResult, String>;

    async fn check_status(
        &self,
        id: &str,
        params: Value,
        state: &CommandState,
    ) -> Result<CommandResult, String>;
}

/// Bridges a typed [`CommandHandler`] to the object-safe [`DynCommandHandler`].
pub struct HandlerAdapter<H>(pub H);

fn decode_params<P: DeserializeOwned>(type_tag: &str, params: Value) -> Result<P, String> {
    serde_json::from_value(params)
        .map_err(|e| format!("params decode failed for type '{type_tag}': {e}"))
}

fn encode_outcome<R: Serialize>(outcome: HandlerOutcome<R>) -> CommandResult {
    match outcome {
        HandlerOutcome::Running => CommandResult::Running,
        HandlerOutcome::Succeeded(value) => match serde_json::to_value(value) {
            Ok(v) => CommandResult::Succeeded(v),
            Err(e) => CommandResult::Failed(format!("result encode failed: {e}")),
        },
        HandlerOutcome::Failed(error) => CommandResult::Failed(error),
        HandlerOutcome::Cancelled => CommandResult::Cancelled,
    }
}

#[async_trait]
impl<H: CommandHandler> DynCommandHandler for HandlerAdapter<H> {
    fn type_tag(&self) -> &'static str {
        self.0.type_tag()
    }

    async fn execute(&self, id: &str, params: Value) -> Result<CommandResult, String> {
        let typed = decode_params::<H::Params>(self.0.type_tag(), params)?;
        Ok(encode_outcome(self.0.execute(id, typed).await))
    }

    async fn check_status(
        &self,
        id: &str,
        params: Value,
        state: &CommandState,
    ) -> Result<CommandResult, String> {
        let typed = decode_params::<H::Params>(self.0.type_tag(), params)?;
        Ok(encode_outcome(self.0.check_status(id, &typed, state).await))
    }
}

/// Concurrent `typeTag -> handler` map (§3.4, §5 "Handler registry").
/// Writes happen at startup, reads on the hot path.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn DynCommandHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Overwriting an existing tag is an error (§4.F).
    pub fn register<H: CommandHandler>(&self, handler: H) -> Result<(), EngineError> {
        let tag = handler.type_tag();
        match self.handlers.entry(tag.to_string()) {
            Entry::Occupied(_) => Err(EngineError::Handler(format!(
                "handler already registered for type '{tag}'"
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(HandlerAdapter(handler)));
                Ok(())
            }
        }
    }

    pub fn get(&self, type_tag: &str) -> Option<Arc<dyn DynCommandHandler>> {
        self.handlers.get(type_tag).map(|entry| Arc::clone(&entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct EchoParams {
        value: i64,
    }

    #[derive(Serialize)]
    struct EchoResult {
        value: i64,
    }

    struct EchoHandler;

    #[async_trait]
    impl CommandHandler for EchoHandler {
        type Params = EchoParams;
        type Result = EchoResult;

        fn type_tag(&self) -> &'static str {
            "echo"
        }

        async fn execute(&self, _id: &str, params: Self::Params) -> HandlerOutcome<Self::Result> {
            HandlerOutcome::Succeeded(EchoResult { value: params.value })
        }
    }

    #[tokio::test]
    async fn adapter_round_trips_params_and_result() {
        let adapter = HandlerAdapter(EchoHandler);
        let result = adapter
            .execute("cmd-1", json!({"value": 7}))
            .await
            .unwrap();
        assert_eq!(result, CommandResult::Succeeded(json!({"value": 7})));
    }

    #[tokio::test]
    async fn adapter_reports_param_decode_failure() {
        let adapter = HandlerAdapter(EchoHandler);
        let err = adapter
            .execute("cmd-1", json!({"not_value": "oops"}))
            .await
            .unwrap_err();
        assert!(err.contains("echo"));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_type_tag() {
        let registry = HandlerRegistry::new();
        registry.register(EchoHandler).unwrap();
        let err = registry.register(EchoHandler).unwrap_err();
        assert!(matches!(err, EngineError::Handler(_)));
    }

    #[tokio::test]
    async fn get_resolves_registered_handler_by_tag() {
        let registry = HandlerRegistry::new();
        registry.register(EchoHandler).unwrap();
        let handler = registry.get("echo").unwrap();
        assert_eq!(handler.type_tag(), "echo");
        assert!(registry.get("missing").is_none());
    }
}
