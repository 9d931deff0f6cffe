//! Encode/decode for the persisted [`CommandState`] blob (§4.C, the "C
//! Serializer" component).
//!
//! `params`/`result` are carried as raw `serde_json::Value`, which already
//! preserves the original JSON shape with no external type hint — there is
//! no separate `@type` discriminator field to maintain. The registered
//! handler's declared `Params` type (applied in `handler::HandlerAdapter`)
//! is the cross-check the spec calls for; this module is only the choke
//! point through which every persisted blob passes, so a future change of
//! on-wire format (e.g. msgpack) touches one file.

use super::state::CommandState;
use crate::core::EngineError;

pub fn encode(state: &CommandState) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec(state).map_err(|e| EngineError::Serialization(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<CommandState, EngineError> {
    serde_json::from_slice(bytes).map_err(|e| EngineError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_preserves_params_and_type() {
        let state = CommandState::submitted(
            "cmd-1",
            "computation",
            json!({"op": "factorial", "value": 5}),
        );
        let bytes = encode(&state).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn round_trip_preserves_result_shape() {
        let state = CommandState::submitted("cmd-1", "computation", json!({}))
            .started()
            .completed(json!({"value": 120}));
        let decoded = decode(&encode(&state).unwrap()).unwrap();
        assert_eq!(decoded.result, Some(json!({"value": 120})));
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        assert!(decode(b"not json").is_err());
    }

    #[test]
    fn decode_ignores_unknown_fields() {
        let raw = serde_json::json!({
            "id": "cmd-1",
            "type": "computation",
            "status": "SUBMITTED",
            "params": {},
            "created_at": "2024-01-01T00:00:00Z",
            "from_a_newer_producer": "ignored",
        });
        let decoded = decode(raw.to_string().as_bytes()).unwrap();
        assert_eq!(decoded.id, "cmd-1");
    }
}
