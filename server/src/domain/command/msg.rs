//! `CommandMsg` (§3.3): the minimal stream envelope used only to wake a
//! consumer. Authoritative state lives in the state store, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMsg {
    pub command_id: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let msg = CommandMsg {
            command_id: "cmd-1".into(),
            type_tag: "computation".into(),
            submitted_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: CommandMsg = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }
}
