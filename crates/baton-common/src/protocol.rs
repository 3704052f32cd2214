//! Delegation wire messages.
//!
//! A request and its reply are bound by `correlation_id`. The task payload and
//! reply payload are opaque JSON to the transport; only the channel façade
//! interprets the reply payload, by validating it against
//! `expected_response_schema`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::schema::SchemaId;

/// Request sent to the external executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationEnvelope {
    pub correlation_id: String,
    pub task_payload: Value,
    pub expected_response_schema: SchemaId,
    pub timeout_ms: u64,
}

impl DelegationEnvelope {
    pub fn new(task_payload: Value, expected_response_schema: SchemaId, timeout_ms: u64) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            task_payload,
            expected_response_schema,
            timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Same task under a fresh correlation id, for a retry attempt.
    ///
    /// A late reply to the previous attempt carries the old id and is
    /// therefore never mistaken for a reply to this one.
    pub fn reissue(&self) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            ..self.clone()
        }
    }
}

/// Optional handoff note the executor may attach to a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffNote {
    pub summary: String,
    #[serde(default)]
    pub pending_items: Vec<String>,
}

/// Reply received from the external executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationReply {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<HandoffNote>,
}

impl DelegationReply {
    pub fn success(correlation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            payload: Some(payload),
            error: None,
            handoff: None,
        }
    }

    pub fn failure(correlation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            payload: None,
            error: Some(error.into()),
            handoff: None,
        }
    }

    pub fn with_handoff(mut self, note: HandoffNote) -> Self {
        self.handoff = Some(note);
        self
    }

    /// A reply must carry either a payload or an error, not both and not neither.
    pub fn is_well_formed(&self) -> bool {
        self.payload.is_some() != self.error.is_some()
    }
}

/// Self-describing frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireMessage {
    Request(DelegationEnvelope),
    Reply(DelegationReply),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reissue_changes_only_the_correlation_id() {
        let env = DelegationEnvelope::new(json!({"task": "x"}), SchemaId::v1("research"), 500);
        let retry = env.reissue();
        assert_ne!(env.correlation_id, retry.correlation_id);
        assert_eq!(env.task_payload, retry.task_payload);
        assert_eq!(retry.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn wire_message_is_tagged() {
        let reply = DelegationReply::success("abc", json!({"ok": true}));
        let value = serde_json::to_value(WireMessage::Reply(reply)).unwrap();
        assert_eq!(value["kind"], "reply");
        assert_eq!(value["correlation_id"], "abc");
    }

    #[test]
    fn reply_well_formedness() {
        assert!(DelegationReply::success("a", json!({})).is_well_formed());
        assert!(DelegationReply::failure("a", "nope").is_well_formed());
        let empty = DelegationReply {
            correlation_id: "a".into(),
            payload: None,
            error: None,
            handoff: None,
        };
        assert!(!empty.is_well_formed());
    }
}
