//! Task envelope: the wire message produced by an external enqueuer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task type identifier ("email", "data", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The wire message: `{"task_id": ..., "type": ..., "payload": {...}}`.
///
/// Immutable once enqueued. `task_id` is the logical identity and is stable
/// across redeliveries; the queue-assigned delivery identity lives on
/// [`super::Delivery`], not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    task_id: String,
    #[serde(rename = "type")]
    task_type: TaskType,
    #[serde(default = "TaskEnvelope::empty_payload")]
    payload: serde_json::Value,
}

impl TaskEnvelope {
    pub fn new(
        task_id: impl Into<String>,
        task_type: TaskType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_type,
            payload,
        }
    }

    /// Parse a raw message body.
    ///
    /// Missing `task_id` or `type` is a parse failure; a missing `payload`
    /// defaults to an empty object.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Serialize back to a message body (producer side).
    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    fn empty_payload() -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_envelope() {
        let env = TaskEnvelope::parse(
            r#"{"task_id":"t1","type":"data","payload":{"operation":"sum","data":[1,2,3]}}"#,
        )
        .unwrap();

        assert_eq!(env.task_id(), "t1");
        assert_eq!(env.task_type().as_str(), "data");
        assert_eq!(env.payload()["operation"], "sum");
    }

    #[test]
    fn missing_payload_defaults_to_empty_object() {
        let env = TaskEnvelope::parse(r#"{"task_id":"t1","type":"email"}"#).unwrap();
        assert_eq!(env.payload(), &serde_json::json!({}));
    }

    #[test]
    fn missing_type_is_a_parse_failure() {
        assert!(TaskEnvelope::parse(r#"{"task_id":"t1","payload":{}}"#).is_err());
    }

    #[test]
    fn missing_task_id_is_a_parse_failure() {
        assert!(TaskEnvelope::parse(r#"{"type":"email","payload":{}}"#).is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_failure() {
        assert!(TaskEnvelope::parse("{not json").is_err());
    }

    #[test]
    fn body_round_trip_keeps_the_type_field_name() {
        let env = TaskEnvelope::new("t9", TaskType::new("report"), serde_json::json!({"n": 1}));
        let body = env.to_body().unwrap();
        assert!(body.contains(r#""type":"report""#));

        let back = TaskEnvelope::parse(&body).unwrap();
        assert_eq!(back.task_id(), "t9");
    }
}
