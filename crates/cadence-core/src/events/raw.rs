//! Schema of messages arriving from the message bus.

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, CadenceResult};
use crate::rules::Parameters;

/// A message as published on the bus.
///
/// Only `type` is required. `data` and `context` must be objects when present;
/// anything else is rejected as malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Message kind, e.g. `"3:alarm.set"` for an intent handler.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload.
    #[serde(default)]
    pub data: Option<Parameters>,
    /// Routing context.
    #[serde(default)]
    pub context: Option<Parameters>,
}

impl RawMessage {
    /// Create a message with the given kind and payload.
    pub fn new(kind: impl Into<String>, data: Parameters) -> Self {
        Self {
            kind: kind.into(),
            data: Some(data),
            context: None,
        }
    }

    /// Builder method to attach a context.
    pub fn with_context(mut self, context: Parameters) -> Self {
        self.context = Some(context);
        self
    }

    /// Parse a bus frame.
    pub fn parse(text: &str) -> CadenceResult<Self> {
        serde_json::from_str(text).map_err(|e| CadenceError::malformed_event(e.to_string()))
    }

    /// The non-null `context.target`, if any.
    ///
    /// A target marks a sub-dispatch of another in-flight event.
    pub fn context_target(&self) -> Option<&serde_json::Value> {
        self.context
            .as_ref()
            .and_then(|context| context.get("target"))
            .filter(|target| !target.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_parse_full_message() {
        let raw = RawMessage::parse(
            r#"{"type": "3:alarm.set", "data": {"hour": 7, "utterance": "wake me at 7"},
                "context": {"target": null}}"#,
        )
        .unwrap();
        assert_eq!(raw.kind, "3:alarm.set");
        assert_eq!(raw.data.as_ref().unwrap().get("hour"), Some(&json!(7)));
        assert!(raw.context_target().is_none());
    }

    #[test]
    fn test_parse_minimal_message() {
        let raw = RawMessage::parse(r#"{"type": "speak", "data": null}"#).unwrap();
        assert!(raw.data.is_none());
        assert!(raw.context.is_none());
    }

    #[test]
    fn test_context_target() {
        let raw = RawMessage::parse(
            r#"{"type": "3:alarm.set", "data": {}, "context": {"target": "cli"}}"#,
        )
        .unwrap();
        assert_eq!(raw.context_target(), Some(&json!("cli")));

        let no_key =
            RawMessage::parse(r#"{"type": "3:alarm.set", "context": {"source": "x"}}"#).unwrap();
        assert!(no_key.context_target().is_none());
    }

    #[test]
    fn test_malformed_messages() {
        for text in [
            "not json",
            r#"{"data": {}}"#,
            r#"{"type": 42}"#,
            r#"{"type": "3:a", "data": [1, 2]}"#,
            r#"{"type": "3:a", "context": "cli"}"#,
        ] {
            let err = RawMessage::parse(text).unwrap_err();
            assert_eq!(err.code(), ErrorCode::EvtMalformed, "{}", text);
        }
    }
}
