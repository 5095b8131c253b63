//! Normalized intent events and their log projection.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::rules::Parameters;

/// Utterance recorded when the event carried none.
pub const NO_UTTERANCE: &str = "No voice command";

/// Payload keys removed during normalization.
pub const STRIPPED_DATA_KEYS: [&str; 5] =
    ["confidence", "target", "__tags__", "utterance", "intent_type"];

/// Format of the `datetime` field in log records.
pub const LOG_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A canonical intent invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Intent kind.
    pub kind: String,
    /// Skill parameters, bookkeeping keys removed.
    pub parameters: Parameters,
    /// Routing context of the bus message.
    pub context: Option<Parameters>,
    /// Spoken command that caused the event.
    pub utterance: String,
    /// When the event was normalized.
    pub occurred_at: DateTime<Local>,
}

/// One line of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Intent kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Skill parameters.
    pub parameters: Parameters,
    /// Spoken command.
    pub utterance: String,
    /// Local time of the event.
    pub datetime: String,
}

impl From<&Event> for LogRecord {
    fn from(event: &Event) -> Self {
        Self {
            kind: event.kind.clone(),
            parameters: event.parameters.clone(),
            utterance: event.utterance.clone(),
            datetime: event.occurred_at.format(LOG_DATETIME_FORMAT).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_log_record_shape() {
        let event = Event {
            kind: "3:alarm.set".to_string(),
            parameters: json!({"hour": 7}).as_object().cloned().unwrap(),
            context: None,
            utterance: "wake me at seven".to_string(),
            occurred_at: Local.with_ymd_and_hms(2018, 3, 14, 7, 5, 9).unwrap(),
        };

        let record = LogRecord::from(&event);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "3:alarm.set");
        assert_eq!(value["parameters"], json!({"hour": 7}));
        assert_eq!(value["utterance"], "wake me at seven");
        assert_eq!(value["datetime"], "2018-03-14 07:05:09.000000");
        assert!(value.get("context").is_none());
        assert!(value.get("data").is_none());
    }
}
