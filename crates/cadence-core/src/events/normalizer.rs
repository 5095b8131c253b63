//! Event normalization.
//!
//! Filters bus traffic down to automatically dispatched intent invocations
//! and reshapes each one into an [`Event`].

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::events::{Event, RawMessage, NO_UTTERANCE, STRIPPED_DATA_KEYS};
use crate::rules::IgnoreRule;

/// Intent handler kinds look like `<skill id>:<handler>`.
static INTENT_KIND: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+:.+").unwrap());

/// Why a message was not turned into an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Not an intent handler invocation.
    NotAnIntent,
    /// Covered by an ignore rule.
    Ignored { rule: String },
    /// Sub-dispatch of another in-flight event.
    SubDispatch,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnIntent => write!(f, "not an intent"),
            Self::Ignored { rule } => write!(f, "ignored by rule '{}'", rule),
            Self::SubDispatch => write!(f, "context target set"),
        }
    }
}

/// Outcome of normalizing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// The message became an event.
    Accepted(Event),
    /// The message was discarded.
    Dropped { kind: String, reason: DropReason },
}

impl Normalized {
    /// The accepted event, if any.
    pub fn accepted(self) -> Option<Event> {
        match self {
            Self::Accepted(event) => Some(event),
            Self::Dropped { .. } => None,
        }
    }
}

/// Stateless message normalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventNormalizer;

impl EventNormalizer {
    /// Create a normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Whether `kind` has the shape of an intent handler invocation.
    pub fn is_intent_kind(kind: &str) -> bool {
        INTENT_KIND.is_match(kind)
    }

    /// Normalize a message.
    ///
    /// Checks run in order: intent shape, ignore rules, context target.
    pub fn normalize(
        &self,
        raw: RawMessage,
        ignore: &[IgnoreRule],
        now: DateTime<Local>,
    ) -> Normalized {
        if !Self::is_intent_kind(&raw.kind) {
            return Normalized::Dropped {
                kind: raw.kind,
                reason: DropReason::NotAnIntent,
            };
        }

        if let Some(rule) = ignore.iter().find(|rule| rule.matches(&raw.kind)) {
            return Normalized::Dropped {
                kind: raw.kind,
                reason: DropReason::Ignored {
                    rule: rule.to_string(),
                },
            };
        }

        if raw.context_target().is_some() {
            return Normalized::Dropped {
                kind: raw.kind,
                reason: DropReason::SubDispatch,
            };
        }

        let mut parameters = raw.data.unwrap_or_default();
        let utterance = match parameters.get("utterance") {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(serde_json::Value::Null) | None => NO_UTTERANCE.to_string(),
            Some(other) => other.to_string(),
        };
        for key in STRIPPED_DATA_KEYS {
            parameters.remove(key);
        }

        Normalized::Accepted(Event {
            kind: raw.kind,
            parameters,
            context: raw.context,
            utterance,
            occurred_at: now,
        })
    }
}
