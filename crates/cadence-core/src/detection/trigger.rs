//! Single-event trigger matching.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::events::Event;
use crate::rules::{values_equal, TriggerRule};

/// Identity of a trigger rule: its position in the trigger document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(pub usize);

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stateless trigger matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerMatcher;

impl TriggerMatcher {
    /// Create a matcher.
    pub fn new() -> Self {
        Self
    }

    /// Whether a single rule matches the event.
    ///
    /// Kinds must be equal and every required parameter must be present with
    /// an equal value. Extra event parameters are ignored.
    pub fn rule_matches(rule: &TriggerRule, event: &Event) -> bool {
        rule.intent_kind == event.kind
            && rule.required_parameters.iter().all(|(name, required)| {
                event
                    .parameters
                    .get(name)
                    .is_some_and(|actual| values_equal(actual, required))
            })
    }

    /// The first matching rule, in rule order.
    pub fn match_event(&self, event: &Event, rules: &[TriggerRule]) -> Option<TriggerId> {
        rules
            .iter()
            .position(|rule| Self::rule_matches(rule, event))
            .map(TriggerId)
    }

    /// Every matching rule, in rule order.
    pub fn match_all(&self, event: &Event, rules: &[TriggerRule]) -> Vec<TriggerId> {
        rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| Self::rule_matches(rule, event))
            .map(|(id, _)| TriggerId(id))
            .collect()
    }
}
