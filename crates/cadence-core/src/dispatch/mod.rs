//! Outbound actions.
//!
//! Detections and inactivity resets turn into [`Action`]s. Each action is
//! rendered as a spoken-command utterance for the assistant and handed to an
//! [`ActionDispatcher`].

mod bus;

pub use bus::{ActionBus, ActionSubscriber};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detection::TriggerId;
use crate::error::CadenceResult;
use crate::rules::HabitIndex;

/// Utterance asking the assistant to install listener dependencies.
pub const DEPENDENCY_CHECK_UTTERANCE: &str = "listener skill dependencies install";

/// Utterance asking the assistant to mine new habits from the log.
pub const START_MINING_UTTERANCE: &str = "start habit mining";

/// Something the engine asks the assistant to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// A trigger rule matched an event.
    TriggerDetected { trigger_id: TriggerId },
    /// Every member of a habit occurred inside its window.
    HabitDetected { habit_index: HabitIndex },
    /// Inactivity elapsed; mine the log for new habits.
    StartHabitMining,
    /// First inactivity reset; check the listener's dependencies.
    DependencyCheck,
}

impl Action {
    /// The command utterance for this action.
    pub fn utterance(&self) -> String {
        match self {
            Self::TriggerDetected { trigger_id } => {
                format!("trigger detected number {}", trigger_id)
            }
            Self::HabitDetected { habit_index } => {
                format!("habit detected number {}", habit_index.0)
            }
            Self::StartHabitMining => START_MINING_UTTERANCE.to_string(),
            Self::DependencyCheck => DEPENDENCY_CHECK_UTTERANCE.to_string(),
        }
    }
}

/// An emitted action with its identity and emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    /// Unique emission id
    pub id: Uuid,
    /// The action
    pub action: Action,
    /// When it was emitted
    pub emitted_at: DateTime<Utc>,
}

impl ActionEnvelope {
    /// Wrap an action stamped with the current time.
    pub fn new(action: Action) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            emitted_at: Utc::now(),
        }
    }

    /// The command utterance of the wrapped action.
    pub fn utterance(&self) -> String {
        self.action.utterance()
    }
}

/// Delivers actions to the assistant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Deliver one action. Errors are reported to the caller and never retried.
    async fn dispatch(&self, action: &Action) -> CadenceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_utterances() {
        assert_eq!(
            Action::TriggerDetected {
                trigger_id: TriggerId(0)
            }
            .utterance(),
            "trigger detected number 0"
        );
        assert_eq!(
            Action::HabitDetected {
                habit_index: HabitIndex(4)
            }
            .utterance(),
            "habit detected number 4"
        );
        assert_eq!(Action::StartHabitMining.utterance(), "start habit mining");
        assert_eq!(
            Action::DependencyCheck.utterance(),
            "listener skill dependencies install"
        );
    }

    #[test]
    fn test_action_serialization() {
        let value = serde_json::to_value(Action::HabitDetected {
            habit_index: HabitIndex(2),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "habit_detected", "habit_index": 2}));

        let parsed: Action = serde_json::from_value(json!({"type": "start_habit_mining"})).unwrap();
        assert_eq!(parsed, Action::StartHabitMining);
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        let a = ActionEnvelope::new(Action::StartHabitMining);
        let b = ActionEnvelope::new(Action::StartHabitMining);
        assert_ne!(a.id, b.id);
        assert_eq!(a.utterance(), "start habit mining");
    }
}
