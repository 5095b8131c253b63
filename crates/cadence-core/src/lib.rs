//! cadence-core - Habit and trigger detection over voice-assistant intents.
//!
//! The engine listens to intent invocations from an assistant's message bus,
//! logs every accepted invocation, fires an action when a single invocation
//! matches a trigger rule, and fires an action when every intent of a habit
//! has occurred since the last inactivity reset.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cadence_core::{ActionBus, Engine, EngineConfig};
//!
//! let bus = ActionBus::new();
//! let mut actions = bus.subscribe();
//!
//! let engine = Engine::from_config(EngineConfig::from_env(), Arc::new(bus.clone()));
//! let handle = engine.start().await?;
//!
//! handle.submit(r#"{"type": "3:alarm.set", "data": {"hour": 7}}"#).await?;
//! if let Some(action) = actions.recv().await {
//!     println!("{}", action.utterance());
//! }
//! ```

pub mod config;
pub mod detection;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod rules;
pub mod sink;
pub mod timer;

// Re-export commonly used types
pub use config::{EngineConfig, EngineConfigBuilder, RuleFiles};
pub use detection::{CorrelationOutcome, HabitCorrelator, TriggerId, TriggerMatcher};
pub use dispatch::{Action, ActionBus, ActionDispatcher, ActionEnvelope, ActionSubscriber};
pub use engine::{Engine, EngineHandle, EngineStats, EventSender};
pub use error::{CadenceError, CadenceResult, ErrorCode};
pub use events::{DropReason, Event, EventNormalizer, LogRecord, Normalized, RawMessage};
pub use rules::{
    FileRuleStore, Habit, HabitDefinition, HabitIndex, HabitMember, IgnoreRule, InMemoryRuleStore,
    Parameters, RuleSnapshot, RuleStore, TimeWindow, TriggerRule,
};
pub use sink::{read_log_file, read_log_records, JsonlLogSink, LogSink, ReadStats};
pub use timer::{InactivityTimer, TimerFired};
