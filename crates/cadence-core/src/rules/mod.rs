//! Rule sets consulted by the engine.
//!
//! Three documents drive detection:
//! - the ignore list: intent kinds that are dropped before anything else
//! - triggers: single-event rules
//! - habits: sets of intents that must all occur since the last reset

mod store;
mod types;

pub use store::{FileRuleStore, InMemoryRuleStore, RuleStore};
pub use types::{
    parameters_equal, parse_time_of_day, values_equal, Habit, HabitDefinition, HabitIndex,
    HabitMember, IgnoreRule, IgnoreRuleDef, Parameters, RuleSnapshot, TimeWindow, TriggerRule,
};
