//! Pattern detection over normalized events.
//!
//! - `TriggerMatcher`: stateless, fires on a single matching event
//! - `HabitCorrelator`: stateful, fires once every member of a habit occurred

mod habit;
mod trigger;

pub use habit::{member_matches, CorrelationOutcome, HabitCorrelator};
pub use trigger::{TriggerId, TriggerMatcher};
