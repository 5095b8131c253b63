//! Habit correlation.
//!
//! Each tracked habit carries one `occurred` flag per member intent. A member
//! is satisfied by an event with the same kind and exactly the same
//! parameters. Once every flag is set the habit is complete; completion fires
//! only when the habit has no window or the check instant is inside it.

use chrono::NaiveTime;

use crate::events::Event;
use crate::rules::{parameters_equal, Habit, HabitIndex, HabitMember, RuleSnapshot};

/// Runtime progress of one habit.
#[derive(Debug, Clone)]
struct HabitProgress {
    habit: Habit,
    occurred: Vec<bool>,
}

impl HabitProgress {
    fn new(habit: Habit) -> Self {
        let occurred = vec![false; habit.members.len()];
        Self { habit, occurred }
    }

    fn is_complete(&self) -> bool {
        self.occurred.iter().all(|flag| *flag)
    }

    fn reset(&mut self) {
        self.occurred.iter_mut().for_each(|flag| *flag = false);
    }
}

/// Whether a habit member is satisfied by an event.
pub fn member_matches(member: &HabitMember, event: &Event) -> bool {
    member.name == event.kind && parameters_equal(&member.parameters, &event.parameters)
}

/// Result of feeding one event to the correlator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationOutcome {
    /// Habits with at least one member matched by the event.
    pub matched: Vec<HabitIndex>,
    /// Habits that completed inside their window (or have none).
    pub detected: Vec<HabitIndex>,
    /// Habits that completed outside their window.
    pub suppressed: Vec<HabitIndex>,
}

impl CorrelationOutcome {
    /// Whether the event touched no habit.
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }
}

/// Tracks member occurrence for every automatically detected habit.
#[derive(Debug, Clone, Default)]
pub struct HabitCorrelator {
    progress: Vec<HabitProgress>,
}

impl HabitCorrelator {
    /// Start tracking the given habits with every flag cleared.
    pub fn new(habits: Vec<Habit>) -> Self {
        Self {
            progress: habits.into_iter().map(HabitProgress::new).collect(),
        }
    }

    /// Start tracking the habits of a snapshot.
    pub fn from_snapshot(snapshot: &RuleSnapshot) -> Self {
        Self::new(snapshot.habits.clone())
    }

    /// Record an event and evaluate completion of every habit it touched.
    ///
    /// `now` is the time of day used for window checks.
    pub fn on_event(&mut self, event: &Event, now: NaiveTime) -> CorrelationOutcome {
        let mut outcome = CorrelationOutcome::default();

        for progress in &mut self.progress {
            let mut touched = false;
            for (member, occurred) in progress.habit.members.iter().zip(&mut progress.occurred) {
                if member_matches(member, event) {
                    *occurred = true;
                    touched = true;
                }
            }

            if !touched {
                continue;
            }
            let index = progress.habit.index;
            outcome.matched.push(index);

            if !progress.is_complete() {
                continue;
            }
            match progress.habit.window {
                Some(window) if !window.contains(now) => outcome.suppressed.push(index),
                _ => outcome.detected.push(index),
            }
        }

        outcome
    }

    /// Clear every member flag.
    pub fn reset(&mut self) {
        self.progress.iter_mut().for_each(HabitProgress::reset);
    }

    /// Whether every member of a habit has occurred.
    pub fn is_complete(&self, index: HabitIndex) -> bool {
        self.find(index).is_some_and(HabitProgress::is_complete)
    }

    /// Occurred and total member counts for a habit.
    pub fn progress(&self, index: HabitIndex) -> Option<(usize, usize)> {
        self.find(index).map(|p| {
            (
                p.occurred.iter().filter(|flag| **flag).count(),
                p.occurred.len(),
            )
        })
    }

    /// Whether any member flag is set.
    pub fn has_progress(&self) -> bool {
        self.progress
            .iter()
            .any(|p| p.occurred.iter().any(|flag| *flag))
    }

    /// Number of tracked habits.
    pub fn len(&self) -> usize {
        self.progress.len()
    }

    /// Whether no habit is tracked.
    pub fn is_empty(&self) -> bool {
        self.progress.is_empty()
    }

    fn find(&self, index: HabitIndex) -> Option<&HabitProgress> {
        self.progress.iter().find(|p| p.habit.index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{HabitDefinition, TimeWindow};
    use chrono::Local;
    use serde_json::json;

    fn event(kind: &str, parameters: serde_json::Value) -> Event {
        Event {
            kind: kind.to_string(),
            parameters: parameters.as_object().cloned().unwrap(),
            context: None,
            utterance: String::new(),
            occurred_at: Local::now(),
        }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn habit(index: usize, members: serde_json::Value) -> Habit {
        let def: HabitDefinition = serde_json::from_value(json!({
            "intents": members,
            "user_choice": false
        }))
        .unwrap();
        Habit::from_definition(index, &def).unwrap()
    }

    fn morning_routine() -> Habit {
        habit(
            4,
            json!([
                {"name": "3:lights.on", "parameters": {"room": "kitchen"}},
                {"name": "5:coffee.make", "parameters": {}},
                {"name": "7:news.play", "parameters": {"station": "bbc"}}
            ]),
        )
    }

    #[test]
    fn test_completes_in_any_order() {
        let mut correlator = HabitCorrelator::new(vec![morning_routine()]);
        let noon = at(12, 0);

        let first = correlator.on_event(&event("7:news.play", json!({"station": "bbc"})), noon);
        assert_eq!(first.matched, vec![HabitIndex(4)]);
        assert!(first.detected.is_empty());

        let second = correlator.on_event(&event("3:lights.on", json!({"room": "kitchen"})), noon);
        assert!(second.detected.is_empty());
        assert_eq!(correlator.progress(HabitIndex(4)), Some((2, 3)));

        let third = correlator.on_event(&event("5:coffee.make", json!({})), noon);
        assert_eq!(third.detected, vec![HabitIndex(4)]);
        assert!(correlator.is_complete(HabitIndex(4)));
    }

    #[test]
    fn test_member_parameters_must_match_exactly() {
        let mut correlator = HabitCorrelator::new(vec![morning_routine()]);

        let superset = correlator.on_event(
            &event("3:lights.on", json!({"room": "kitchen", "level": 50})),
            at(8, 0),
        );
        assert!(superset.is_empty());

        let subset = correlator.on_event(&event("7:news.play", json!({})), at(8, 0));
        assert!(subset.is_empty());
        assert!(!correlator.has_progress());
    }

    #[test]
    fn test_repeated_member_does_not_complete() {
        let mut correlator = HabitCorrelator::new(vec![morning_routine()]);
        for _ in 0..3 {
            correlator.on_event(&event("5:coffee.make", json!({})), at(8, 0));
        }
        assert_eq!(correlator.progress(HabitIndex(4)), Some((1, 3)));
        assert!(!correlator.is_complete(HabitIndex(4)));
    }

    #[test]
    fn test_window_gates_completion() {
        let mut windowed = morning_routine();
        windowed.window = Some(TimeWindow::from_minutes("10:00", 15.0).unwrap());

        let mut inside = HabitCorrelator::new(vec![windowed.clone()]);
        inside.on_event(&event("3:lights.on", json!({"room": "kitchen"})), at(10, 0));
        inside.on_event(&event("5:coffee.make", json!({})), at(10, 5));
        let fired = inside.on_event(&event("7:news.play", json!({"station": "bbc"})), at(10, 10));
        assert_eq!(fired.detected, vec![HabitIndex(4)]);

        let mut outside = HabitCorrelator::new(vec![windowed]);
        outside.on_event(&event("3:lights.on", json!({"room": "kitchen"})), at(10, 0));
        outside.on_event(&event("5:coffee.make", json!({})), at(10, 5));
        let late = outside.on_event(&event("7:news.play", json!({"station": "bbc"})), at(10, 20));
        assert!(late.detected.is_empty());
        assert_eq!(late.suppressed, vec![HabitIndex(4)]);
        // Flags stay set after a suppressed completion
        assert!(outside.is_complete(HabitIndex(4)));
    }

    #[test]
    fn test_completed_habit_fires_again_on_member_repeat() {
        let mut correlator = HabitCorrelator::new(vec![morning_routine()]);
        correlator.on_event(&event("3:lights.on", json!({"room": "kitchen"})), at(9, 0));
        correlator.on_event(&event("5:coffee.make", json!({})), at(9, 0));
        correlator.on_event(&event("7:news.play", json!({"station": "bbc"})), at(9, 0));

        let again = correlator.on_event(&event("5:coffee.make", json!({})), at(9, 1));
        assert_eq!(again.detected, vec![HabitIndex(4)]);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut correlator = HabitCorrelator::new(vec![morning_routine()]);
        correlator.on_event(&event("5:coffee.make", json!({})), at(9, 0));
        assert!(correlator.has_progress());

        correlator.reset();
        assert!(!correlator.has_progress());
        correlator.reset();
        assert!(!correlator.has_progress());
        assert_eq!(correlator.progress(HabitIndex(4)), Some((0, 3)));
    }

    #[test]
    fn test_event_can_advance_several_habits() {
        let a = habit(0, json!([{"name": "5:coffee.make", "parameters": {}}]));
        let b = habit(
            1,
            json!([
                {"name": "5:coffee.make", "parameters": {}},
                {"name": "3:lights.off", "parameters": {}}
            ]),
        );
        let mut correlator = HabitCorrelator::new(vec![a, b]);

        let outcome = correlator.on_event(&event("5:coffee.make", json!({})), at(7, 0));
        assert_eq!(outcome.matched, vec![HabitIndex(0), HabitIndex(1)]);
        assert_eq!(outcome.detected, vec![HabitIndex(0)]);
    }

    #[test]
    fn test_unknown_habit_index() {
        let correlator = HabitCorrelator::new(vec![morning_routine()]);
        assert!(!correlator.is_complete(HabitIndex(99)));
        assert!(correlator.progress(HabitIndex(99)).is_none());
        assert_eq!(correlator.len(), 1);
    }
}
