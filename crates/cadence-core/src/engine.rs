//! Engine worker loop.
//!
//! One worker task owns the rule snapshot, the habit correlator and the
//! inactivity timer. Bus messages and timer firings are funnelled into that
//! task and handled strictly one at a time, so an inactivity reset can never
//! interleave with event processing.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::detection::{HabitCorrelator, TriggerMatcher};
use crate::dispatch::{Action, ActionDispatcher};
use crate::error::{CadenceError, CadenceResult};
use crate::events::{EventNormalizer, LogRecord, Normalized, RawMessage};
use crate::rules::{FileRuleStore, RuleSnapshot, RuleStore};
use crate::sink::{JsonlLogSink, LogSink};
use crate::timer::{InactivityTimer, TimerFired, TimerFiredReceiver};

/// Counters kept by the engine worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Messages submitted.
    pub received: u64,
    /// Messages turned into events.
    pub accepted: u64,
    /// Well-formed messages filtered out.
    pub dropped: u64,
    /// Messages that could not be parsed.
    pub malformed: u64,
    /// Trigger detections.
    pub triggers_fired: u64,
    /// Habit detections.
    pub habits_fired: u64,
    /// Habit completions outside their window.
    pub suppressed: u64,
    /// Inactivity resets.
    pub resets: u64,
    /// Reloads that kept the previous rules.
    pub failed_reloads: u64,
    /// Log appends that failed.
    pub sink_errors: u64,
    /// Actions that could not be delivered.
    pub dispatch_errors: u64,
    /// Version of the active rule snapshot.
    pub rules_version: u64,
}

enum EngineCommand {
    Message(String),
    Stats(oneshot::Sender<EngineStats>),
    Shutdown,
}

/// The habit and trigger detection engine.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use cadence_core::{ActionBus, Engine, EngineConfig};
///
/// let bus = ActionBus::new();
/// let engine = Engine::from_config(EngineConfig::default(), Arc::new(bus.clone()));
/// let handle = engine.start().await?;
///
/// handle.submit(r#"{"type": "3:alarm.set", "data": {"hour": 7}}"#).await?;
///
/// let stats = handle.shutdown().await?;
/// ```
pub struct Engine {
    config: EngineConfig,
    rules: Arc<dyn RuleStore>,
    sink: Arc<dyn LogSink>,
    dispatcher: Arc<dyn ActionDispatcher>,
}

impl Engine {
    /// Create an engine from its collaborators.
    pub fn new(
        config: EngineConfig,
        rules: Arc<dyn RuleStore>,
        sink: Arc<dyn LogSink>,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> Self {
        Self {
            config,
            rules,
            sink,
            dispatcher,
        }
    }

    /// Create an engine reading rules from the configured files and appending
    /// to the configured log.
    pub fn from_config(config: EngineConfig, dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        let rules = Arc::new(FileRuleStore::new(config.rules.clone()));
        let sink = Arc::new(JsonlLogSink::new(config.log_path.clone()));
        Self::new(config, rules, sink, dispatcher)
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load the rules and spawn the worker.
    ///
    /// Fails when the initial load fails; later reload failures are not fatal.
    pub async fn start(self) -> CadenceResult<EngineHandle> {
        let snapshot = self.rules.load().await?.with_version(1);
        info!(
            ignore = snapshot.ignore.len(),
            triggers = snapshot.triggers.len(),
            habits = snapshot.habits.len(),
            user_chosen = snapshot.user_chosen,
            "Rules loaded"
        );

        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let (timer, fired_rx) = InactivityTimer::spawn(self.config.reset_tracking_time());
        timer.rearm();

        let worker = Worker {
            correlator: HabitCorrelator::from_snapshot(&snapshot),
            stats: EngineStats {
                rules_version: snapshot.version,
                ..EngineStats::default()
            },
            snapshot,
            normalizer: EventNormalizer::new(),
            matcher: TriggerMatcher::new(),
            timer,
            dependency_check_sent: false,
            config: self.config,
            rules: self.rules,
            sink: self.sink,
            dispatcher: self.dispatcher,
        };

        info!(
            reset_tracking_secs = worker.config.reset_tracking_secs,
            "Engine started"
        );
        let task = tokio::spawn(worker.run(rx, fired_rx));

        Ok(EngineHandle {
            sender: EventSender { tx },
            task,
        })
    }
}

/// Cloneable handle for submitting bus messages to a running engine.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<EngineCommand>,
}

impl EventSender {
    /// Queue a raw bus message, waiting for room in the queue.
    pub async fn send(&self, message: impl Into<String>) -> CadenceResult<()> {
        self.tx
            .send(EngineCommand::Message(message.into()))
            .await
            .map_err(|_| CadenceError::internal("engine stopped"))
    }

    /// Whether the engine stopped accepting messages.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owner handle of a running engine.
pub struct EngineHandle {
    sender: EventSender,
    task: JoinHandle<EngineStats>,
}

impl EngineHandle {
    /// A sender for bus messages.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Queue a raw bus message.
    pub async fn submit(&self, message: impl Into<String>) -> CadenceResult<()> {
        self.sender.send(message).await
    }

    /// Snapshot of the engine counters, taken after every queued message.
    pub async fn stats(&self) -> CadenceResult<EngineStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .tx
            .send(EngineCommand::Stats(reply_tx))
            .await
            .map_err(|_| CadenceError::internal("engine stopped"))?;
        reply_rx
            .await
            .map_err(|_| CadenceError::internal("engine stopped"))
    }

    /// Stop the engine after the messages already queued.
    ///
    /// Returns the final counters.
    pub async fn shutdown(self) -> CadenceResult<EngineStats> {
        // The worker may already be gone; the join below reports that.
        let _ = self.sender.tx.send(EngineCommand::Shutdown).await;
        self.task
            .await
            .map_err(|e| CadenceError::internal(format!("engine worker failed: {}", e)))
    }
}

struct Worker {
    config: EngineConfig,
    rules: Arc<dyn RuleStore>,
    sink: Arc<dyn LogSink>,
    dispatcher: Arc<dyn ActionDispatcher>,
    snapshot: RuleSnapshot,
    correlator: HabitCorrelator,
    normalizer: EventNormalizer,
    matcher: TriggerMatcher,
    timer: InactivityTimer,
    dependency_check_sent: bool,
    stats: EngineStats,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<EngineCommand>,
        mut fired: TimerFiredReceiver,
    ) -> EngineStats {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(EngineCommand::Message(text)) => self.handle_message(&text).await,
                    Some(EngineCommand::Stats(reply)) => {
                        let _ = reply.send(self.stats.clone());
                    }
                    Some(EngineCommand::Shutdown) | None => break,
                },
                Some(firing) = fired.recv() => self.handle_inactivity(firing).await,
            }
        }

        commands.close();
        self.timer.shutdown();
        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "Failed to close event log");
        }

        info!(
            received = self.stats.received,
            accepted = self.stats.accepted,
            triggers_fired = self.stats.triggers_fired,
            habits_fired = self.stats.habits_fired,
            resets = self.stats.resets,
            "Engine stopped"
        );
        self.stats
    }

    async fn handle_message(&mut self, text: &str) {
        self.stats.received += 1;

        let raw = match RawMessage::parse(text) {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.malformed += 1;
                warn!(error = %e, "Discarding malformed bus message");
                return;
            }
        };

        let now = chrono::Local::now();
        let event = match self.normalizer.normalize(raw, &self.snapshot.ignore, now) {
            Normalized::Accepted(event) => event,
            Normalized::Dropped { kind, reason } => {
                self.stats.dropped += 1;
                debug!(kind = %kind, reason = %reason, "Event dropped");
                return;
            }
        };

        self.stats.accepted += 1;
        self.timer.rearm();
        debug!(kind = %event.kind, "Event accepted");

        if let Some(trigger_id) = self.matcher.match_event(&event, &self.snapshot.triggers) {
            self.stats.triggers_fired += 1;
            info!(trigger_id = %trigger_id, kind = %event.kind, "Trigger detected");
            self.dispatch(Action::TriggerDetected { trigger_id }).await;
        }

        let outcome = self.correlator.on_event(&event, now.time());
        for habit_index in outcome.detected {
            self.stats.habits_fired += 1;
            info!(habit_index = %habit_index, "Habit detected");
            self.dispatch(Action::HabitDetected { habit_index }).await;
        }
        for habit_index in outcome.suppressed {
            self.stats.suppressed += 1;
            debug!(habit_index = %habit_index, "Habit completed outside its window");
        }

        if let Err(e) = self.sink.append(&LogRecord::from(&event)).await {
            self.stats.sink_errors += 1;
            warn!(error = %e, kind = %event.kind, "Failed to append event to log");
        }
    }

    async fn handle_inactivity(&mut self, firing: TimerFired) {
        if !self.timer.is_current(&firing) {
            debug!(generation = firing.generation, "Ignoring stale inactivity firing");
            return;
        }
        // Stays disarmed until the next accepted event
        self.timer.cancel();
        self.stats.resets += 1;
        info!(
            quiet_secs = self.timer.period().as_secs(),
            "Inactivity reset"
        );

        if self.config.dependency_check && !self.dependency_check_sent {
            self.dependency_check_sent = true;
            self.dispatch(Action::DependencyCheck).await;
        }
        self.dispatch(Action::StartHabitMining).await;

        self.correlator.reset();
        match self.rules.load().await {
            Ok(snapshot) => {
                self.snapshot = snapshot.with_version(self.snapshot.version + 1);
                self.correlator = HabitCorrelator::from_snapshot(&self.snapshot);
                self.stats.rules_version = self.snapshot.version;
                info!(
                    version = self.snapshot.version,
                    triggers = self.snapshot.triggers.len(),
                    habits = self.snapshot.habits.len(),
                    "Rules reloaded"
                );
            }
            Err(e) => {
                self.stats.failed_reloads += 1;
                warn!(error = %e, "Rule reload failed, keeping previous rules");
            }
        }
    }

    async fn dispatch(&mut self, action: Action) {
        if let Err(e) = self.dispatcher.dispatch(&action).await {
            self.stats.dispatch_errors += 1;
            warn!(error = %e, utterance = %action.utterance(), "Failed to dispatch action");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::TriggerId;
    use crate::dispatch::MockActionDispatcher;
    use crate::rules::{InMemoryRuleStore, TriggerRule};
    use crate::sink::MockLogSink;
    use serde_json::json;
    use std::time::Duration;

    fn config(reset_secs: u64) -> EngineConfig {
        EngineConfig::builder()
            .reset_tracking_secs(reset_secs)
            .build()
    }

    fn alarm_store() -> Arc<InMemoryRuleStore> {
        Arc::new(InMemoryRuleStore::new(
            vec![],
            vec![TriggerRule::new("3:alarm.set").with_parameter("hour", json!(7))],
            vec![],
        ))
    }

    fn quiet_sink() -> MockLogSink {
        let mut sink = MockLogSink::new();
        sink.expect_close().returning(|| Ok(()));
        sink
    }

    #[tokio::test]
    async fn test_initial_load_failure_is_fatal() {
        let store = Arc::new(InMemoryRuleStore::default());
        store.set_failing(Some("habits.json is not JSON".to_string()));

        let engine = Engine::new(
            config(300),
            store,
            Arc::new(MockLogSink::new()),
            Arc::new(MockActionDispatcher::new()),
        );
        let err = engine.start().await.err().unwrap();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_dispatch_failure_still_logs_event() {
        let mut dispatcher = MockActionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|action| {
                *action
                    == Action::TriggerDetected {
                        trigger_id: TriggerId(0),
                    }
            })
            .times(1)
            .returning(|_| Err(CadenceError::dispatch("bus down")));

        let mut sink = quiet_sink();
        sink.expect_append()
            .withf(|record| record.kind == "3:alarm.set")
            .times(1)
            .returning(|_| Ok(()));

        let engine = Engine::new(config(300), alarm_store(), Arc::new(sink), Arc::new(dispatcher));
        let handle = engine.start().await.unwrap();
        handle
            .submit(r#"{"type": "3:alarm.set", "data": {"hour": 7}}"#)
            .await
            .unwrap();

        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.triggers_fired, 1);
        assert_eq!(stats.dispatch_errors, 1);
        assert_eq!(stats.sink_errors, 0);
    }

    #[tokio::test]
    async fn test_sink_failure_is_counted() {
        let mut sink = quiet_sink();
        sink.expect_append().times(2).returning(|_| {
            Err(CadenceError::sink_write(
                "disk full",
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ))
        });

        let engine = Engine::new(
            config(300),
            Arc::new(InMemoryRuleStore::default()),
            Arc::new(sink),
            Arc::new(MockActionDispatcher::new()),
        );
        let handle = engine.start().await.unwrap();
        handle.submit(r#"{"type": "3:a", "data": {}}"#).await.unwrap();
        handle.submit(r#"{"type": "3:b", "data": {}}"#).await.unwrap();

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.sink_errors, 2);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_and_dropped_counted() {
        let engine = Engine::new(
            config(300),
            Arc::new(InMemoryRuleStore::default()),
            Arc::new(quiet_sink()),
            Arc::new(MockActionDispatcher::new()),
        );
        let handle = engine.start().await.unwrap();
        handle.submit("not json").await.unwrap();
        handle.submit(r#"{"data": {}}"#).await.unwrap();
        handle
            .submit(r#"{"type": "speak", "data": {"utterance": "hi"}}"#)
            .await
            .unwrap();

        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.accepted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependency_check_disabled() {
        let mut dispatcher = MockActionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|action| *action == Action::StartHabitMining)
            .times(1)
            .returning(|_| Ok(()));

        let cfg = EngineConfig::builder()
            .reset_tracking_secs(60)
            .dependency_check(false)
            .build();
        let engine = Engine::new(
            cfg,
            Arc::new(InMemoryRuleStore::default()),
            Arc::new(quiet_sink()),
            Arc::new(dispatcher),
        );
        let handle = engine.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.resets, 1);
        assert_eq!(stats.rules_version, 2);
    }

    #[tokio::test]
    async fn test_sender_rejects_after_shutdown() {
        let engine = Engine::new(
            config(300),
            Arc::new(InMemoryRuleStore::default()),
            Arc::new(quiet_sink()),
            Arc::new(MockActionDispatcher::new()),
        );
        let handle = engine.start().await.unwrap();
        let sender = handle.sender();
        handle.shutdown().await.unwrap();

        assert!(sender.is_closed());
        assert!(sender.send(r#"{"type": "3:a"}"#).await.is_err());
    }
}
