//! Action bus using a tokio broadcast channel.
//!
//! The engine dispatches into the bus and every subscriber (the message bus
//! client, tests, audit sinks) receives its own copy. Slow subscribers miss
//! actions rather than blocking the engine.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{Action, ActionDispatcher, ActionEnvelope};
use crate::error::{CadenceError, CadenceResult};

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast fan-out of emitted actions.
#[derive(Clone)]
pub struct ActionBus {
    sender: broadcast::Sender<ActionEnvelope>,
}

impl ActionBus {
    /// Create a bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to actions emitted after this call.
    pub fn subscribe(&self) -> ActionSubscriber {
        ActionSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Emit an action, returning how many subscribers received it.
    pub fn emit(&self, action: Action) -> usize {
        self.sender.send(ActionEnvelope::new(action)).unwrap_or(0)
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ActionBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionDispatcher for ActionBus {
    async fn dispatch(&self, action: &Action) -> CadenceResult<()> {
        match self.emit(*action) {
            0 => Err(CadenceError::dispatch(format!(
                "no subscriber for '{}'",
                action.utterance()
            ))),
            _ => Ok(()),
        }
    }
}

/// Receiving end of an [`ActionBus`].
pub struct ActionSubscriber {
    receiver: broadcast::Receiver<ActionEnvelope>,
}

impl ActionSubscriber {
    /// Receive the next action.
    ///
    /// Returns None once every bus handle was dropped.
    pub async fn recv(&mut self) -> Option<ActionEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Action subscriber lagged by {} actions", n);
                    continue;
                }
            }
        }
    }

    /// Receive an action without waiting.
    pub fn try_recv(&mut self) -> Option<ActionEnvelope> {
        self.receiver.try_recv().ok()
    }
}
