//! Message bus client.
//!
//! Connects to the assistant's WebSocket message bus, forwards every text
//! frame to the engine, and speaks engine actions back onto the bus as
//! `recognizer_loop:utterance` messages. Reconnects after a delay when the
//! connection drops.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, error, info, warn};

use cadence_core::{ActionSubscriber, EventSender};

use crate::config::BusConfig;

/// Bus message type that makes the assistant act on a spoken command.
pub const UTTERANCE_MESSAGE_TYPE: &str = "recognizer_loop:utterance";

/// Message bus client errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("WebSocket connect failed: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("WebSocket error: {0}")]
    Stream(#[source] tungstenite::Error),

    #[error("WebSocket stream ended")]
    StreamEnded,

    #[error("Engine stopped accepting events")]
    EngineStopped,
}

/// Serialize a command utterance as a bus message.
pub fn utterance_message(utterance: &str, lang: &str) -> String {
    serde_json::json!({
        "type": UTTERANCE_MESSAGE_TYPE,
        "data": {
            "utterances": [utterance],
            "lang": lang,
        },
        "context": null,
    })
    .to_string()
}

/// Bridge between the message bus and a running engine.
pub struct MessageBusClient {
    config: BusConfig,
    events: EventSender,
    shutdown_tx: broadcast::Sender<()>,
}

impl MessageBusClient {
    /// Create a client feeding `events`.
    pub fn new(config: BusConfig, events: EventSender) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            events,
            shutdown_tx,
        }
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run until shutdown, the engine stops, or reconnect attempts run out.
    pub async fn run(&self, mut actions: ActionSubscriber) {
        let mut reconnect_attempts = 0u32;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            if self.events.is_closed() {
                warn!("Engine stopped, not reconnecting to message bus");
                break;
            }

            info!(url = %self.config.url, "Connecting to message bus");

            match self.connect_and_listen(&mut actions).await {
                Ok(()) => {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }
                    reconnect_attempts = 0;
                }
                Err(BusError::EngineStopped) => {
                    warn!("Engine stopped, closing message bus client");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Message bus connection error");
                    reconnect_attempts += 1;

                    if self.config.max_reconnect_attempts > 0
                        && reconnect_attempts >= self.config.max_reconnect_attempts
                    {
                        error!(
                            attempts = reconnect_attempts,
                            "Max reconnection attempts reached, stopping client"
                        );
                        break;
                    }
                }
            }

            info!(
                delay = ?self.config.reconnect_delay,
                attempt = reconnect_attempts,
                "Reconnecting to message bus"
            );

            tokio::select! {
                _ = sleep(self.config.reconnect_delay) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        info!("Message bus client stopped");
    }

    async fn connect_and_listen(&self, actions: &mut ActionSubscriber) -> Result<(), BusError> {
        let (ws_stream, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(BusError::Connect)?;

        info!("Connected to message bus");

        let (mut write, mut read) = ws_stream.split();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ping_interval = tokio::time::interval(self.config.ping_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    let _ = write.close().await;
                    return Ok(());
                }

                _ = ping_interval.tick() => {
                    write.send(Message::Ping(vec![])).await.map_err(BusError::Stream)?;
                }

                action = actions.recv() => {
                    let Some(envelope) = action else {
                        let _ = write.close().await;
                        return Err(BusError::EngineStopped);
                    };
                    let utterance = envelope.utterance();
                    debug!(utterance = %utterance, "Speaking action onto the bus");
                    write
                        .send(Message::Text(utterance_message(&utterance, &self.config.lang)))
                        .await
                        .map_err(BusError::Stream)?;
                }

                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.events
                            .send(text)
                            .await
                            .map_err(|_| BusError::EngineStopped)?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Message bus closed the connection");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(BusError::Stream(e)),
                    None => return Err(BusError::StreamEnded),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utterance_message_shape() {
        let text = utterance_message("habit detected number 2", "en-us");
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "recognizer_loop:utterance");
        assert_eq!(
            value["data"]["utterances"],
            serde_json::json!(["habit detected number 2"])
        );
        assert_eq!(value["data"]["lang"], "en-us");
        assert!(value["context"].is_null());
    }
}
