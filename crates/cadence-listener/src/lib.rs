//! cadence-listener - runs the cadence engine against an assistant's message bus.

pub mod bus;
pub mod config;

pub use bus::{utterance_message, BusError, MessageBusClient, UTTERANCE_MESSAGE_TYPE};
pub use config::{load_engine_config, BusConfig, CONFIG_PATH_ENV};
