//! Listener configuration.

use std::time::Duration;

use cadence_core::{CadenceResult, EngineConfig};

/// Environment variable naming an optional engine config file.
pub const CONFIG_PATH_ENV: &str = "CADENCE_CONFIG";

/// Message bus connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BusConfig {
    /// WebSocket URL of the assistant's message bus.
    pub url: String,
    /// Delay before reconnecting after a disconnect.
    pub reconnect_delay: Duration,
    /// Maximum consecutive failed connections (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Keepalive ping interval.
    pub ping_interval: Duration,
    /// Language tag sent with every command utterance.
    pub lang: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8181/core".to_string(),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 0,
            ping_interval: Duration::from_secs(30),
            lang: "en-us".to_string(),
        }
    }
}

impl BusConfig {
    /// Create config from environment.
    ///
    /// Reads:
    /// - `CADENCE_BUS_URL` (default: ws://localhost:8181/core)
    /// - `CADENCE_BUS_RECONNECT_SECS` (default: 5)
    /// - `CADENCE_BUS_MAX_RECONNECT` (default: 0 = infinite)
    /// - `CADENCE_LANG` (default: en-us)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("CADENCE_BUS_URL").unwrap_or(defaults.url),
            reconnect_delay: std::env::var("CADENCE_BUS_RECONNECT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconnect_delay),
            max_reconnect_attempts: std::env::var("CADENCE_BUS_MAX_RECONNECT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_reconnect_attempts),
            ping_interval: defaults.ping_interval,
            lang: std::env::var("CADENCE_LANG").unwrap_or(defaults.lang),
        }
    }
}

/// Engine configuration from `CADENCE_CONFIG` if set, then the environment.
pub fn load_engine_config() -> CadenceResult<EngineConfig> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => Ok(EngineConfig::from_file(path)?.with_env_overrides()),
        Err(_) => Ok(EngineConfig::from_env()),
    }
}
