//! Configuration system for cadence.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CadenceError, CadenceResult};

/// Directory, relative to the home directory, holding habits, triggers and logs.
const HABITS_DIR: &str = ".mycroft/skills/ListenerSkill/habits";

fn habits_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(HABITS_DIR))
        .unwrap_or_else(|| PathBuf::from(HABITS_DIR))
}

/// Locations of the three rule resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleFiles {
    /// Habit definitions.
    pub habits_path: PathBuf,
    /// Trigger definitions.
    pub triggers_path: PathBuf,
    /// Intent kinds that are never logged nor matched.
    pub ignore_path: PathBuf,
}

impl Default for RuleFiles {
    fn default() -> Self {
        let dir = habits_dir();
        Self {
            habits_path: dir.join("habits.json"),
            triggers_path: dir.join("triggers.json"),
            ignore_path: dir.join("ignore.json"),
        }
    }
}

impl RuleFiles {
    /// Rule files named `habits.json`, `triggers.json` and `ignore.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            habits_path: dir.join("habits.json"),
            triggers_path: dir.join("triggers.json"),
            ignore_path: dir.join("ignore.json"),
        }
    }
}

/// Main engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rule resource locations.
    pub rules: RuleFiles,
    /// Append-only event log.
    pub log_path: PathBuf,
    /// Quiet period after which habit tracking is reset, in seconds.
    pub reset_tracking_secs: u64,
    /// Whether the first inactivity reset asks for a dependency check.
    pub dependency_check: bool,
    /// Capacity of the engine's command queue.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: RuleFiles::default(),
            log_path: habits_dir().join("logs.json"),
            reset_tracking_secs: 300,
            dependency_check: true,
            queue_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> CadenceResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CadenceError::config_missing(path.display().to_string(), e))?;
        let ext = path.extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| CadenceError::configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| CadenceError::configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| CadenceError::configuration(e.to_string())),
            _ => Err(CadenceError::configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml",
            )),
        }
    }

    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment variable overrides.
    ///
    /// Reads:
    /// - `CADENCE_HABITS_PATH`, `CADENCE_TRIGGERS_PATH`, `CADENCE_IGNORE_PATH`
    /// - `CADENCE_LOG_PATH`
    /// - `CADENCE_RESET_TRACKING_SECS` (default: 300)
    /// - `CADENCE_DISABLE_DEPENDENCY_CHECK`
    /// - `CADENCE_QUEUE_CAPACITY` (default: 256)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("CADENCE_HABITS_PATH") {
            self.rules.habits_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CADENCE_TRIGGERS_PATH") {
            self.rules.triggers_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CADENCE_IGNORE_PATH") {
            self.rules.ignore_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CADENCE_LOG_PATH") {
            self.log_path = PathBuf::from(path);
        }
        if let Ok(secs) = std::env::var("CADENCE_RESET_TRACKING_SECS") {
            if let Ok(secs) = secs.parse() {
                self.reset_tracking_secs = secs;
            }
        }
        if std::env::var("CADENCE_DISABLE_DEPENDENCY_CHECK").is_ok() {
            self.dependency_check = false;
        }
        if let Ok(capacity) = std::env::var("CADENCE_QUEUE_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                self.queue_capacity = capacity;
            }
        }
        self
    }

    /// Quiet period as a duration.
    pub fn reset_tracking_time(&self) -> Duration {
        Duration::from_secs(self.reset_tracking_secs.max(1))
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for EngineConfig.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set rule file locations.
    pub fn rules(mut self, rules: RuleFiles) -> Self {
        self.config.rules = rules;
        self
    }

    /// Set the event log path.
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = path.into();
        self
    }

    /// Set the inactivity period in seconds (minimum 1).
    pub fn reset_tracking_secs(mut self, secs: u64) -> Self {
        self.config.reset_tracking_secs = secs.max(1);
        self
    }

    /// Enable or disable the one-time dependency check.
    pub fn dependency_check(mut self, enabled: bool) -> Self {
        self.config.dependency_check = enabled;
        self
    }

    /// Set the command queue capacity (minimum 1).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
