//! Rule store trait and implementations.
//!
//! A store returns a complete, freshly parsed [`RuleSnapshot`] on every call
//! to `load`; callers swap it in as a whole.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::config::RuleFiles;
use crate::error::{CadenceError, CadenceResult};
use crate::rules::{HabitDefinition, IgnoreRule, RuleSnapshot, TriggerRule};

/// Source of rule definitions.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Read all three rule sets.
    ///
    /// Fails with a configuration error when any resource is missing or
    /// cannot be parsed. Every call yields fresh habit progress.
    async fn load(&self) -> CadenceResult<RuleSnapshot>;
}

/// Rule store backed by three JSON documents on disk.
#[derive(Debug, Clone)]
pub struct FileRuleStore {
    files: RuleFiles,
}

impl FileRuleStore {
    /// Create a store reading the given files.
    pub fn new(files: RuleFiles) -> Self {
        Self { files }
    }

    /// Create a store reading `habits.json`, `triggers.json` and `ignore.json` from `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(RuleFiles::in_dir(dir))
    }

    /// The files this store reads.
    pub fn files(&self) -> &RuleFiles {
        &self.files
    }

    async fn read_document<T: DeserializeOwned>(path: &Path) -> CadenceResult<T> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CadenceError::config_missing(path.display().to_string(), e))?;

        serde_json::from_str(&content).map_err(|e| {
            CadenceError::configuration_with_source(format!("cannot parse '{}'", path.display()), e)
        })
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn load(&self) -> CadenceResult<RuleSnapshot> {
        let ignore: Vec<IgnoreRule> = Self::read_document(&self.files.ignore_path).await?;
        let triggers: Vec<TriggerRule> = Self::read_document(&self.files.triggers_path).await?;
        let habits: Vec<HabitDefinition> = Self::read_document(&self.files.habits_path).await?;

        debug!(
            ignore = ignore.len(),
            triggers = triggers.len(),
            habits = habits.len(),
            "Rule files read"
        );

        RuleSnapshot::build(ignore, triggers, &habits)
    }
}

#[derive(Debug, Clone, Default)]
struct Definitions {
    ignore: Vec<IgnoreRule>,
    triggers: Vec<TriggerRule>,
    habits: Vec<HabitDefinition>,
    failing: Option<String>,
}

/// Rule store held in memory.
///
/// Definitions can be replaced at any time; the next `load` picks them up.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    definitions: RwLock<Definitions>,
}

impl InMemoryRuleStore {
    /// Create a store with the given definitions.
    pub fn new(
        ignore: Vec<IgnoreRule>,
        triggers: Vec<TriggerRule>,
        habits: Vec<HabitDefinition>,
    ) -> Self {
        Self {
            definitions: RwLock::new(Definitions {
                ignore,
                triggers,
                habits,
                failing: None,
            }),
        }
    }

    /// Replace the ignore rules.
    pub fn set_ignore(&self, ignore: Vec<IgnoreRule>) {
        self.write().ignore = ignore;
    }

    /// Replace the trigger rules.
    pub fn set_triggers(&self, triggers: Vec<TriggerRule>) {
        self.write().triggers = triggers;
    }

    /// Replace the habit definitions.
    pub fn set_habits(&self, habits: Vec<HabitDefinition>) {
        self.write().habits = habits;
    }

    /// Make every subsequent load fail with a configuration error, or clear it.
    pub fn set_failing(&self, message: Option<String>) {
        self.write().failing = message;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Definitions> {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn load(&self) -> CadenceResult<RuleSnapshot> {
        let defs = self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if let Some(message) = defs.failing {
            return Err(CadenceError::configuration(message));
        }

        RuleSnapshot::build(defs.ignore, defs.triggers, &defs.habits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn write_rules(dir: &Path, ignore: &str, triggers: &str, habits: &str) {
        std::fs::write(dir.join("ignore.json"), ignore).unwrap();
        std::fs::write(dir.join("triggers.json"), triggers).unwrap();
        std::fs::write(dir.join("habits.json"), habits).unwrap();
    }

    #[tokio::test]
    async fn test_file_store_load() {
        let dir = tempfile::tempdir().unwrap();
        write_rules(
            dir.path(),
            r#"["weather"]"#,
            r#"[{"intent": "3:alarm.set", "parameters": {"hour": 7}}]"#,
            r#"[
                {"intents": [{"name": "3:lights.on", "parameters": {}}], "user_choice": true},
                {"intents": [{"name": "3:coffee.make", "parameters": {"size": "large"}}],
                 "user_choice": false, "interval_max": 15, "time": "07:30"}
            ]"#,
        );

        let store = FileRuleStore::in_dir(dir.path());
        let snapshot = store.load().await.unwrap();

        assert_eq!(snapshot.ignore.len(), 1);
        assert_eq!(snapshot.triggers.len(), 1);
        assert_eq!(snapshot.habits.len(), 1);
        assert_eq!(snapshot.habits[0].index.0, 1);
        assert_eq!(snapshot.user_chosen, 1);
    }

    #[tokio::test]
    async fn test_file_store_missing_resource() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ignore.json"), "[]").unwrap();

        let err = FileRuleStore::in_dir(dir.path()).load().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CfgMissingResource);
        assert!(err.to_string().contains("triggers.json"));
    }

    #[tokio::test]
    async fn test_file_store_unparseable_resource() {
        let dir = tempfile::tempdir().unwrap();
        write_rules(dir.path(), "[]", "[]", "{not json");

        let err = FileRuleStore::in_dir(dir.path()).load().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CfgInvalidResource);
    }

    #[tokio::test]
    async fn test_file_store_reload_sees_edits() {
        let dir = tempfile::tempdir().unwrap();
        write_rules(dir.path(), "[]", "[]", "[]");
        let store = FileRuleStore::in_dir(dir.path());
        assert!(store.load().await.unwrap().triggers.is_empty());

        std::fs::write(
            dir.path().join("triggers.json"),
            r#"[{"intent": "3:lights.on"}]"#,
        )
        .unwrap();
        assert_eq!(store.load().await.unwrap().triggers.len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryRuleStore::default();
        assert!(store.load().await.unwrap().habits.is_empty());

        store.set_habits(
            serde_json::from_value(json!([
                {"intents": [{"name": "3:a", "parameters": {}}], "user_choice": false}
            ]))
            .unwrap(),
        );
        assert_eq!(store.load().await.unwrap().habits.len(), 1);

        store.set_failing(Some("disk on fire".to_string()));
        assert!(store.load().await.unwrap_err().is_configuration());

        store.set_failing(None);
        assert!(store.load().await.is_ok());
    }
}
