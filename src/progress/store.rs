//! Progress Store
//!
//! The synchronous key-value store every component reads progress from.
//! Durability is the implementor's business; the in-memory store here can
//! export and import JSON snapshots for whoever persists them.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::state::{ModuleProgress, ModuleProgressionRecord, ProgressUpdate};
use crate::error::Result;

/// Read/write access to player progress, keyed by module id
///
/// Implementations must be read-your-writes consistent within a session.
pub trait ProgressStore: Send + Sync {
    fn get_progress(&self, module_id: &str) -> Option<ModuleProgress>;

    fn update_progress(&self, module_id: &str, update: ProgressUpdate);

    fn progression_record(&self, module_id: &str) -> Option<ModuleProgressionRecord>;

    fn set_progression_record(&self, module_id: &str, record: ModuleProgressionRecord);

    fn is_task_completed(&self, module_id: &str, task_id: &str) -> bool {
        self.get_progress(module_id)
            .map(|p| p.is_task_completed(task_id))
            .unwrap_or(false)
    }

    fn current_task_id(&self, module_id: &str) -> Option<String> {
        self.get_progress(module_id)
            .and_then(|p| p.current_task_id)
    }

    fn get_state_field(&self, module_id: &str, key: &str) -> Option<serde_json::Value> {
        self.get_progress(module_id)
            .and_then(|p| p.state.get(key).cloned())
    }

    fn set_state_field(&self, module_id: &str, key: &str, value: serde_json::Value) {
        self.update_progress(module_id, ProgressUpdate::new().set_state(key, value));
    }

    fn has_seen_greeting(&self, module_id: &str, dialogue_id: &str) -> bool {
        self.get_progress(module_id)
            .map(|p| p.has_seen_greeting(dialogue_id))
            .unwrap_or(false)
    }

    fn mark_greeting_seen(&self, module_id: &str, dialogue_id: &str) {
        self.update_progress(module_id, ProgressUpdate::new().mark_greeting_seen(dialogue_id));
    }
}

/// Serializable copy of everything an `InMemoryProgressStore` holds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleProgress>,
    #[serde(default)]
    pub progression: BTreeMap<String, ModuleProgressionRecord>,
}

/// Session-owned progress store
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    progress: DashMap<String, ModuleProgress>,
    progression: DashMap<String, ModuleProgressionRecord>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ProgressSnapshot) -> Self {
        let store = Self::new();
        for (module_id, progress) in snapshot.modules {
            store.progress.insert(module_id, progress);
        }
        for (module_id, record) in snapshot.progression {
            store.progression.insert(module_id, record);
        }
        store
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            modules: self
                .progress
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            progression: self
                .progression
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }

    /// Serialize all progress to JSON for external storage
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    /// Restore a store from JSON produced by `to_json`
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: ProgressSnapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn get_progress(&self, module_id: &str) -> Option<ModuleProgress> {
        self.progress.get(module_id).map(|p| p.value().clone())
    }

    fn update_progress(&self, module_id: &str, update: ProgressUpdate) {
        self.progress
            .entry(module_id.to_string())
            .or_default()
            .apply(update);
    }

    fn progression_record(&self, module_id: &str) -> Option<ModuleProgressionRecord> {
        self.progression.get(module_id).map(|r| r.value().clone())
    }

    fn set_progression_record(&self, module_id: &str, record: ModuleProgressionRecord) {
        self.progression.insert(module_id.to_string(), record);
    }

    fn is_task_completed(&self, module_id: &str, task_id: &str) -> bool {
        self.progress
            .get(module_id)
            .map(|p| p.is_task_completed(task_id))
            .unwrap_or(false)
    }

    fn current_task_id(&self, module_id: &str) -> Option<String> {
        self.progress
            .get(module_id)
            .and_then(|p| p.current_task_id.clone())
    }

    fn get_state_field(&self, module_id: &str, key: &str) -> Option<serde_json::Value> {
        self.progress
            .get(module_id)
            .and_then(|p| p.get_state_field(key).cloned())
    }

    fn has_seen_greeting(&self, module_id: &str, dialogue_id: &str) -> bool {
        self.progress
            .get(module_id)
            .map(|p| p.has_seen_greeting(dialogue_id))
            .unwrap_or(false)
    }
}
