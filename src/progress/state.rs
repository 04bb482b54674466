//! Progress State
//!
//! Per-module player progress and the module progression state machine
//! records. Task status is never stored here; it is derived from
//! `completed_tasks` and `current_task_id`.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress of the player within a single module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgress {
    #[serde(default)]
    pub completed_tasks: BTreeSet<String>,
    /// The one task currently accepted in this module
    #[serde(default)]
    pub current_task_id: Option<String>,
    #[serde(default)]
    pub seen_greetings: HashMap<String, bool>,
    /// Free-form state bag used by `state_check` requirements and dialogue actions
    #[serde(default)]
    pub state: HashMap<String, serde_json::Value>,
}

impl ModuleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_task_completed(&self, task_id: &str) -> bool {
        self.completed_tasks.contains(task_id)
    }

    pub fn has_seen_greeting(&self, dialogue_id: &str) -> bool {
        self.seen_greetings.get(dialogue_id).copied().unwrap_or(false)
    }

    pub fn get_state_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get(key)
    }

    /// Mark a task completed, returning true if it wasn't already
    ///
    /// Completing the current task clears `current_task_id` in the same step.
    pub fn complete_task(&mut self, task_id: &str) -> bool {
        if self.current_task_id.as_deref() == Some(task_id) {
            self.current_task_id = None;
        }
        self.completed_tasks.insert(task_id.to_string())
    }

    /// Apply a partial update
    pub fn apply(&mut self, update: ProgressUpdate) {
        if let Some(current) = update.current_task {
            self.current_task_id = current;
        }
        for task_id in &update.completed_tasks {
            self.complete_task(task_id);
        }
        for dialogue_id in update.greetings_seen {
            self.seen_greetings.insert(dialogue_id, true);
        }
        self.state.extend(update.state);
    }
}

/// A partial change to a module's progress
///
/// Fields left empty are untouched. `current_task` uses `Some(None)` to clear
/// the current task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub completed_tasks: Vec<String>,
    pub current_task: Option<Option<String>>,
    pub greetings_seen: Vec<String>,
    pub state: HashMap<String, serde_json::Value>,
}

impl ProgressUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete_task(mut self, task_id: &str) -> Self {
        self.completed_tasks.push(task_id.to_string());
        self
    }

    pub fn set_current_task(mut self, task_id: Option<&str>) -> Self {
        self.current_task = Some(task_id.map(str::to_string));
        self
    }

    pub fn mark_greeting_seen(mut self, dialogue_id: &str) -> Self {
        self.greetings_seen.push(dialogue_id.to_string());
        self
    }

    pub fn set_state(mut self, key: &str, value: serde_json::Value) -> Self {
        self.state.insert(key.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.completed_tasks.is_empty()
            && self.current_task.is_none()
            && self.greetings_seen.is_empty()
            && self.state.is_empty()
    }
}

/// Progression of a whole module: locked -> unlocked -> completed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleProgressionState {
    #[default]
    Locked,
    Unlocked,
    Completed,
}

impl ModuleProgressionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleProgressionState::Locked => "locked",
            ModuleProgressionState::Unlocked => "unlocked",
            ModuleProgressionState::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "locked" => Some(ModuleProgressionState::Locked),
            "unlocked" => Some(ModuleProgressionState::Unlocked),
            "completed" => Some(ModuleProgressionState::Completed),
            _ => None,
        }
    }
}

/// Stored progression state of a module with its transition timestamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgressionRecord {
    pub state: ModuleProgressionState,
    /// Set on the first unlock, never overwritten
    pub unlocked_at: Option<DateTime<Utc>>,
    /// Set on the first completion, never overwritten
    pub completed_at: Option<DateTime<Utc>>,
}

impl ModuleProgressionRecord {
    /// Move to unlocked; completed modules never regress. Returns true if the state changed.
    pub fn unlock(&mut self) -> bool {
        match self.state {
            ModuleProgressionState::Locked => {
                self.state = ModuleProgressionState::Unlocked;
                self.unlocked_at.get_or_insert_with(Utc::now);
                true
            }
            ModuleProgressionState::Unlocked | ModuleProgressionState::Completed => false,
        }
    }

    /// Move to completed. Returns true if the state changed.
    pub fn complete(&mut self) -> bool {
        if self.state == ModuleProgressionState::Completed {
            return false;
        }
        self.state = ModuleProgressionState::Completed;
        self.completed_at.get_or_insert_with(Utc::now);
        true
    }
}
