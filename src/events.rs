//! Progression Events
//!
//! Every mutating operation returns the state changes it performed, so
//! callers can react (refresh a view, persist, notify) without diffing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressionEvent {
    /// A task became the module's current task
    TaskAccepted { module_id: String, task_id: String },

    TaskCompleted { module_id: String, task_id: String },

    /// A submission failed validation; the task stays active
    SubmissionRejected {
        module_id: String,
        task_id: String,
        feedback: Option<String>,
    },

    StateChanged { module_id: String, key: String },

    GreetingSeen { module_id: String, dialogue_id: String },

    ModuleUnlocked { module_id: String },

    ModuleCompleted { module_id: String },
}

impl ProgressionEvent {
    pub fn module_id(&self) -> &str {
        match self {
            ProgressionEvent::TaskAccepted { module_id, .. } => module_id,
            ProgressionEvent::TaskCompleted { module_id, .. } => module_id,
            ProgressionEvent::SubmissionRejected { module_id, .. } => module_id,
            ProgressionEvent::StateChanged { module_id, .. } => module_id,
            ProgressionEvent::GreetingSeen { module_id, .. } => module_id,
            ProgressionEvent::ModuleUnlocked { module_id } => module_id,
            ProgressionEvent::ModuleCompleted { module_id } => module_id,
        }
    }

    /// Get event type as string (for logging/debugging)
    pub fn event_type(&self) -> &'static str {
        match self {
            ProgressionEvent::TaskAccepted { .. } => "task_accepted",
            ProgressionEvent::TaskCompleted { .. } => "task_completed",
            ProgressionEvent::SubmissionRejected { .. } => "submission_rejected",
            ProgressionEvent::StateChanged { .. } => "state_changed",
            ProgressionEvent::GreetingSeen { .. } => "greeting_seen",
            ProgressionEvent::ModuleUnlocked { .. } => "module_unlocked",
            ProgressionEvent::ModuleCompleted { .. } => "module_completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let event = ProgressionEvent::TaskCompleted {
            module_id: "basics".to_string(),
            task_id: "loops".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_completed");
        assert_eq!(json["task_id"], "loops");
        assert_eq!(event.event_type(), "task_completed");
        assert_eq!(event.module_id(), "basics");
    }
}
