//! Dialogue Actions
//!
//! Side effects attached to dialogue choices. Built-in actions are named in
//! content by kind; anything else is a `DialogueAction` registered by id.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::behavior::BehaviorRegistry;
use crate::error::{EntityKind, ProgressionError, Result};
use crate::events::ProgressionEvent;
use crate::progress::ProgressStore;
use crate::task::TaskLifecycle;

/// An action as authored on a choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpec {
    AcceptTask { task: String },
    CompleteTask { task: String },
    /// Submit the session's input for a task
    SubmitTask { task: String },
    SetState { key: String, value: serde_json::Value },
    Custom { id: String },
}

impl ActionSpec {
    /// Turn the authored action into something executable
    pub fn resolve(&self, behaviors: &BehaviorRegistry) -> Result<Arc<dyn DialogueAction>> {
        let action: Arc<dyn DialogueAction> = match self {
            ActionSpec::AcceptTask { task } => Arc::new(AcceptTaskAction {
                task_id: task.clone(),
            }),
            ActionSpec::CompleteTask { task } => Arc::new(CompleteTaskAction {
                task_id: task.clone(),
            }),
            ActionSpec::SubmitTask { task } => Arc::new(SubmitTaskAction {
                task_id: task.clone(),
            }),
            ActionSpec::SetState { key, value } => Arc::new(SetStateAction {
                key: key.clone(),
                value: value.clone(),
            }),
            ActionSpec::Custom { id } => behaviors
                .action(id)
                .ok_or_else(|| ProgressionError::not_found(EntityKind::Action, id.as_str()))?,
        };
        Ok(action)
    }
}

/// Everything an action may touch
pub struct ActionContext<'a> {
    pub module_id: &'a str,
    pub npc_id: &'a str,
    pub store: &'a dyn ProgressStore,
    pub lifecycle: &'a TaskLifecycle,
    /// Text the player entered alongside the choice, if any
    pub input: Option<&'a str>,
}

/// A side effect run when a dialogue choice is taken
#[async_trait]
pub trait DialogueAction: Send + Sync {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<Vec<ProgressionEvent>>;
}

pub struct AcceptTaskAction {
    pub task_id: String,
}

#[async_trait]
impl DialogueAction for AcceptTaskAction {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<Vec<ProgressionEvent>> {
        ctx.lifecycle.accept_task(ctx.module_id, &self.task_id).await
    }
}

pub struct CompleteTaskAction {
    pub task_id: String,
}

#[async_trait]
impl DialogueAction for CompleteTaskAction {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<Vec<ProgressionEvent>> {
        ctx.lifecycle.complete_task(ctx.module_id, &self.task_id).await
    }
}

pub struct SubmitTaskAction {
    pub task_id: String,
}

#[async_trait]
impl DialogueAction for SubmitTaskAction {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<Vec<ProgressionEvent>> {
        ctx.lifecycle
            .submit_task(ctx.module_id, &self.task_id, ctx.input.unwrap_or_default())
            .await
    }
}

pub struct SetStateAction {
    pub key: String,
    pub value: serde_json::Value,
}

#[async_trait]
impl DialogueAction for SetStateAction {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<Vec<ProgressionEvent>> {
        if ctx.store.get_state_field(ctx.module_id, &self.key).as_ref() == Some(&self.value) {
            return Ok(Vec::new());
        }
        ctx.store
            .set_state_field(ctx.module_id, &self.key, self.value.clone());
        Ok(vec![ProgressionEvent::StateChanged {
            module_id: ctx.module_id.to_string(),
            key: self.key.clone(),
        }])
    }
}
