//! Task Availability
//!
//! Classifies tasks as locked, available, active or completed from a
//! progress snapshot. Status is always derived, never stored.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::content::Task;
use crate::progress::{ModuleProgress, ProgressStore};
use crate::requirement::{RequirementContext, RequirementEvaluator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Locked,
    Available,
    Active,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Locked => "locked",
            TaskStatus::Available => "available",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
        }
    }
}

/// Snapshot of one module's task progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskContext {
    pub module_id: String,
    pub current_task_id: Option<String>,
    pub completed_tasks: BTreeSet<String>,
}

impl TaskContext {
    pub fn load(store: &dyn ProgressStore, module_id: &str) -> Self {
        match store.get_progress(module_id) {
            Some(progress) => Self::from_progress(module_id, &progress),
            None => Self {
                module_id: module_id.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn from_progress(module_id: &str, progress: &ModuleProgress) -> Self {
        Self {
            module_id: module_id.to_string(),
            current_task_id: progress.current_task_id.clone(),
            completed_tasks: progress.completed_tasks.clone(),
        }
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.completed_tasks.contains(task_id)
    }

    /// Current and not completed
    pub fn is_active(&self, task_id: &str) -> bool {
        self.current_task_id.as_deref() == Some(task_id) && !self.is_completed(task_id)
    }
}

/// Task ids split into available and active, each in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskClassification {
    pub available: Vec<String>,
    pub active: Vec<String>,
}

impl TaskClassification {
    pub fn is_available(&self, task_id: &str) -> bool {
        self.available.iter().any(|id| id == task_id)
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.active.iter().any(|id| id == task_id)
    }
}

pub struct TaskAvailabilityService {
    evaluator: Arc<RequirementEvaluator>,
}

impl TaskAvailabilityService {
    pub fn new(evaluator: Arc<RequirementEvaluator>) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &Arc<RequirementEvaluator> {
        &self.evaluator
    }

    /// Classify tasks into available and active sets
    ///
    /// Completed tasks appear in neither. Active wins over available, so a
    /// task is never in both.
    pub async fn classify(&self, tasks: &[&Task], ctx: &TaskContext) -> TaskClassification {
        let statuses = join_all(tasks.iter().map(|task| self.status(task, ctx))).await;

        let mut classification = TaskClassification::default();
        for (task, status) in tasks.iter().zip(statuses) {
            match status {
                TaskStatus::Active => classification.active.push(task.id.clone()),
                TaskStatus::Available => classification.available.push(task.id.clone()),
                TaskStatus::Locked | TaskStatus::Completed => {}
            }
        }
        classification
    }

    pub async fn status(&self, task: &Task, ctx: &TaskContext) -> TaskStatus {
        if ctx.is_completed(&task.id) {
            return TaskStatus::Completed;
        }
        if ctx.is_active(&task.id) {
            return TaskStatus::Active;
        }

        let requirement_ctx = RequirementContext::new(&ctx.module_id);
        if self
            .evaluator
            .evaluate_optional(task.unlock.as_ref(), &requirement_ctx)
            .await
        {
            TaskStatus::Available
        } else {
            TaskStatus::Locked
        }
    }

    /// First non-completed task in declared order
    pub fn next_sequential_task<'a>(&self, tasks: &[&'a Task], ctx: &TaskContext) -> Option<&'a Task> {
        tasks.iter().copied().find(|task| !ctx.is_completed(&task.id))
    }
}
