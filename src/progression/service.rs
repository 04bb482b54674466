//! Module Progression Service
//!
//! Per-module state machine: locked -> unlocked -> completed. Completed is
//! sticky. Dependency propagation is pull-based: completing one module
//! re-checks every other module against its own requirement tree.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::content::ModuleRegistry;
use crate::events::ProgressionEvent;
use crate::error::Result;
use crate::progress::{ModuleProgressionRecord, ModuleProgressionState, ProgressStore};
use crate::requirement::{RequirementContext, RequirementEvaluator};

/// Which modules start unlocked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InitialUnlockPolicy {
    /// Exactly these module ids
    Manual { modules: Vec<String> },
    /// The first `count` modules in registration order
    FirstN { count: usize },
}

impl Default for InitialUnlockPolicy {
    fn default() -> Self {
        InitialUnlockPolicy::FirstN { count: 2 }
    }
}

impl InitialUnlockPolicy {
    fn initial_modules(&self, registered: &[String]) -> HashSet<String> {
        match self {
            InitialUnlockPolicy::Manual { modules } => modules.iter().cloned().collect(),
            InitialUnlockPolicy::FirstN { count } => {
                registered.iter().take(*count).cloned().collect()
            }
        }
    }
}

/// Result of a completion check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionCheck {
    /// Every declared task is completed (and there is at least one)
    pub completed: bool,
    /// Other modules whose requirements now hold, in registration order
    pub to_unlock: Vec<String>,
}

pub struct ModuleProgressionService {
    registry: Arc<dyn ModuleRegistry>,
    store: Arc<dyn ProgressStore>,
    evaluator: Arc<RequirementEvaluator>,
}

impl ModuleProgressionService {
    pub fn new(
        registry: Arc<dyn ModuleRegistry>,
        store: Arc<dyn ProgressStore>,
        evaluator: Arc<RequirementEvaluator>,
    ) -> Self {
        Self {
            registry,
            store,
            evaluator,
        }
    }

    pub fn state(&self, module_id: &str) -> ModuleProgressionState {
        self.evaluator.module_state(module_id)
    }

    pub fn record(&self, module_id: &str) -> ModuleProgressionRecord {
        self.store.progression_record(module_id).unwrap_or_default()
    }

    /// Force a module to unlocked; never demotes a completed module
    ///
    /// Returns true if the state changed.
    pub fn unlock(&self, module_id: &str) -> Result<bool> {
        self.registry.require_module(module_id)?;

        let mut record = self.record(module_id);
        let changed = record.unlock();
        if changed {
            info!("Module '{}' unlocked", module_id);
        }
        self.store.set_progression_record(module_id, record);
        Ok(changed)
    }

    /// Force a module to completed; returns true if the state changed
    pub fn complete(&self, module_id: &str) -> Result<bool> {
        self.registry.require_module(module_id)?;

        let mut record = self.record(module_id);
        let changed = record.complete();
        if changed {
            info!("Module '{}' completed", module_id);
        }
        self.store.set_progression_record(module_id, record);
        Ok(changed)
    }

    /// Whether a locked module's requirement now holds
    ///
    /// Always false for modules already unlocked or completed. A module
    /// without a requirement is always unlockable.
    pub async fn check_unlock_status(&self, module_id: &str) -> Result<bool> {
        let module = self.registry.require_module(module_id)?;

        if self.state(module_id) != ModuleProgressionState::Locked {
            return Ok(false);
        }

        let ctx = RequirementContext::new(module_id);
        let should_unlock = self
            .evaluator
            .evaluate_optional(module.unlock.as_ref(), &ctx)
            .await;
        debug!("Module '{}' unlock check -> {}", module_id, should_unlock);
        Ok(should_unlock)
    }

    /// Complete the module if every declared task is done, then re-check
    /// every other module
    pub async fn check_completion_status(&self, module_id: &str) -> Result<CompletionCheck> {
        let module = self.registry.require_module(module_id)?;

        let progress = self.store.get_progress(module_id).unwrap_or_default();
        let fully_completed = !module.tasks.is_empty()
            && module
                .tasks
                .iter()
                .all(|task| progress.is_task_completed(&task.id));

        if !fully_completed {
            return Ok(CompletionCheck::default());
        }

        self.complete(module_id)?;

        let mut to_unlock = Vec::new();
        for other in self.registry.registered_module_ids() {
            if other == module_id {
                continue;
            }
            if self.check_unlock_status(&other).await? {
                to_unlock.push(other);
            }
        }

        Ok(CompletionCheck {
            completed: true,
            to_unlock,
        })
    }

    /// Run the completion check and apply everything it decides
    pub async fn apply_completion(&self, module_id: &str) -> Result<Vec<ProgressionEvent>> {
        let was_completed = self.state(module_id) == ModuleProgressionState::Completed;
        let check = self.check_completion_status(module_id).await?;

        let mut events = Vec::new();
        if check.completed && !was_completed {
            events.push(ProgressionEvent::ModuleCompleted {
                module_id: module_id.to_string(),
            });
        }
        for unlocked in check.to_unlock {
            if self.unlock(&unlocked)? {
                events.push(ProgressionEvent::ModuleUnlocked { module_id: unlocked });
            }
        }
        Ok(events)
    }

    /// Establish starting states for every registered module
    ///
    /// Modules named by the policy are unlocked; everything else goes
    /// through `check_unlock_status`. Existing records are respected, so
    /// running this against saved progress never demotes a module.
    pub async fn initialize(&self, policy: &InitialUnlockPolicy) -> Result<Vec<ProgressionEvent>> {
        let registered = self.registry.registered_module_ids();
        let initial = policy.initial_modules(&registered);

        let mut events = Vec::new();
        for module_id in &registered {
            if self.store.progression_record(module_id).is_none() {
                self.store
                    .set_progression_record(module_id, ModuleProgressionRecord::default());
            }

            let should_unlock =
                initial.contains(module_id) || self.check_unlock_status(module_id).await?;
            if should_unlock && self.unlock(module_id)? {
                events.push(ProgressionEvent::ModuleUnlocked {
                    module_id: module_id.clone(),
                });
            }
        }

        info!(
            "Initialized progression for {} modules ({} unlocked)",
            registered.len(),
            events.len()
        );
        Ok(events)
    }
}
