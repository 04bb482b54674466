//! Task Lifecycle
//!
//! Accept, submit and complete transitions on top of the progress store.
//! Completing a task cascades into module progression.

use std::sync::Arc;

use tracing::{debug, info};

use super::availability::{TaskAvailabilityService, TaskContext, TaskStatus};
use super::validation::{validate_builtin, ValidationOutcome, ValidatorSpec};
use crate::behavior::BehaviorRegistry;
use crate::content::{ModuleRegistry, Task};
use crate::error::{EntityKind, ErrorHandler, ProgressionError, Result};
use crate::events::ProgressionEvent;
use crate::progress::{ProgressStore, ProgressUpdate};
use crate::progression::ModuleProgressionService;

pub struct TaskLifecycle {
    registry: Arc<dyn ModuleRegistry>,
    store: Arc<dyn ProgressStore>,
    availability: Arc<TaskAvailabilityService>,
    progression: Arc<ModuleProgressionService>,
    behaviors: Arc<BehaviorRegistry>,
    errors: Arc<dyn ErrorHandler>,
}

impl TaskLifecycle {
    pub fn new(
        registry: Arc<dyn ModuleRegistry>,
        store: Arc<dyn ProgressStore>,
        availability: Arc<TaskAvailabilityService>,
        progression: Arc<ModuleProgressionService>,
        behaviors: Arc<BehaviorRegistry>,
        errors: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            registry,
            store,
            availability,
            progression,
            behaviors,
            errors,
        }
    }

    fn find_task(&self, module_id: &str, task_id: &str) -> Result<Task> {
        let module = self.registry.require_module(module_id)?;
        module
            .task(task_id)
            .cloned()
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Task, task_id))
    }

    pub async fn status(&self, module_id: &str, task_id: &str) -> Result<TaskStatus> {
        let task = self.find_task(module_id, task_id)?;
        let ctx = TaskContext::load(self.store.as_ref(), module_id);
        Ok(self.availability.status(&task, &ctx).await)
    }

    /// Make an available task the module's current task
    ///
    /// Accepting replaces any other current task. Locked, completed and
    /// already-active tasks are left alone and produce no events.
    pub async fn accept_task(&self, module_id: &str, task_id: &str) -> Result<Vec<ProgressionEvent>> {
        let status = self.status(module_id, task_id).await?;
        if status != TaskStatus::Available {
            debug!(
                "Not accepting task '{}' in '{}': task is {}",
                task_id,
                module_id,
                status.as_str()
            );
            return Ok(Vec::new());
        }

        self.store.update_progress(
            module_id,
            ProgressUpdate::new().set_current_task(Some(task_id)),
        );
        info!("Task '{}' accepted in module '{}'", task_id, module_id);

        Ok(vec![ProgressionEvent::TaskAccepted {
            module_id: module_id.to_string(),
            task_id: task_id.to_string(),
        }])
    }

    /// Validate a submission for the active task and complete it on success
    pub async fn submit_task(
        &self,
        module_id: &str,
        task_id: &str,
        submission: &str,
    ) -> Result<Vec<ProgressionEvent>> {
        let task = self.find_task(module_id, task_id)?;
        let ctx = TaskContext::load(self.store.as_ref(), module_id);
        if !ctx.is_active(task_id) {
            debug!("Ignoring submission for inactive task '{}' in '{}'", task_id, module_id);
            return Ok(Vec::new());
        }

        let outcome = self.validate(&task, submission).await?;
        if !outcome.passed {
            debug!("Submission for '{}' rejected: {:?}", task_id, outcome.feedback);
            return Ok(vec![ProgressionEvent::SubmissionRejected {
                module_id: module_id.to_string(),
                task_id: task_id.to_string(),
                feedback: outcome.feedback,
            }]);
        }

        self.complete_task(module_id, task_id).await
    }

    async fn validate(&self, task: &Task, submission: &str) -> Result<ValidationOutcome> {
        if let Some(outcome) = validate_builtin(task, submission) {
            return Ok(outcome);
        }

        let Some(ValidatorSpec::Custom { id }) = &task.validator else {
            return Ok(ValidationOutcome::pass());
        };
        let validator = self
            .behaviors
            .validator(id)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Validator, id.as_str()))?;

        match validator.validate(task, submission).await {
            Ok(outcome) => Ok(outcome),
            Err(reason) => {
                self.errors.handle(&ProgressionError::EvaluationFailure {
                    check: id.clone(),
                    reason,
                });
                Ok(ValidationOutcome {
                    passed: false,
                    feedback: None,
                })
            }
        }
    }

    /// Mark a task completed, clearing it as current, then re-check the module
    pub async fn complete_task(&self, module_id: &str, task_id: &str) -> Result<Vec<ProgressionEvent>> {
        self.find_task(module_id, task_id)?;
        if self.store.is_task_completed(module_id, task_id) {
            return Ok(Vec::new());
        }

        self.store
            .update_progress(module_id, ProgressUpdate::new().complete_task(task_id));
        info!("Task '{}' completed in module '{}'", task_id, module_id);

        let mut events = vec![ProgressionEvent::TaskCompleted {
            module_id: module_id.to_string(),
            task_id: task_id.to_string(),
        }];
        events.extend(self.progression.apply_completion(module_id).await?);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentRegistry, ModuleDefinition, SubmissionKind};
    use crate::error::LogErrorHandler;
    use crate::progress::{InMemoryProgressStore, ModuleProgressionState};
    use crate::requirement::{RequirementEvaluator, UnlockRequirement};
    use crate::task::TaskValidator;
    use async_trait::async_trait;
    use std::time::Duration;

    struct LengthGrader;

    #[async_trait]
    impl TaskValidator for LengthGrader {
        async fn validate(&self, _task: &Task, submission: &str) -> std::result::Result<ValidationOutcome, String> {
            if submission.len() > 100 {
                return Err("grader overloaded".to_string());
            }
            if submission.len() >= 5 {
                Ok(ValidationOutcome::pass())
            } else {
                Ok(ValidationOutcome::fail("Too short"))
            }
        }
    }

    fn lifecycle() -> (Arc<InMemoryProgressStore>, Arc<ModuleProgressionService>, TaskLifecycle) {
        let registry = Arc::new(
            ContentRegistry::new()
                .with_module(
                    ModuleDefinition::new("m", "M")
                        .with_task(Task::new("t1", "First").with_validator(ValidatorSpec::Exact {
                            expected: "yes".to_string(),
                            ignore_case: true,
                        }))
                        .with_task(
                            Task::new("t2", "Second")
                                .with_unlock(UnlockRequirement::task_complete("t1"))
                                .with_validator(ValidatorSpec::Custom {
                                    id: "length".to_string(),
                                }),
                        )
                        .with_task(
                            Task::new("t3", "Third")
                                .with_submission(SubmissionKind::Confirmation)
                                .with_validator(ValidatorSpec::Custom {
                                    id: "missing".to_string(),
                                }),
                        ),
                )
                .with_module(
                    ModuleDefinition::new("next", "Next")
                        .with_unlock(UnlockRequirement::module_complete("m")),
                ),
        );
        let store = Arc::new(InMemoryProgressStore::new());
        let mut behaviors = BehaviorRegistry::new();
        behaviors.register_validator("length", LengthGrader);
        let behaviors = Arc::new(behaviors);
        let errors: Arc<dyn ErrorHandler> = Arc::new(LogErrorHandler);

        let evaluator = Arc::new(RequirementEvaluator::new(
            store.clone(),
            registry.clone(),
            behaviors.clone(),
            errors.clone(),
            Duration::from_millis(100),
        ));
        let availability = Arc::new(TaskAvailabilityService::new(evaluator.clone()));
        let progression = Arc::new(ModuleProgressionService::new(
            registry.clone(),
            store.clone(),
            evaluator,
        ));
        let lifecycle = TaskLifecycle::new(
            registry,
            store.clone(),
            availability,
            progression.clone(),
            behaviors,
            errors,
        );
        (store, progression, lifecycle)
    }

    #[tokio::test]
    async fn test_accept_only_available_tasks() {
        let (store, _progression, lifecycle) = lifecycle();

        assert!(lifecycle.accept_task("m", "t2").await.unwrap().is_empty());
        assert_eq!(store.current_task_id("m"), None);

        let events = lifecycle.accept_task("m", "t1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "task_accepted");
        assert_eq!(store.current_task_id("m").as_deref(), Some("t1"));

        assert!(lifecycle.accept_task("m", "t1").await.unwrap().is_empty());
        assert!(lifecycle.accept_task("m", "nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_submit_rejects_then_completes() {
        let (store, _progression, lifecycle) = lifecycle();

        assert!(lifecycle.submit_task("m", "t1", "yes").await.unwrap().is_empty());

        lifecycle.accept_task("m", "t1").await.unwrap();
        let events = lifecycle.submit_task("m", "t1", "no").await.unwrap();
        assert_eq!(events[0].event_type(), "submission_rejected");
        assert_eq!(lifecycle.status("m", "t1").await.unwrap(), TaskStatus::Active);

        let events = lifecycle.submit_task("m", "t1", " YES ").await.unwrap();
        assert_eq!(events[0].event_type(), "task_completed");
        assert!(store.is_task_completed("m", "t1"));
        assert_eq!(store.current_task_id("m"), None);
        assert_eq!(lifecycle.status("m", "t2").await.unwrap(), TaskStatus::Available);
    }

    #[tokio::test]
    async fn test_custom_validator_outcomes() {
        let (_store, _progression, lifecycle) = lifecycle();
        lifecycle.complete_task("m", "t1").await.unwrap();
        lifecycle.accept_task("m", "t2").await.unwrap();

        let events = lifecycle.submit_task("m", "t2", "abc").await.unwrap();
        assert_eq!(
            events,
            vec![ProgressionEvent::SubmissionRejected {
                module_id: "m".to_string(),
                task_id: "t2".to_string(),
                feedback: Some("Too short".to_string()),
            }]
        );

        let long = "x".repeat(200);
        let events = lifecycle.submit_task("m", "t2", &long).await.unwrap();
        assert_eq!(events[0].event_type(), "submission_rejected");

        let events = lifecycle.submit_task("m", "t2", "abcdef").await.unwrap();
        assert_eq!(events[0].event_type(), "task_completed");

        lifecycle.accept_task("m", "t3").await.unwrap();
        let err = lifecycle.submit_task("m", "t3", "").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_completing_last_task_completes_module_and_unlocks_dependents() {
        let (_store, progression, lifecycle) = lifecycle();
        progression.unlock("m").unwrap();

        lifecycle.complete_task("m", "t1").await.unwrap();
        lifecycle.complete_task("m", "t2").await.unwrap();
        let events = lifecycle.complete_task("m", "t3").await.unwrap();

        let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["task_completed", "module_completed", "module_unlocked"]);
        assert_eq!(progression.state("m"), ModuleProgressionState::Completed);
        assert_eq!(progression.state("next"), ModuleProgressionState::Unlocked);

        assert!(lifecycle.complete_task("m", "t3").await.unwrap().is_empty());
    }
}
