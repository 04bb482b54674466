//! Requirement Evaluator
//!
//! Evaluates an `UnlockRequirement` tree against the progress store.
//! Evaluation is asynchronous only because custom checks may await I/O.
//! Combinators await every child (no short-circuit), so a custom check with
//! side effects runs no matter where it sits in an `and` / `or`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use tracing::debug;

use super::definition::UnlockRequirement;
use super::inspect::{leaves, RequirementDetail};
use crate::behavior::BehaviorRegistry;
use crate::content::TaskOwnership;
use crate::error::{ErrorHandler, ProgressionError};
use crate::progress::{ModuleProgressionState, ProgressStore};

/// Read-only view handed to custom checks
pub struct CheckContext<'a> {
    /// Module the requirement is being evaluated for
    pub module_id: &'a str,
    pub store: &'a dyn ProgressStore,
}

/// A content-defined predicate, registered by id in the `BehaviorRegistry`
///
/// Checks are not cached; they should be idempotent and cheap, or cache
/// internally. An `Err` is reported as an evaluation failure and counts as
/// unsatisfied.
#[async_trait]
pub trait CustomCheck: Send + Sync {
    async fn check(&self, ctx: &CheckContext<'_>) -> Result<bool, String>;
}

/// Where a requirement is being evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementContext {
    /// Current module; fallback owner for `task_complete` leaves
    pub module_id: String,
}

impl RequirementContext {
    pub fn new(module_id: &str) -> Self {
        Self {
            module_id: module_id.to_string(),
        }
    }
}

/// A display entry with its current satisfaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedDetail {
    pub detail: RequirementDetail,
    pub satisfied: bool,
}

pub struct RequirementEvaluator {
    store: Arc<dyn ProgressStore>,
    ownership: Arc<dyn TaskOwnership>,
    behaviors: Arc<BehaviorRegistry>,
    errors: Arc<dyn ErrorHandler>,
    custom_check_timeout: Duration,
}

impl RequirementEvaluator {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        ownership: Arc<dyn TaskOwnership>,
        behaviors: Arc<BehaviorRegistry>,
        errors: Arc<dyn ErrorHandler>,
        custom_check_timeout: Duration,
    ) -> Self {
        Self {
            store,
            ownership,
            behaviors,
            errors,
            custom_check_timeout,
        }
    }

    /// Evaluate a requirement tree
    pub fn evaluate<'a>(
        &'a self,
        requirement: &'a UnlockRequirement,
        ctx: &'a RequirementContext,
    ) -> BoxFuture<'a, bool> {
        self.evaluate_with_input(requirement, ctx, None)
    }

    /// Evaluate with interactive input; `password` leaves hold iff the input matches
    pub fn evaluate_with_input<'a>(
        &'a self,
        requirement: &'a UnlockRequirement,
        ctx: &'a RequirementContext,
        input: Option<&'a str>,
    ) -> BoxFuture<'a, bool> {
        async move {
            match requirement {
                UnlockRequirement::Always => true,
                UnlockRequirement::Never => false,
                UnlockRequirement::Password { password, .. } => input == Some(password.as_str()),
                UnlockRequirement::TaskComplete { task, module } => {
                    match self.owning_module(task, module.as_deref(), ctx) {
                        Some(module_id) => self.store.is_task_completed(&module_id, task),
                        None => false,
                    }
                }
                UnlockRequirement::ModuleComplete { module_id } => {
                    self.module_state(module_id) == ModuleProgressionState::Completed
                }
                UnlockRequirement::StateCheck { key, value } => self
                    .store
                    .get_state_field(&ctx.module_id, key)
                    .is_some_and(|stored| &stored == value),
                UnlockRequirement::Custom { check } => self.run_custom_check(check, ctx).await,
                UnlockRequirement::And { requirements } => {
                    let results = join_all(
                        requirements
                            .iter()
                            .map(|r| self.evaluate_with_input(r, ctx, input)),
                    )
                    .await;
                    results.into_iter().all(|satisfied| satisfied)
                }
                UnlockRequirement::Or { requirements } => {
                    let results = join_all(
                        requirements
                            .iter()
                            .map(|r| self.evaluate_with_input(r, ctx, input)),
                    )
                    .await;
                    results.into_iter().any(|satisfied| satisfied)
                }
            }
        }
        .boxed()
    }

    /// Evaluate an optional requirement; no requirement means satisfied
    pub async fn evaluate_optional(
        &self,
        requirement: Option<&UnlockRequirement>,
        ctx: &RequirementContext,
    ) -> bool {
        match requirement {
            Some(requirement) => self.evaluate(requirement, ctx).await,
            None => true,
        }
    }

    /// Flattened display entries, each annotated with whether it currently holds
    pub async fn evaluate_details(
        &self,
        requirement: &UnlockRequirement,
        ctx: &RequirementContext,
    ) -> Vec<EvaluatedDetail> {
        let leaves = leaves(requirement);
        let results = join_all(leaves.iter().map(|leaf| self.evaluate(leaf, ctx))).await;

        leaves
            .into_iter()
            .zip(results)
            .map(|(leaf, satisfied)| EvaluatedDetail {
                detail: RequirementDetail::describe(leaf),
                satisfied,
            })
            .collect()
    }

    /// Progression state as stored; modules without a record are locked
    pub fn module_state(&self, module_id: &str) -> ModuleProgressionState {
        self.store
            .progression_record(module_id)
            .map(|r| r.state)
            .unwrap_or_default()
    }

    /// Pinned module, then the ownership resolver, then the current module
    fn owning_module(
        &self,
        task_id: &str,
        pinned: Option<&str>,
        ctx: &RequirementContext,
    ) -> Option<String> {
        if let Some(module_id) = pinned {
            return Some(module_id.to_string());
        }
        self.ownership.find_task_module(task_id).or_else(|| {
            if ctx.module_id.is_empty() {
                None
            } else {
                Some(ctx.module_id.clone())
            }
        })
    }

    async fn run_custom_check(&self, check_id: &str, ctx: &RequirementContext) -> bool {
        let Some(check) = self.behaviors.check(check_id) else {
            self.errors.handle(&ProgressionError::EvaluationFailure {
                check: check_id.to_string(),
                reason: "no check registered with this id".to_string(),
            });
            return false;
        };

        let check_ctx = CheckContext {
            module_id: &ctx.module_id,
            store: self.store.as_ref(),
        };

        match tokio::time::timeout(self.custom_check_timeout, check.check(&check_ctx)).await {
            Ok(Ok(satisfied)) => {
                debug!("Custom check '{}' -> {}", check_id, satisfied);
                satisfied
            }
            Ok(Err(reason)) => {
                self.errors.handle(&ProgressionError::EvaluationFailure {
                    check: check_id.to_string(),
                    reason,
                });
                false
            }
            Err(_) => {
                self.errors.handle(&ProgressionError::EvaluationFailure {
                    check: check_id.to_string(),
                    reason: format!("timed out after {:?}", self.custom_check_timeout),
                });
                false
            }
        }
    }
}
