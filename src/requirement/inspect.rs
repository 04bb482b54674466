//! Requirement Inspection
//!
//! Pure walks over a requirement tree: interaction detection, dependency
//! extraction for the worldmap, and flattening into display entries.

use serde::Serialize;

use super::definition::{RequirementKind, UnlockRequirement};
use crate::content::TaskOwnership;

/// True iff a `password` requirement is reachable anywhere in the tree
pub fn requires_interaction(requirement: &UnlockRequirement) -> bool {
    match requirement {
        UnlockRequirement::Password { .. } => true,
        UnlockRequirement::And { requirements } | UnlockRequirement::Or { requirements } => {
            requirements.iter().any(requires_interaction)
        }
        UnlockRequirement::Always
        | UnlockRequirement::Never
        | UnlockRequirement::TaskComplete { .. }
        | UnlockRequirement::ModuleComplete { .. }
        | UnlockRequirement::StateCheck { .. }
        | UnlockRequirement::Custom { .. } => false,
    }
}

/// Collect every module the requirement depends on, in first-seen order
///
/// `module_complete` contributes its module directly; `task_complete`
/// contributes the task's owning module (pinned, or resolved through
/// `ownership`). Tasks whose owner can't be found contribute nothing.
pub fn extract_module_dependencies(
    requirement: &UnlockRequirement,
    ownership: &dyn TaskOwnership,
) -> Vec<String> {
    let mut modules = Vec::new();
    collect_module_dependencies(requirement, ownership, &mut modules);
    modules
}

fn collect_module_dependencies(
    requirement: &UnlockRequirement,
    ownership: &dyn TaskOwnership,
    modules: &mut Vec<String>,
) {
    let found = match requirement {
        UnlockRequirement::ModuleComplete { module_id } => Some(module_id.clone()),
        UnlockRequirement::TaskComplete { task, module } => module
            .clone()
            .or_else(|| ownership.find_task_module(task)),
        UnlockRequirement::And { requirements } | UnlockRequirement::Or { requirements } => {
            for child in requirements {
                collect_module_dependencies(child, ownership, modules);
            }
            None
        }
        _ => None,
    };

    if let Some(module_id) = found {
        if !modules.contains(&module_id) {
            modules.push(module_id);
        }
    }
}

/// One leaf of a requirement tree, ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementDetail {
    pub kind: RequirementKind,
    /// Task, module, state key or check id the leaf refers to
    pub target: Option<String>,
    pub label: String,
    pub hint: Option<String>,
}

impl RequirementDetail {
    pub fn describe(leaf: &UnlockRequirement) -> Self {
        let (target, label, hint) = match leaf {
            UnlockRequirement::Always => (None, "No requirement".to_string(), None),
            UnlockRequirement::Never => (None, "Not available".to_string(), None),
            UnlockRequirement::Password { hint, .. } => {
                (None, "Enter the password".to_string(), hint.clone())
            }
            UnlockRequirement::TaskComplete { task, .. } => (
                Some(task.clone()),
                format!("Complete task '{}'", task),
                None,
            ),
            UnlockRequirement::ModuleComplete { module_id } => (
                Some(module_id.clone()),
                format!("Complete module '{}'", module_id),
                None,
            ),
            UnlockRequirement::StateCheck { key, value } => (
                Some(key.clone()),
                format!("'{}' must be {}", key, value),
                None,
            ),
            UnlockRequirement::Custom { check } => (
                Some(check.clone()),
                format!("Special condition '{}'", check),
                None,
            ),
            UnlockRequirement::And { requirements } => (
                None,
                format!("All of {} requirements", requirements.len()),
                None,
            ),
            UnlockRequirement::Or { requirements } => (
                None,
                format!("Any of {} requirements", requirements.len()),
                None,
            ),
        };

        Self {
            kind: leaf.kind(),
            target,
            label,
            hint,
        }
    }
}

/// Flatten the tree into its leaves, preserving declaration order
pub fn extract_requirement_details(requirement: &UnlockRequirement) -> Vec<RequirementDetail> {
    leaves(requirement)
        .into_iter()
        .map(RequirementDetail::describe)
        .collect()
}

/// All non-combinator nodes of the tree, depth-first in declaration order
pub fn leaves(requirement: &UnlockRequirement) -> Vec<&UnlockRequirement> {
    let mut out = Vec::new();
    collect_leaves(requirement, &mut out);
    out
}

fn collect_leaves<'a>(requirement: &'a UnlockRequirement, out: &mut Vec<&'a UnlockRequirement>) {
    match requirement {
        UnlockRequirement::And { requirements } | UnlockRequirement::Or { requirements } => {
            for child in requirements {
                collect_leaves(child, out);
            }
        }
        leaf => out.push(leaf),
    }
}
