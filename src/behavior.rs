//! Behavior Registry
//!
//! Content refers to code by id: custom requirement checks, custom dialogue
//! actions and custom task validators are registered here at startup and
//! looked up when content names them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dialogue::DialogueAction;
use crate::requirement::CustomCheck;
use crate::task::TaskValidator;

#[derive(Default)]
pub struct BehaviorRegistry {
    checks: HashMap<String, Arc<dyn CustomCheck>>,
    actions: HashMap<String, Arc<dyn DialogueAction>>,
    validators: HashMap<String, Arc<dyn TaskValidator>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_check<C: CustomCheck + 'static>(&mut self, id: &str, check: C) {
        self.checks.insert(id.to_string(), Arc::new(check));
    }

    pub fn register_action<A: DialogueAction + 'static>(&mut self, id: &str, action: A) {
        self.actions.insert(id.to_string(), Arc::new(action));
    }

    pub fn register_validator<V: TaskValidator + 'static>(&mut self, id: &str, validator: V) {
        self.validators.insert(id.to_string(), Arc::new(validator));
    }

    pub fn check(&self, id: &str) -> Option<Arc<dyn CustomCheck>> {
        self.checks.get(id).cloned()
    }

    pub fn action(&self, id: &str) -> Option<Arc<dyn DialogueAction>> {
        self.actions.get(id).cloned()
    }

    pub fn validator(&self, id: &str) -> Option<Arc<dyn TaskValidator>> {
        self.validators.get(id).cloned()
    }

    /// Number of registered behaviors of every kind
    pub fn len(&self) -> usize {
        self.checks.len() + self.actions.len() + self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut checks: Vec<&String> = self.checks.keys().collect();
        let mut actions: Vec<&String> = self.actions.keys().collect();
        let mut validators: Vec<&String> = self.validators.keys().collect();
        checks.sort();
        actions.sort();
        validators.sort();

        f.debug_struct("BehaviorRegistry")
            .field("checks", &checks)
            .field("actions", &actions)
            .field("validators", &validators)
            .finish()
    }
}
