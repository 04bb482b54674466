//! Content Registry
//!
//! Holds every registered module definition in registration order and an
//! index from task id to owning module.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::definition::{ModuleDefinition, NpcDefinition, Task};
use crate::error::{EntityKind, ProgressionError, Result};
use crate::requirement::extract_module_dependencies;

/// Lookup of module definitions by id
pub trait ModuleRegistry: Send + Sync {
    fn get_module(&self, module_id: &str) -> Option<Arc<ModuleDefinition>>;

    /// Module ids in registration order
    fn registered_module_ids(&self) -> Vec<String>;

    fn require_module(&self, module_id: &str) -> Result<Arc<ModuleDefinition>> {
        self.get_module(module_id)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Module, module_id))
    }
}

/// Resolves which module owns a task id
pub trait TaskOwnership: Send + Sync {
    fn find_task_module(&self, task_id: &str) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct ContentRegistry {
    modules: HashMap<String, Arc<ModuleDefinition>>,
    order: Vec<String>,
    /// task id -> owning module; first registration wins
    task_owners: HashMap<String, String>,
}

impl ContentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module, replacing any earlier module with the same id
    pub fn register(&mut self, module: ModuleDefinition) {
        let module_id = module.id.clone();
        let task_count = module.tasks.len();

        if self.modules.insert(module_id.clone(), Arc::new(module)).is_some() {
            warn!("Module '{}' registered twice, replacing earlier definition", module_id);
        } else {
            self.order.push(module_id.clone());
        }
        self.rebuild_task_owners(&module_id);

        debug!("Registered module '{}' with {} tasks", module_id, task_count);
    }

    /// Recompute task ownership in registration order
    ///
    /// A replaced module's contested task ids pass to the next module in line.
    fn rebuild_task_owners(&mut self, registered: &str) {
        let mut owners: HashMap<String, String> = HashMap::new();
        for module in self.order.iter().filter_map(|id| self.modules.get(id)) {
            for task in &module.tasks {
                match owners.get(&task.id) {
                    Some(owner) if owner != &module.id => {
                        if module.id == registered || owner == registered {
                            warn!(
                                "Task id '{}' is declared by both '{}' and '{}'; unpinned references resolve to '{}'",
                                task.id, owner, module.id, owner
                            );
                        }
                    }
                    Some(_) => {}
                    None => {
                        owners.insert(task.id.clone(), module.id.clone());
                    }
                }
            }
        }
        self.task_owners = owners;
    }

    pub fn with_module(mut self, module: ModuleDefinition) -> Self {
        self.register(module);
        self
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Arc<ModuleDefinition>> {
        self.order.iter().filter_map(|id| self.modules.get(id))
    }

    /// Find an NPC and its module
    pub fn find_npc(&self, module_id: &str, npc_id: &str) -> Result<(Arc<ModuleDefinition>, NpcDefinition)> {
        let module = self.require_module(module_id)?;
        let npc = module
            .npc(npc_id)
            .cloned()
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Npc, npc_id))?;
        Ok((module, npc))
    }

    pub fn find_task(&self, module_id: &str, task_id: &str) -> Result<Task> {
        let module = self.require_module(module_id)?;
        module
            .task(task_id)
            .cloned()
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Task, task_id))
    }

    /// Log dangling references between modules, tasks and dialogues
    ///
    /// Nothing here is fatal: a missing reference just resolves to nothing
    /// at runtime.
    pub fn validate_references(&self) -> usize {
        let mut problems = 0;

        for module in self.modules() {
            for dialogue_id in module.missing_dialogue_references() {
                warn!("Module '{}' references missing dialogue '{}'", module.id, dialogue_id);
                problems += 1;
            }
            for task_id in module.missing_task_references() {
                warn!("Module '{}' references missing task '{}'", module.id, task_id);
                problems += 1;
            }
            if let Some(ref unlock) = module.unlock {
                for dependency in extract_module_dependencies(unlock, self) {
                    if !self.modules.contains_key(&dependency) {
                        warn!(
                            "Module '{}' depends on unregistered module '{}'",
                            module.id, dependency
                        );
                        problems += 1;
                    }
                }
            }
        }

        problems
    }
}

impl ModuleRegistry for ContentRegistry {
    fn get_module(&self, module_id: &str) -> Option<Arc<ModuleDefinition>> {
        self.modules.get(module_id).cloned()
    }

    fn registered_module_ids(&self) -> Vec<String> {
        self.order.clone()
    }
}

impl TaskOwnership for ContentRegistry {
    fn find_task_module(&self, task_id: &str) -> Option<String> {
        self.task_owners.get(task_id).cloned()
    }
}
