//! Module Content Definitions
//!
//! These structures are deserialized from TOML module files (Raw*) and
//! resolved into validated definitions.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::dialogue::{DialogueTree, RawDialogueTree};
use crate::error::{EntityKind, ProgressionError, Result};
use crate::requirement::UnlockRequirement;
use crate::task::ValidatorSpec;

/// A module file as it appears on disk
#[derive(Debug, Clone, Deserialize)]
pub struct RawModuleFile {
    pub module: RawModule,
}

/// Raw module data as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawModule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub unlock: Option<UnlockRequirement>,
    /// Module-wide greeting dialogue, shown once before any NPC dialogue
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub tasks: Vec<RawTask>,
    #[serde(default)]
    pub npcs: Vec<RawNpc>,
    #[serde(default)]
    pub objects: Vec<RawObject>,
    #[serde(default)]
    pub dialogues: Vec<RawDialogueTree>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub submission: SubmissionSpec,
    #[serde(default)]
    pub validator: Option<ValidatorSpec>,
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub unlock: Option<UnlockRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNpc {
    pub id: String,
    pub name: String,
    /// Task ids (within this module) the NPC hands out
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub dialogue: Option<String>,
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub unlock: Option<UnlockRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dialogue: Option<String>,
    #[serde(default)]
    pub unlock: Option<UnlockRequirement>,
}

// ============================================================================
// Resolved Structures
// ============================================================================

/// What a player hands in to finish a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    #[default]
    Text,
    Code,
    /// No content; choosing the submit option is enough
    Confirmation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSpec {
    #[serde(default)]
    pub kind: SubmissionKind,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// A task; its runtime status is derived from progress, never stored here
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub submission: SubmissionSpec,
    pub validator: Option<ValidatorSpec>,
    /// Ordering hint for display; ties keep declaration order
    pub order: Option<i32>,
    pub unlock: Option<UnlockRequirement>,
}

impl Task {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            submission: SubmissionSpec::default(),
            validator: None,
            order: None,
            unlock: None,
        }
    }

    pub fn with_unlock(mut self, requirement: UnlockRequirement) -> Self {
        self.unlock = Some(requirement);
        self
    }

    pub fn with_validator(mut self, validator: ValidatorSpec) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_submission(mut self, kind: SubmissionKind) -> Self {
        self.submission.kind = kind;
        self
    }

    pub fn from_raw(raw: &RawTask) -> Self {
        Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            description: raw.description.clone(),
            submission: raw.submission.clone(),
            validator: raw.validator.clone(),
            order: raw.order,
            unlock: raw.unlock.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NpcDefinition {
    pub id: String,
    pub name: String,
    pub tasks: Vec<String>,
    pub dialogue: Option<String>,
    pub greeting: Option<String>,
    pub unlock: Option<UnlockRequirement>,
}

impl NpcDefinition {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            tasks: Vec::new(),
            dialogue: None,
            greeting: None,
            unlock: None,
        }
    }

    pub fn with_tasks(mut self, tasks: &[&str]) -> Self {
        self.tasks = tasks.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_dialogue(mut self, dialogue_id: &str) -> Self {
        self.dialogue = Some(dialogue_id.to_string());
        self
    }

    pub fn with_greeting(mut self, dialogue_id: &str) -> Self {
        self.greeting = Some(dialogue_id.to_string());
        self
    }

    pub fn with_unlock(mut self, requirement: UnlockRequirement) -> Self {
        self.unlock = Some(requirement);
        self
    }

    pub fn from_raw(raw: &RawNpc) -> Self {
        Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            tasks: raw.tasks.clone(),
            dialogue: raw.dialogue.clone(),
            greeting: raw.greeting.clone(),
            unlock: raw.unlock.clone(),
        }
    }
}

/// A non-NPC interactable (door, terminal, chest) that may be gated
#[derive(Debug, Clone, PartialEq)]
pub struct InteractableObject {
    pub id: String,
    pub name: String,
    pub description: String,
    pub dialogue: Option<String>,
    pub unlock: Option<UnlockRequirement>,
}

impl InteractableObject {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            dialogue: None,
            unlock: None,
        }
    }

    pub fn with_dialogue(mut self, dialogue_id: &str) -> Self {
        self.dialogue = Some(dialogue_id.to_string());
        self
    }

    pub fn with_unlock(mut self, requirement: UnlockRequirement) -> Self {
        self.unlock = Some(requirement);
        self
    }

    pub fn from_raw(raw: &RawObject) -> Self {
        Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            description: raw.description.clone(),
            dialogue: raw.dialogue.clone(),
            unlock: raw.unlock.clone(),
        }
    }
}

/// A fully resolved module definition
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDefinition {
    pub id: String,
    pub name: String,
    pub summary: String,
    pub icon: Option<String>,
    pub unlock: Option<UnlockRequirement>,
    pub greeting: Option<String>,
    /// Declaration order is significant
    pub tasks: Vec<Task>,
    pub npcs: Vec<NpcDefinition>,
    pub objects: Vec<InteractableObject>,
    pub dialogues: HashMap<String, DialogueTree>,
}

impl ModuleDefinition {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            summary: String::new(),
            icon: None,
            unlock: None,
            greeting: None,
            tasks: Vec::new(),
            npcs: Vec::new(),
            objects: Vec::new(),
            dialogues: HashMap::new(),
        }
    }

    pub fn with_unlock(mut self, requirement: UnlockRequirement) -> Self {
        self.unlock = Some(requirement);
        self
    }

    pub fn with_greeting(mut self, dialogue_id: &str) -> Self {
        self.greeting = Some(dialogue_id.to_string());
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_npc(mut self, npc: NpcDefinition) -> Self {
        self.npcs.push(npc);
        self
    }

    pub fn with_object(mut self, object: InteractableObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_dialogue(mut self, tree: DialogueTree) -> Self {
        self.dialogues.insert(tree.id.clone(), tree);
        self
    }

    /// Create a ModuleDefinition from raw TOML data
    pub fn from_raw(raw: &RawModule) -> Result<Self> {
        let mut task_ids = HashSet::new();
        for task in &raw.tasks {
            if !task_ids.insert(task.id.as_str()) {
                return Err(ProgressionError::invalid(format!(
                    "module '{}' declares task '{}' twice",
                    raw.id, task.id
                )));
            }
        }

        let mut dialogues = HashMap::new();
        for raw_tree in &raw.dialogues {
            let tree = DialogueTree::from_raw(raw_tree)?;
            if dialogues.insert(tree.id.clone(), tree).is_some() {
                return Err(ProgressionError::invalid(format!(
                    "module '{}' declares dialogue '{}' twice",
                    raw.id, raw_tree.id
                )));
            }
        }

        Ok(Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            summary: raw.summary.clone(),
            icon: raw.icon.clone(),
            unlock: raw.unlock.clone(),
            greeting: raw.greeting.clone(),
            tasks: raw.tasks.iter().map(Task::from_raw).collect(),
            npcs: raw.npcs.iter().map(NpcDefinition::from_raw).collect(),
            objects: raw.objects.iter().map(InteractableObject::from_raw).collect(),
            dialogues,
        })
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn npc(&self, npc_id: &str) -> Option<&NpcDefinition> {
        self.npcs.iter().find(|n| n.id == npc_id)
    }

    pub fn object(&self, object_id: &str) -> Option<&InteractableObject> {
        self.objects.iter().find(|o| o.id == object_id)
    }

    pub fn dialogue(&self, dialogue_id: &str) -> Option<&DialogueTree> {
        self.dialogues.get(dialogue_id)
    }

    /// Look up a dialogue tree, reporting absence as `NotFound`
    pub fn require_dialogue(&self, dialogue_id: &str) -> Result<&DialogueTree> {
        self.dialogue(dialogue_id)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Dialogue, dialogue_id))
    }

    /// The NPC's tasks in the NPC's declared order
    pub fn npc_tasks(&self, npc: &NpcDefinition) -> Result<Vec<&Task>> {
        npc.tasks
            .iter()
            .map(|task_id| {
                self.task(task_id)
                    .ok_or_else(|| ProgressionError::not_found(EntityKind::Task, task_id.as_str()))
            })
            .collect()
    }

    /// Tasks sorted by ordering hint; unhinted tasks follow, ties keep declaration order
    pub fn ordered_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().collect();
        tasks.sort_by_key(|t| (t.order.is_none(), t.order.unwrap_or_default()));
        tasks
    }

    /// Dialogue ids referenced by npcs, objects and the module greeting that don't exist
    pub fn missing_dialogue_references(&self) -> Vec<String> {
        let referenced = self
            .greeting
            .iter()
            .chain(self.npcs.iter().flat_map(|n| n.dialogue.iter().chain(n.greeting.iter())))
            .chain(self.objects.iter().flat_map(|o| o.dialogue.iter()));

        let mut missing: Vec<String> = referenced
            .filter(|id| !self.dialogues.contains_key(id.as_str()))
            .cloned()
            .collect();
        missing.dedup();
        missing
    }

    /// Task ids referenced by npcs or dialogue nodes that the module doesn't declare
    pub fn missing_task_references(&self) -> Vec<String> {
        let referenced = self
            .npcs
            .iter()
            .flat_map(|n| n.tasks.iter())
            .chain(
                self.dialogues
                    .values()
                    .flat_map(|tree| tree.nodes.iter().filter_map(|node| node.task.as_ref())),
            );

        let mut missing: Vec<String> = referenced
            .filter(|id| self.task(id).is_none())
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}
