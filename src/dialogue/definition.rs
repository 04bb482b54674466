//! Dialogue Definitions
//!
//! Authored dialogue trees. Nodes are immutable content; which line is
//! showing is session state, not part of the node.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::action::ActionSpec;
use super::resolver::ROOT_NODE_ID;
use crate::error::{EntityKind, ProgressionError, Result};
use crate::requirement::UnlockRequirement;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueChoice {
    pub key: String,
    pub text: String,
    /// Node to advance to; `None` closes the dialogue
    #[serde(default)]
    pub next: Option<String>,
    /// Run in order before advancing
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl DialogueChoice {
    pub fn new(key: &str, text: &str, next: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            text: text.to_string(),
            next: next.map(str::to_string),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueNode {
    pub id: String,
    #[serde(default)]
    pub lines: Vec<String>,
    /// Marks this node as the task-ready checkpoint for a task
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub choices: Vec<DialogueChoice>,
}

impl DialogueNode {
    pub fn new(id: &str, lines: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
            task: None,
            choices: Vec::new(),
        }
    }

    pub fn for_task(mut self, task_id: &str) -> Self {
        self.task = Some(task_id.to_string());
        self
    }

    pub fn with_choice(mut self, choice: DialogueChoice) -> Self {
        self.choices.push(choice);
        self
    }

    /// At least one non-blank line
    pub fn has_content(&self) -> bool {
        self.lines.iter().any(|line| !line.trim().is_empty())
    }

    pub fn choice(&self, key: &str) -> Option<&DialogueChoice> {
        self.choices.iter().find(|c| c.key == key)
    }
}

/// Condition guarding a conditional entry branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryCondition {
    TaskActive { task: String },
    TaskAvailable { task: String },
    TaskCompleted { task: String },
    StateEquals { key: String, value: serde_json::Value },
    GreetingSeen { dialogue: String },
    Requirement { requirement: UnlockRequirement },
}

impl EntryCondition {
    pub fn is_task_active(&self) -> bool {
        matches!(self, EntryCondition::TaskActive { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryBranch {
    pub when: EntryCondition,
    pub node: String,
}

/// Picks the first node shown for a tree
#[derive(Debug, Clone, PartialEq)]
pub enum EntryResolver {
    Fixed(String),
    /// First matching branch in declaration order, else `default`
    Conditional {
        branches: Vec<EntryBranch>,
        default: String,
    },
}

/// Entry table as authored: `node` alone, or `branches` plus `default`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntry {
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub branches: Vec<EntryBranch>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDialogueTree {
    pub id: String,
    #[serde(default)]
    pub entry: Option<RawEntry>,
    #[serde(default)]
    pub nodes: Vec<DialogueNode>,
}

/// A derived transition: taking `choice` on `from` leads to `next`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueEdge {
    pub from: String,
    pub choice: String,
    /// `None` closes the dialogue
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueTree {
    pub id: String,
    pub nodes: Vec<DialogueNode>,
    /// Without an entry resolver the first declared node is the entry
    pub entry: Option<EntryResolver>,
}

impl DialogueTree {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            nodes: Vec::new(),
            entry: None,
        }
    }

    pub fn with_node(mut self, node: DialogueNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_entry(mut self, entry: EntryResolver) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn from_raw(raw: &RawDialogueTree) -> Result<Self> {
        let entry = match &raw.entry {
            None => None,
            Some(raw_entry) if raw_entry.branches.is_empty() => {
                match raw_entry.node.as_ref().or(raw_entry.default.as_ref()) {
                    Some(node) => Some(EntryResolver::Fixed(node.clone())),
                    None => {
                        return Err(ProgressionError::invalid(format!(
                            "dialogue '{}' has an empty entry table",
                            raw.id
                        )));
                    }
                }
            }
            Some(raw_entry) => {
                let default = raw_entry.default.clone().ok_or_else(|| {
                    ProgressionError::invalid(format!(
                        "dialogue '{}' has conditional entry without a default",
                        raw.id
                    ))
                })?;
                Some(EntryResolver::Conditional {
                    branches: raw_entry.branches.clone(),
                    default,
                })
            }
        };

        let tree = Self {
            id: raw.id.clone(),
            nodes: raw.nodes.clone(),
            entry,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Check node ids, choice keys and every node reference
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id == ROOT_NODE_ID {
                return Err(ProgressionError::invalid(format!(
                    "dialogue '{}' uses reserved node id '{}'",
                    self.id, ROOT_NODE_ID
                )));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(ProgressionError::invalid(format!(
                    "dialogue '{}' declares node '{}' twice",
                    self.id, node.id
                )));
            }
        }

        let known = |target: &str| ids.contains(target);

        match &self.entry {
            Some(EntryResolver::Fixed(node)) if !known(node) => {
                return Err(ProgressionError::invalid(format!(
                    "dialogue '{}' entry points at unknown node '{}'",
                    self.id, node
                )));
            }
            Some(EntryResolver::Conditional { branches, default }) => {
                for target in branches.iter().map(|b| &b.node).chain(std::iter::once(default)) {
                    if !known(target) {
                        return Err(ProgressionError::invalid(format!(
                            "dialogue '{}' entry points at unknown node '{}'",
                            self.id, target
                        )));
                    }
                }
            }
            _ => {}
        }

        for node in &self.nodes {
            let mut keys = HashSet::new();
            for choice in &node.choices {
                if !keys.insert(choice.key.as_str()) {
                    return Err(ProgressionError::invalid(format!(
                        "dialogue '{}' node '{}' declares choice '{}' twice",
                        self.id, node.id, choice.key
                    )));
                }
                if let Some(ref next) = choice.next {
                    if next != ROOT_NODE_ID && !known(next) {
                        return Err(ProgressionError::invalid(format!(
                            "dialogue '{}' choice '{}' on '{}' points at unknown node '{}'",
                            self.id, choice.key, node.id, next
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn node(&self, node_id: &str) -> Option<&DialogueNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn require_node(&self, node_id: &str) -> Result<&DialogueNode> {
        self.node(node_id)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::DialogueNode, node_id))
    }

    pub fn first_node(&self) -> Option<&DialogueNode> {
        self.nodes.first()
    }

    /// The node marked as ready for `task_id`
    pub fn task_ready_node(&self, task_id: &str) -> Option<&DialogueNode> {
        self.nodes
            .iter()
            .find(|n| n.task.as_deref() == Some(task_id))
    }

    /// At least one node with non-empty text
    pub fn has_content(&self) -> bool {
        self.nodes.iter().any(DialogueNode::has_content)
    }

    /// Authored edges out of a node, one per choice
    pub fn edges_from(node: &DialogueNode) -> Vec<DialogueEdge> {
        node.choices
            .iter()
            .map(|choice| DialogueEdge {
                from: node.id.clone(),
                choice: choice.key.clone(),
                next: choice.next.clone(),
            })
            .collect()
    }
}
