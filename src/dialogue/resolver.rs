//! Dialogue Resolver
//!
//! Decides which node an NPC shows right now. Resolution reads progress but
//! never mutates it; mutation only happens when a session takes a choice.
//!
//! A locked NPC shows nothing. Otherwise, in order of precedence:
//! 1. an unseen greeting with content (npc greeting, then module greeting)
//! 2. a generated root menu when the NPC has active tasks
//! 3. the authored entry of the NPC's dialogue tree
//!
//! The root menu is spliced into the authored graph by edge synthesis: each
//! generated choice gets an ordinary `DialogueEdge` into the authored tree,
//! so nothing downstream needs to know the node was generated.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::definition::{DialogueChoice, DialogueEdge, DialogueNode, DialogueTree, EntryCondition, EntryResolver};
use crate::config::DialogueConfig;
use crate::content::{ModuleDefinition, ModuleRegistry, NpcDefinition};
use crate::error::{EntityKind, ProgressionError, Result};
use crate::progress::ProgressStore;
use crate::requirement::{RequirementContext, UnlockRequirement};
use crate::task::{TaskAvailabilityService, TaskContext, TaskStatus};

/// Id of the generated root menu node; reserved in authored trees
pub const ROOT_NODE_ID: &str = "__root__";
pub const TALK_CHOICE: &str = "talk";
pub const GOODBYE_CHOICE: &str = "goodbye";
pub const TASK_CHOICE_PREFIX: &str = "task_";
/// Hard cap on generated task choice labels, ellipsis included
pub const MAX_CHOICE_LABEL_CHARS: usize = 50;

const ELLIPSIS: &str = "...";

/// `"[Task] - {name} ({status})"`, truncated to the label cap
pub fn task_choice_label(name: &str, status: TaskStatus) -> String {
    let label = format!("[Task] - {} ({})", name, status.as_str());
    if label.chars().count() <= MAX_CHOICE_LABEL_CHARS {
        return label;
    }

    let keep = MAX_CHOICE_LABEL_CHARS - ELLIPSIS.chars().count();
    let mut truncated: String = label.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

pub fn task_choice_key(task_id: &str) -> String {
    format!("{}{}", TASK_CHOICE_PREFIX, task_id)
}

/// Where a resolved node came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOrigin {
    /// Entry of an unseen greeting dialogue
    Greeting,
    /// Generated menu of active tasks
    RootMenu,
    Authored,
}

/// A node ready to display, with its outgoing edges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedNode {
    pub node: DialogueNode,
    pub origin: NodeOrigin,
    /// Tree that edge targets are looked up in
    pub tree_id: Option<String>,
    pub edges: Vec<DialogueEdge>,
}

impl ResolvedNode {
    pub fn authored(tree: &DialogueTree, node: &DialogueNode, origin: NodeOrigin) -> Self {
        Self {
            node: node.clone(),
            origin,
            tree_id: Some(tree.id.clone()),
            edges: DialogueTree::edges_from(node),
        }
    }

    pub fn edge(&self, choice_key: &str) -> Option<&DialogueEdge> {
        self.edges.iter().find(|e| e.choice == choice_key)
    }

    pub fn choice_keys(&self) -> Vec<&str> {
        self.node.choices.iter().map(|c| c.key.as_str()).collect()
    }
}

pub struct DialogueResolver {
    registry: Arc<dyn ModuleRegistry>,
    store: Arc<dyn ProgressStore>,
    availability: Arc<TaskAvailabilityService>,
    config: DialogueConfig,
}

impl DialogueResolver {
    pub fn new(
        registry: Arc<dyn ModuleRegistry>,
        store: Arc<dyn ProgressStore>,
        availability: Arc<TaskAvailabilityService>,
        config: DialogueConfig,
    ) -> Self {
        Self {
            registry,
            store,
            availability,
            config,
        }
    }

    /// Look up the module and NPC by id, then resolve
    pub async fn resolve_for(&self, module_id: &str, npc_id: &str) -> Result<Option<ResolvedNode>> {
        let module = self.registry.require_module(module_id)?;
        let npc = module
            .npc(npc_id)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Npc, npc_id))?;
        self.resolve_current_node(npc, &module).await
    }

    /// The single node this NPC shows now
    ///
    /// `None` if the NPC is still locked or has nothing to say.
    pub async fn resolve_current_node(
        &self,
        npc: &NpcDefinition,
        module: &ModuleDefinition,
    ) -> Result<Option<ResolvedNode>> {
        if !self.is_unlocked(npc.unlock.as_ref(), &module.id).await {
            debug!("NPC '{}' in '{}' is locked", npc.id, module.id);
            return Ok(None);
        }

        if let Some(greeting) = self.pending_greeting(npc, module).await? {
            debug!("NPC '{}' shows greeting {:?}", npc.id, greeting.tree_id);
            return Ok(Some(greeting));
        }

        let tree = match npc.dialogue {
            Some(ref dialogue_id) => Some(module.require_dialogue(dialogue_id)?),
            None => None,
        };

        let ctx = TaskContext::load(self.store.as_ref(), &module.id);

        let tasks = module.npc_tasks(npc)?;
        if !tasks.is_empty() {
            let classification = self.availability.classify(&tasks, &ctx).await;
            if !classification.active.is_empty() {
                debug!(
                    "NPC '{}' shows root menu for {} active tasks",
                    npc.id,
                    classification.active.len()
                );
                let root = self
                    .root_menu(module, tree, &classification.active, &ctx)
                    .await?;
                return Ok(Some(root));
            }
        }

        let Some(tree) = tree else {
            return Ok(None);
        };
        self.resolve_tree_entry(module, tree, &ctx, NodeOrigin::Authored)
            .await
    }

    /// Resolve an interactable object's dialogue through its authored entry
    ///
    /// `None` if the object is locked or has no dialogue.
    pub async fn resolve_object(&self, module_id: &str, object_id: &str) -> Result<Option<ResolvedNode>> {
        let module = self.registry.require_module(module_id)?;
        let object = module
            .object(object_id)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Object, object_id))?;

        if !self.is_unlocked(object.unlock.as_ref(), &module.id).await {
            debug!("Object '{}' in '{}' is locked", object.id, module.id);
            return Ok(None);
        }
        let Some(ref dialogue_id) = object.dialogue else {
            return Ok(None);
        };
        let tree = module.require_dialogue(dialogue_id)?;
        let ctx = TaskContext::load(self.store.as_ref(), &module.id);
        self.resolve_tree_entry(&module, tree, &ctx, NodeOrigin::Authored)
            .await
    }

    /// Resolve a node by id inside a tree, as a session follows an edge
    pub fn resolve_node(&self, module_id: &str, tree_id: &str, node_id: &str) -> Result<ResolvedNode> {
        let module = self.registry.require_module(module_id)?;
        let tree = module.require_dialogue(tree_id)?;
        let node = tree.require_node(node_id)?;
        Ok(ResolvedNode::authored(tree, node, NodeOrigin::Authored))
    }

    async fn is_unlocked(&self, unlock: Option<&UnlockRequirement>, module_id: &str) -> bool {
        let ctx = RequirementContext::new(module_id);
        self.availability
            .evaluator()
            .evaluate_optional(unlock, &ctx)
            .await
    }

    /// First unseen greeting with content, npc greeting before module greeting
    async fn pending_greeting(
        &self,
        npc: &NpcDefinition,
        module: &ModuleDefinition,
    ) -> Result<Option<ResolvedNode>> {
        for dialogue_id in npc.greeting.iter().chain(module.greeting.iter()) {
            if self.store.has_seen_greeting(&module.id, dialogue_id) {
                continue;
            }

            let tree = module.require_dialogue(dialogue_id)?;
            if !tree.has_content() {
                continue;
            }

            let ctx = TaskContext::load(self.store.as_ref(), &module.id);
            match self
                .resolve_tree_entry(module, tree, &ctx, NodeOrigin::Greeting)
                .await?
            {
                Some(node) if node.node.has_content() => return Ok(Some(node)),
                Some(node) => debug!(
                    "Greeting '{}' enters on blank node '{}'; skipped",
                    dialogue_id, node.node.id
                ),
                None => {}
            }
        }
        Ok(None)
    }

    async fn resolve_tree_entry(
        &self,
        module: &ModuleDefinition,
        tree: &DialogueTree,
        ctx: &TaskContext,
        origin: NodeOrigin,
    ) -> Result<Option<ResolvedNode>> {
        let Some(node_id) = self.entry_node_id(module, tree, ctx, false).await? else {
            return Ok(None);
        };
        let node = tree.require_node(&node_id)?;
        Ok(Some(ResolvedNode::authored(tree, node, origin)))
    }

    /// Run the tree's entry resolver
    ///
    /// With `skip_task_active`, `task_active` branches are ignored; that is
    /// how "talk" avoids bouncing straight back into a submission flow.
    pub async fn entry_node_id(
        &self,
        module: &ModuleDefinition,
        tree: &DialogueTree,
        ctx: &TaskContext,
        skip_task_active: bool,
    ) -> Result<Option<String>> {
        match &tree.entry {
            None => Ok(tree.first_node().map(|n| n.id.clone())),
            Some(EntryResolver::Fixed(node)) => Ok(Some(node.clone())),
            Some(EntryResolver::Conditional { branches, default }) => {
                for branch in branches {
                    if skip_task_active && branch.when.is_task_active() {
                        continue;
                    }
                    if self.condition_holds(&branch.when, module, ctx).await? {
                        debug!("Dialogue '{}' entry matched node '{}'", tree.id, branch.node);
                        return Ok(Some(branch.node.clone()));
                    }
                }
                Ok(Some(default.clone()))
            }
        }
    }

    async fn condition_holds(
        &self,
        condition: &EntryCondition,
        module: &ModuleDefinition,
        ctx: &TaskContext,
    ) -> Result<bool> {
        Ok(match condition {
            EntryCondition::TaskActive { task } => ctx.is_active(task),
            EntryCondition::TaskCompleted { task } => ctx.is_completed(task),
            EntryCondition::TaskAvailable { task } => {
                let task = module
                    .task(task)
                    .ok_or_else(|| ProgressionError::not_found(EntityKind::Task, task.as_str()))?;
                self.availability.status(task, ctx).await == TaskStatus::Available
            }
            EntryCondition::StateEquals { key, value } => self
                .store
                .get_state_field(&module.id, key)
                .is_some_and(|stored| &stored == value),
            EntryCondition::GreetingSeen { dialogue } => {
                self.store.has_seen_greeting(&module.id, dialogue)
            }
            EntryCondition::Requirement { requirement } => {
                let requirement_ctx = RequirementContext::new(&module.id);
                self.availability
                    .evaluator()
                    .evaluate(requirement, &requirement_ctx)
                    .await
            }
        })
    }

    /// Generate the root menu node and its synthesized edges
    async fn root_menu(
        &self,
        module: &ModuleDefinition,
        tree: Option<&DialogueTree>,
        active: &[String],
        ctx: &TaskContext,
    ) -> Result<ResolvedNode> {
        let mut choices = Vec::new();

        let has_talk = tree.is_some_and(DialogueTree::has_content);
        if has_talk {
            choices.push(DialogueChoice::new(TALK_CHOICE, &self.config.talk_label, None));
        }

        for task_id in active {
            let task = module
                .task(task_id)
                .ok_or_else(|| ProgressionError::not_found(EntityKind::Task, task_id.as_str()))?;
            choices.push(DialogueChoice::new(
                &task_choice_key(task_id),
                &task_choice_label(&task.name, TaskStatus::Active),
                None,
            ));
        }

        choices.push(DialogueChoice::new(GOODBYE_CHOICE, &self.config.goodbye_label, None));

        let node = DialogueNode {
            id: ROOT_NODE_ID.to_string(),
            lines: self.config.root_greeting.clone(),
            task: None,
            choices,
        };

        let edges = self
            .synthesize_root_edges(module, tree, has_talk, active, ctx)
            .await?;

        Ok(ResolvedNode {
            node,
            origin: NodeOrigin::RootMenu,
            tree_id: tree.map(|t| t.id.clone()),
            edges,
        })
    }

    /// Edges out of the root menu into the authored tree
    ///
    /// A task choice whose task has no ready node gets no edge, which makes
    /// the choice a no-op.
    pub async fn synthesize_root_edges(
        &self,
        module: &ModuleDefinition,
        tree: Option<&DialogueTree>,
        has_talk: bool,
        active: &[String],
        ctx: &TaskContext,
    ) -> Result<Vec<DialogueEdge>> {
        let mut edges = Vec::new();

        if has_talk {
            if let Some(tree) = tree {
                let next = self.entry_node_id(module, tree, ctx, true).await?;
                edges.push(DialogueEdge {
                    from: ROOT_NODE_ID.to_string(),
                    choice: TALK_CHOICE.to_string(),
                    next,
                });
            }
        }

        for task_id in active {
            match tree.and_then(|t| t.task_ready_node(task_id)) {
                Some(ready) => edges.push(DialogueEdge {
                    from: ROOT_NODE_ID.to_string(),
                    choice: task_choice_key(task_id),
                    next: Some(ready.id.clone()),
                }),
                None => debug!(
                    "Active task '{}' in '{}' has no ready node; choice is a no-op",
                    task_id, module.id
                ),
            }
        }

        edges.push(DialogueEdge {
            from: ROOT_NODE_ID.to_string(),
            choice: GOODBYE_CHOICE.to_string(),
            next: None,
        });

        Ok(edges)
    }
}
