//! Progression Engine
//!
//! Wires every service over one content registry, one progress store and
//! one behavior registry. Nothing here is global: build as many engines as
//! you like, e.g. one per test.

use std::sync::Arc;

use tracing::info;

use crate::behavior::BehaviorRegistry;
use crate::config::EngineConfig;
use crate::content::{ContentRegistry, ModuleRegistry};
use crate::dialogue::{DialogueResolver, DialogueRunner, DialogueSession, ResolvedNode};
use crate::error::{EntityKind, ErrorHandler, ProgressionError, Result};
use crate::events::ProgressionEvent;
use crate::progress::{ModuleProgressionState, ProgressStore};
use crate::progression::ModuleProgressionService;
use crate::requirement::{EvaluatedDetail, RequirementContext, RequirementEvaluator};
use crate::task::{TaskAvailabilityService, TaskContext, TaskLifecycle, TaskStatus};
use crate::worldmap::{Worldmap, WorldmapGenerator};

/// A task with its derived status, for task lists
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TaskView {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
}

pub struct ProgressionEngine {
    config: EngineConfig,
    content: Arc<ContentRegistry>,
    store: Arc<dyn ProgressStore>,
    behaviors: Arc<BehaviorRegistry>,
    errors: Arc<dyn ErrorHandler>,
    evaluator: Arc<RequirementEvaluator>,
    availability: Arc<TaskAvailabilityService>,
    progression: Arc<ModuleProgressionService>,
    lifecycle: Arc<TaskLifecycle>,
    resolver: Arc<DialogueResolver>,
    runner: DialogueRunner,
    worldmap: WorldmapGenerator,
}

impl ProgressionEngine {
    pub fn new(
        config: EngineConfig,
        content: Arc<ContentRegistry>,
        store: Arc<dyn ProgressStore>,
        behaviors: Arc<BehaviorRegistry>,
        errors: Arc<dyn ErrorHandler>,
    ) -> Self {
        let evaluator = Arc::new(RequirementEvaluator::new(
            store.clone(),
            content.clone(),
            behaviors.clone(),
            errors.clone(),
            config.evaluation.custom_check_timeout(),
        ));
        let availability = Arc::new(TaskAvailabilityService::new(evaluator.clone()));
        let progression = Arc::new(ModuleProgressionService::new(
            content.clone(),
            store.clone(),
            evaluator.clone(),
        ));
        let lifecycle = Arc::new(TaskLifecycle::new(
            content.clone(),
            store.clone(),
            availability.clone(),
            progression.clone(),
            behaviors.clone(),
            errors.clone(),
        ));
        let resolver = Arc::new(DialogueResolver::new(
            content.clone(),
            store.clone(),
            availability.clone(),
            config.dialogue.clone(),
        ));
        let runner = DialogueRunner::new(
            resolver.clone(),
            lifecycle.clone(),
            store.clone(),
            behaviors.clone(),
        );
        let worldmap = WorldmapGenerator::new(
            content.clone(),
            content.clone(),
            progression.clone(),
            config.worldmap.clone(),
        );

        Self {
            config,
            content,
            store,
            behaviors,
            errors,
            evaluator,
            availability,
            progression,
            lifecycle,
            resolver,
            runner,
            worldmap,
        }
    }

    /// Same store and behaviors over freshly loaded content
    pub fn with_content(&self, content: Arc<ContentRegistry>) -> Self {
        Self::new(
            self.config.clone(),
            content,
            self.store.clone(),
            self.behaviors.clone(),
            self.errors.clone(),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn content(&self) -> &Arc<ContentRegistry> {
        &self.content
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    pub fn evaluator(&self) -> &Arc<RequirementEvaluator> {
        &self.evaluator
    }

    pub fn progression(&self) -> &Arc<ModuleProgressionService> {
        &self.progression
    }

    pub fn lifecycle(&self) -> &Arc<TaskLifecycle> {
        &self.lifecycle
    }

    pub fn resolver(&self) -> &Arc<DialogueResolver> {
        &self.resolver
    }

    /// Apply the configured initial unlock policy
    pub async fn initialize(&self) -> Result<Vec<ProgressionEvent>> {
        let events = self
            .progression
            .initialize(&self.config.progression.initial_unlock)
            .await?;
        info!("Progression engine ready with {} modules", self.content.len());
        Ok(events)
    }

    pub fn module_state(&self, module_id: &str) -> ModuleProgressionState {
        self.progression.state(module_id)
    }

    /// Unlock requirement leaves with their current satisfaction
    pub async fn module_lock_reasons(&self, module_id: &str) -> Result<Vec<EvaluatedDetail>> {
        let module = self.content.require_module(module_id)?;
        let ctx = RequirementContext::new(module_id);
        Ok(match module.unlock {
            Some(ref unlock) => self.evaluator.evaluate_details(unlock, &ctx).await,
            None => Vec::new(),
        })
    }

    /// Try to unlock a locked module with player-entered input
    pub async fn unlock_with_password(&self, module_id: &str, attempt: &str) -> Result<Vec<ProgressionEvent>> {
        let module = self.content.require_module(module_id)?;
        if self.progression.state(module_id) != ModuleProgressionState::Locked {
            return Ok(Vec::new());
        }
        let Some(ref unlock) = module.unlock else {
            return Ok(Vec::new());
        };

        let ctx = RequirementContext::new(module_id);
        if !self
            .evaluator
            .evaluate_with_input(unlock, &ctx, Some(attempt))
            .await
        {
            return Ok(Vec::new());
        }

        self.progression.unlock(module_id)?;
        Ok(vec![ProgressionEvent::ModuleUnlocked {
            module_id: module_id.to_string(),
        }])
    }

    /// An NPC's tasks with their statuses, in the NPC's order
    pub async fn npc_tasks(&self, module_id: &str, npc_id: &str) -> Result<Vec<TaskView>> {
        let (module, npc) = self.content.find_npc(module_id, npc_id)?;
        let ctx = TaskContext::load(self.store.as_ref(), module_id);

        let mut views = Vec::new();
        for task in module.npc_tasks(&npc)? {
            views.push(TaskView {
                id: task.id.clone(),
                name: task.name.clone(),
                status: self.availability.status(task, &ctx).await,
            });
        }
        Ok(views)
    }

    /// Every task in the module for a task log, sorted by ordering hint
    pub async fn module_tasks(&self, module_id: &str) -> Result<Vec<TaskView>> {
        let module = self.content.require_module(module_id)?;
        let ctx = TaskContext::load(self.store.as_ref(), module_id);

        let mut views = Vec::new();
        for task in module.ordered_tasks() {
            views.push(TaskView {
                id: task.id.clone(),
                name: task.name.clone(),
                status: self.availability.status(task, &ctx).await,
            });
        }
        Ok(views)
    }

    /// The first task in the module not yet completed
    pub fn next_task(&self, module_id: &str) -> Result<Option<String>> {
        let module = self.content.require_module(module_id)?;
        let ctx = TaskContext::load(self.store.as_ref(), module_id);
        let tasks: Vec<_> = module.tasks.iter().collect();
        Ok(self
            .availability
            .next_sequential_task(&tasks, &ctx)
            .map(|t| t.id.clone()))
    }

    pub async fn is_npc_unlocked(&self, module_id: &str, npc_id: &str) -> Result<bool> {
        let (_module, npc) = self.content.find_npc(module_id, npc_id)?;
        let ctx = RequirementContext::new(module_id);
        Ok(self.evaluator.evaluate_optional(npc.unlock.as_ref(), &ctx).await)
    }

    pub async fn is_object_unlocked(&self, module_id: &str, object_id: &str) -> Result<bool> {
        let module = self.content.require_module(module_id)?;
        let object = module
            .object(object_id)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Object, object_id))?;
        let ctx = RequirementContext::new(module_id);
        Ok(self.evaluator.evaluate_optional(object.unlock.as_ref(), &ctx).await)
    }

    pub async fn accept_task(&self, module_id: &str, task_id: &str) -> Result<Vec<ProgressionEvent>> {
        self.lifecycle.accept_task(module_id, task_id).await
    }

    pub async fn submit_task(&self, module_id: &str, task_id: &str, submission: &str) -> Result<Vec<ProgressionEvent>> {
        self.lifecycle.submit_task(module_id, task_id, submission).await
    }

    pub async fn complete_task(&self, module_id: &str, task_id: &str) -> Result<Vec<ProgressionEvent>> {
        self.lifecycle.complete_task(module_id, task_id).await
    }

    /// The node an NPC shows now, without side effects
    pub async fn current_node(&self, module_id: &str, npc_id: &str) -> Result<Option<ResolvedNode>> {
        self.resolver.resolve_for(module_id, npc_id).await
    }

    /// What an interactable object shows; `None` while locked or without dialogue
    pub async fn object_node(&self, module_id: &str, object_id: &str) -> Result<Option<ResolvedNode>> {
        self.resolver.resolve_object(module_id, object_id).await
    }

    pub async fn open_dialogue(&self, module_id: &str, npc_id: &str) -> Result<Option<DialogueSession>> {
        self.runner.open(module_id, npc_id).await
    }

    pub async fn choose(&self, session: &mut DialogueSession, choice_key: &str, input: Option<&str>) -> Result<()> {
        self.runner.choose(session, choice_key, input).await
    }

    pub async fn refresh_dialogue(&self, session: &mut DialogueSession) -> Result<()> {
        self.runner.refresh(session).await
    }

    /// Worldmap over every registered module
    pub fn worldmap(&self) -> Worldmap {
        self.worldmap.generate_all()
    }

    pub fn worldmap_for(&self, module_ids: &[String]) -> Worldmap {
        self.worldmap.generate(module_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentLoader;
    use crate::error::LogErrorHandler;
    use crate::progress::InMemoryProgressStore;
    use crate::dialogue::NodeOrigin;
    use crate::worldmap::WorldmapLayout;
    use std::fs;
    use tempfile::TempDir;

    const INTRO: &str = r#"
[module]
id = "intro"
name = "Introduction"
summary = "Meet the mentor"
greeting = "welcome"

[[module.tasks]]
id = "hello"
name = "Say hello"
order = 2
validator = { kind = "exact", expected = "hello", ignore_case = true }

[[module.tasks]]
id = "name"
name = "Tell your name"
order = 1
unlock = { kind = "task_complete", task = "hello" }

[[module.npcs]]
id = "mentor"
name = "Mentor"
tasks = ["hello", "name"]
dialogue = "mentor_talk"

[[module.objects]]
id = "gate"
name = "Gate"
dialogue = "welcome"
unlock = { kind = "task_complete", task = "hello" }

[[module.dialogues]]
id = "welcome"

[[module.dialogues.nodes]]
id = "hi"
lines = ["Welcome to the academy."]

[[module.dialogues]]
id = "mentor_talk"

[module.dialogues.entry]
default = "start"

[[module.dialogues.entry.branches]]
node = "ready_hello"
when = { kind = "task_active", task = "hello" }

[[module.dialogues.nodes]]
id = "start"
lines = ["Shall we begin?"]

[[module.dialogues.nodes.choices]]
key = "yes"
text = "Yes"
actions = [{ kind = "accept_task", task = "hello" }]

[[module.dialogues.nodes]]
id = "ready_hello"
task = "hello"
lines = ["Say it."]

[[module.dialogues.nodes.choices]]
key = "say"
text = "Say it"
actions = [{ kind = "submit_task", task = "hello" }]
"#;

    const BASICS: &str = r#"
[module]
id = "basics"
name = "Basics"
unlock = { kind = "module_complete", module_id = "intro" }

[[module.tasks]]
id = "loops"
name = "Loops"
"#;

    const VAULT: &str = r#"
[module]
id = "vault"
name = "Vault"

[module.unlock]
kind = "and"
requirements = [
    { kind = "task_complete", task = "hello", module = "intro" },
    { kind = "password", password = "open sesame", hint = "classic" },
]
"#;

    fn engine(temp: &TempDir) -> ProgressionEngine {
        let modules = temp.path().join("modules");
        fs::create_dir_all(&modules).unwrap();
        fs::write(modules.join("01_intro.toml"), INTRO).unwrap();
        fs::write(modules.join("02_basics.toml"), BASICS).unwrap();
        fs::write(modules.join("03_vault.toml"), VAULT).unwrap();

        let content = Arc::new(ContentLoader::load_directory(temp.path()).unwrap());
        let mut config = EngineConfig::default();
        config.progression.initial_unlock = crate::progression::InitialUnlockPolicy::FirstN { count: 1 };

        ProgressionEngine::new(
            config,
            content,
            Arc::new(InMemoryProgressStore::new()),
            Arc::new(BehaviorRegistry::new()),
            Arc::new(LogErrorHandler),
        )
    }

    #[tokio::test]
    async fn test_playthrough_from_toml() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);

        let events = engine.initialize().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(engine.module_state("intro"), ModuleProgressionState::Unlocked);
        assert_eq!(engine.module_state("basics"), ModuleProgressionState::Locked);

        let map = engine.worldmap();
        assert_eq!(map.layout, WorldmapLayout::Branching);
        assert!(map.node("vault").unwrap().requires_interaction);

        // greeting first
        let session = engine.open_dialogue("intro", "mentor").await.unwrap().unwrap();
        assert_eq!(session.current().unwrap().origin, NodeOrigin::Greeting);

        let mut session = engine.open_dialogue("intro", "mentor").await.unwrap().unwrap();
        assert_eq!(session.current().unwrap().node.id, "start");
        engine.choose(&mut session, "yes", None).await.unwrap();
        assert!(!session.is_open());
        assert!(!engine.is_object_unlocked("intro", "gate").await.unwrap());
        assert!(engine.object_node("intro", "gate").await.unwrap().is_none());

        let mut session = engine.open_dialogue("intro", "mentor").await.unwrap().unwrap();
        assert_eq!(session.current().unwrap().origin, NodeOrigin::RootMenu);
        engine.choose(&mut session, "task_hello", None).await.unwrap();
        engine.choose(&mut session, "say", Some("Hello")).await.unwrap();

        assert!(engine.is_object_unlocked("intro", "gate").await.unwrap());
        let gate = engine.object_node("intro", "gate").await.unwrap().unwrap();
        assert_eq!(gate.node.id, "hi");
        assert!(engine.object_node("intro", "ghost").await.unwrap_err().is_not_found());

        let log: Vec<(String, TaskStatus)> = engine
            .module_tasks("intro")
            .await
            .unwrap()
            .into_iter()
            .map(|t| (t.id, t.status))
            .collect();
        assert_eq!(
            log,
            vec![
                ("name".to_string(), TaskStatus::Available),
                ("hello".to_string(), TaskStatus::Completed),
            ]
        );
        let tasks = engine.npc_tasks("intro", "mentor").await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[1].status, TaskStatus::Available);
        assert_eq!(engine.next_task("intro").unwrap().as_deref(), Some("name"));

        engine.accept_task("intro", "name").await.unwrap();
        let events = engine.submit_task("intro", "name", "Ferris").await.unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["task_completed", "module_completed", "module_unlocked"]);
        assert_eq!(engine.module_state("basics"), ModuleProgressionState::Unlocked);
        assert_eq!(engine.module_state("vault"), ModuleProgressionState::Locked);
    }

    #[tokio::test]
    async fn test_password_unlock() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        engine.initialize().await.unwrap();
        engine.complete_task("intro", "hello").await.unwrap();

        let reasons = engine.module_lock_reasons("vault").await.unwrap();
        let satisfied: Vec<bool> = reasons.iter().map(|r| r.satisfied).collect();
        assert_eq!(satisfied, vec![true, false]);
        assert_eq!(reasons[1].detail.hint.as_deref(), Some("classic"));

        assert!(engine.unlock_with_password("vault", "wrong").await.unwrap().is_empty());
        let events = engine.unlock_with_password("vault", "open sesame").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(engine.module_state("vault"), ModuleProgressionState::Unlocked);
        assert!(engine.unlock_with_password("vault", "open sesame").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_with_content_keeps_progress() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        engine.initialize().await.unwrap();

        let reloaded = Arc::new(ContentLoader::load_directory(temp.path()).unwrap());
        let engine = engine.with_content(reloaded);
        assert_eq!(engine.module_state("intro"), ModuleProgressionState::Unlocked);
        assert!(engine.current_node("intro", "ghost").await.unwrap_err().is_not_found());
    }
}
