//! Dialogue Sessions
//!
//! A session is one conversation with one NPC: the node on screen, the line
//! being shown, and the events produced so far. The runner executes choices
//! against it.

use std::sync::Arc;

use tracing::debug;

use super::action::ActionContext;
use super::resolver::{DialogueResolver, NodeOrigin, ResolvedNode, ROOT_NODE_ID};
use crate::behavior::BehaviorRegistry;
use crate::error::{EntityKind, ProgressionError, Result};
use crate::events::ProgressionEvent;
use crate::progress::ProgressStore;
use crate::task::TaskLifecycle;

#[derive(Debug, Clone)]
pub struct DialogueSession {
    pub module_id: String,
    pub npc_id: String,
    current: Option<ResolvedNode>,
    line_index: usize,
    events: Vec<ProgressionEvent>,
}

impl DialogueSession {
    fn new(module_id: &str, npc_id: &str) -> Self {
        Self {
            module_id: module_id.to_string(),
            npc_id: npc_id.to_string(),
            current: None,
            line_index: 0,
            events: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&ResolvedNode> {
        self.current.as_ref()
    }

    pub fn line_index(&self) -> usize {
        self.line_index
    }

    pub fn current_line(&self) -> Option<&str> {
        self.current
            .as_ref()
            .and_then(|n| n.node.lines.get(self.line_index))
            .map(String::as_str)
    }

    /// Move to the next line; false when already on the last one
    pub fn advance_line(&mut self) -> bool {
        let Some(ref node) = self.current else {
            return false;
        };
        if self.line_index + 1 < node.node.lines.len() {
            self.line_index += 1;
            true
        } else {
            false
        }
    }

    /// True once every line has been shown and choices should be offered
    pub fn on_last_line(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|n| self.line_index + 1 >= n.node.lines.len())
    }

    /// Drain events produced since the last call
    pub fn take_events(&mut self) -> Vec<ProgressionEvent> {
        std::mem::take(&mut self.events)
    }

    fn show(&mut self, node: ResolvedNode) {
        self.current = Some(node);
        self.line_index = 0;
    }

    fn close(&mut self) {
        self.current = None;
        self.line_index = 0;
    }
}

pub struct DialogueRunner {
    resolver: Arc<DialogueResolver>,
    lifecycle: Arc<TaskLifecycle>,
    store: Arc<dyn ProgressStore>,
    behaviors: Arc<BehaviorRegistry>,
}

impl DialogueRunner {
    pub fn new(
        resolver: Arc<DialogueResolver>,
        lifecycle: Arc<TaskLifecycle>,
        store: Arc<dyn ProgressStore>,
        behaviors: Arc<BehaviorRegistry>,
    ) -> Self {
        Self {
            resolver,
            lifecycle,
            store,
            behaviors,
        }
    }

    /// Start a conversation; `None` if the NPC has nothing to show
    ///
    /// Opening on a greeting marks that greeting as seen.
    pub async fn open(&self, module_id: &str, npc_id: &str) -> Result<Option<DialogueSession>> {
        let Some(node) = self.resolver.resolve_for(module_id, npc_id).await? else {
            return Ok(None);
        };

        let mut session = DialogueSession::new(module_id, npc_id);
        self.enter(&mut session, node);
        Ok(Some(session))
    }

    /// Re-resolve the NPC from scratch, e.g. after progress changed elsewhere
    pub async fn refresh(&self, session: &mut DialogueSession) -> Result<()> {
        match self
            .resolver
            .resolve_for(&session.module_id, &session.npc_id)
            .await?
        {
            Some(node) => self.enter(session, node),
            None => session.close(),
        }
        Ok(())
    }

    /// Take a choice on the current node
    ///
    /// Actions run in order and each is awaited before the next; then the
    /// session follows the choice's edge. A choice without an edge leaves
    /// the session where it is. An edge to the root id re-resolves the NPC.
    pub async fn choose(
        &self,
        session: &mut DialogueSession,
        choice_key: &str,
        input: Option<&str>,
    ) -> Result<()> {
        let current = session
            .current
            .clone()
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Choice, choice_key))?;
        let choice = current
            .node
            .choice(choice_key)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Choice, choice_key))?;

        let ctx = ActionContext {
            module_id: &session.module_id,
            npc_id: &session.npc_id,
            store: self.store.as_ref(),
            lifecycle: self.lifecycle.as_ref(),
            input,
        };
        // Unknown actions fail the choice before anything is mutated
        let actions = choice
            .actions
            .iter()
            .map(|spec| spec.resolve(&self.behaviors))
            .collect::<Result<Vec<_>>>()?;

        for action in actions {
            let events = action.execute(&ctx).await?;
            for event in &events {
                debug!("Dialogue choice '{}' produced {}", choice_key, event.event_type());
            }
            session.events.extend(events);
        }

        let Some(edge) = current.edge(choice_key) else {
            debug!("Choice '{}' on '{}' has no target", choice_key, current.node.id);
            return Ok(());
        };

        match edge.next.as_deref() {
            None => session.close(),
            Some(ROOT_NODE_ID) => self.refresh(session).await?,
            Some(next) => {
                let tree_id = current
                    .tree_id
                    .as_deref()
                    .ok_or_else(|| ProgressionError::not_found(EntityKind::DialogueNode, next))?;
                let node = self
                    .resolver
                    .resolve_node(&session.module_id, tree_id, next)?;
                session.show(node);
            }
        }
        Ok(())
    }

    fn enter(&self, session: &mut DialogueSession, node: ResolvedNode) {
        if node.origin == NodeOrigin::Greeting {
            if let Some(ref dialogue_id) = node.tree_id {
                if !self.store.has_seen_greeting(&session.module_id, dialogue_id) {
                    self.store.mark_greeting_seen(&session.module_id, dialogue_id);
                    session.events.push(ProgressionEvent::GreetingSeen {
                        module_id: session.module_id.clone(),
                        dialogue_id: dialogue_id.clone(),
                    });
                }
            }
        }
        session.show(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DialogueConfig;
    use crate::content::{ContentRegistry, ModuleDefinition, NpcDefinition, Task};
    use crate::dialogue::action::{ActionSpec, DialogueAction};
    use crate::dialogue::definition::{DialogueChoice, DialogueNode, DialogueTree};
    use crate::error::{ErrorHandler, LogErrorHandler};
    use crate::progression::ModuleProgressionService;
    use crate::requirement::{RequirementEvaluator, UnlockRequirement};
    use crate::task::{TaskAvailabilityService, ValidatorSpec};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountVisits(Arc<AtomicUsize>);

    #[async_trait]
    impl DialogueAction for CountVisits {
        async fn execute(&self, ctx: &ActionContext<'_>) -> Result<Vec<ProgressionEvent>> {
            let visits = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.store.set_state_field(ctx.module_id, "visits", json!(visits));
            Ok(Vec::new())
        }
    }

    fn module() -> ModuleDefinition {
        let talk = DialogueTree::new("mentor_talk")
            .with_node(
                DialogueNode::new("intro", &["Hello.", "I have work for you."])
                    .with_choice(
                        DialogueChoice::new("accept", "Sure", Some("accepted"))
                            .with_action(ActionSpec::AcceptTask {
                                task: "t1".to_string(),
                            })
                            .with_action(ActionSpec::Custom {
                                id: "count".to_string(),
                            }),
                    )
                    .with_choice(DialogueChoice::new("later", "Later", None))
                    .with_choice(
                        DialogueChoice::new("rush", "Skip ahead", Some("accepted"))
                            .with_action(ActionSpec::AcceptTask {
                                task: "t1".to_string(),
                            })
                            .with_action(ActionSpec::Custom {
                                id: "unregistered".to_string(),
                            }),
                    )
                    .with_choice(
                        DialogueChoice::new("cheat", "Just finish it", Some("accepted"))
                            .with_action(ActionSpec::AcceptTask {
                                task: "t1".to_string(),
                            })
                            .with_action(ActionSpec::CompleteTask {
                                task: "ghost".to_string(),
                            }),
                    ),
            )
            .with_node(
                DialogueNode::new("accepted", &["Come back when done."])
                    .with_choice(DialogueChoice::new("menu", "Back", Some(ROOT_NODE_ID))),
            )
            .with_node(
                DialogueNode::new("submit_t1", &["Show me."])
                    .for_task("t1")
                    .with_choice(
                        DialogueChoice::new("submit", "Here it is", None).with_action(
                            ActionSpec::SubmitTask {
                                task: "t1".to_string(),
                            },
                        ),
                    ),
            );

        ModuleDefinition::new("m", "M")
            .with_greeting("welcome")
            .with_task(Task::new("t1", "First").with_validator(ValidatorSpec::Exact {
                expected: "done".to_string(),
                ignore_case: false,
            }))
            .with_task(Task::new("t2", "Second").with_unlock(UnlockRequirement::task_complete("t1")))
            .with_npc(
                NpcDefinition::new("mentor", "Mentor")
                    .with_tasks(&["t1", "t2"])
                    .with_dialogue("mentor_talk"),
            )
            .with_dialogue(talk)
            .with_dialogue(
                DialogueTree::new("welcome").with_node(DialogueNode::new("hi", &["Welcome!"])),
            )
    }

    fn runner() -> (Arc<dyn ProgressStore>, Arc<AtomicUsize>, DialogueRunner) {
        let registry = Arc::new(ContentRegistry::new().with_module(module()));
        let store: Arc<dyn ProgressStore> = Arc::new(crate::progress::InMemoryProgressStore::new());
        let visits = Arc::new(AtomicUsize::new(0));
        let mut behaviors = BehaviorRegistry::new();
        behaviors.register_action("count", CountVisits(visits.clone()));
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
        let lifecycle = Arc::new(TaskLifecycle::new(
            registry.clone(),
            store.clone(),
            availability.clone(),
            progression,
            behaviors.clone(),
            errors,
        ));
        let resolver = Arc::new(DialogueResolver::new(
            registry,
            store.clone(),
            availability,
            DialogueConfig::default(),
        ));
        let runner = DialogueRunner::new(resolver, lifecycle, store.clone(), behaviors);
        (store, visits, runner)
    }

    #[tokio::test]
    async fn test_greeting_is_shown_once() {
        let (store, _visits, runner) = runner();

        let mut session = runner.open("m", "mentor").await.unwrap().unwrap();
        assert_eq!(session.current().unwrap().origin, NodeOrigin::Greeting);
        assert!(store.has_seen_greeting("m", "welcome"));
        assert_eq!(session.take_events().len(), 1);
        assert!(session.take_events().is_empty());

        let session = runner.open("m", "mentor").await.unwrap().unwrap();
        assert_eq!(session.current().unwrap().origin, NodeOrigin::Authored);
        assert_eq!(session.current().unwrap().node.id, "intro");
    }

    #[tokio::test]
    async fn test_lines_advance_within_node() {
        let (store, _visits, runner) = runner();
        store.mark_greeting_seen("m", "welcome");

        let mut session = runner.open("m", "mentor").await.unwrap().unwrap();
        assert_eq!(session.current_line(), Some("Hello."));
        assert!(!session.on_last_line());
        assert!(session.advance_line());
        assert_eq!(session.current_line(), Some("I have work for you."));
        assert!(!session.advance_line());
        assert!(session.on_last_line());
        assert_eq!(session.line_index(), 1);
    }

    #[tokio::test]
    async fn test_full_task_conversation() {
        let (store, visits, runner) = runner();
        store.mark_greeting_seen("m", "welcome");

        let mut session = runner.open("m", "mentor").await.unwrap().unwrap();
        runner.choose(&mut session, "accept", None).await.unwrap();
        assert_eq!(store.current_task_id("m").as_deref(), Some("t1"));
        assert_eq!(visits.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_state_field("m", "visits"), Some(json!(1)));
        assert_eq!(session.current().unwrap().node.id, "accepted");

        // back to the menu re-resolves with the newly active task
        runner.choose(&mut session, "menu", None).await.unwrap();
        let root = session.current().unwrap();
        assert_eq!(root.origin, NodeOrigin::RootMenu);
        assert_eq!(root.choice_keys(), vec!["talk", "task_t1", "goodbye"]);

        runner.choose(&mut session, "task_t1", None).await.unwrap();
        assert_eq!(session.current().unwrap().node.id, "submit_t1");

        runner.choose(&mut session, "submit", Some("nope")).await.unwrap();
        assert!(!session.is_open());
        assert!(!store.is_task_completed("m", "t1"));

        let mut session = runner.open("m", "mentor").await.unwrap().unwrap();
        runner.choose(&mut session, "task_t1", None).await.unwrap();
        runner.choose(&mut session, "submit", Some("done")).await.unwrap();
        assert!(store.is_task_completed("m", "t1"));
        let events = session.take_events();
        let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["task_completed"]);
    }

    #[tokio::test]
    async fn test_goodbye_closes_and_unknown_choice_is_not_found() {
        let (store, _visits, runner) = runner();
        store.mark_greeting_seen("m", "welcome");
        store.update_progress(
            "m",
            crate::progress::ProgressUpdate::new().set_current_task(Some("t1")),
        );

        let mut session = runner.open("m", "mentor").await.unwrap().unwrap();
        let err = runner.choose(&mut session, "dance", None).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(session.is_open());

        runner.choose(&mut session, "goodbye", None).await.unwrap();
        assert!(!session.is_open());
        assert!(runner.choose(&mut session, "goodbye", None).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_action_fails_before_any_mutation() {
        let (store, _visits, runner) = runner();
        store.mark_greeting_seen("m", "welcome");

        let mut session = runner.open("m", "mentor").await.unwrap().unwrap();
        let err = runner.choose(&mut session, "rush", None).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.current_task_id("m"), None);
        assert!(session.take_events().is_empty());
        assert_eq!(session.current().unwrap().node.id, "intro");
    }

    #[tokio::test]
    async fn test_failed_action_keeps_earlier_events() {
        let (store, _visits, runner) = runner();
        store.mark_greeting_seen("m", "welcome");

        let mut session = runner.open("m", "mentor").await.unwrap().unwrap();
        let err = runner.choose(&mut session, "cheat", None).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.current_task_id("m").as_deref(), Some("t1"));

        let events = session.take_events();
        let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["task_accepted"]);
    }
}
