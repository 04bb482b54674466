//! Worldmap Generator
//!
//! Builds the level-select graph: one node per module, one connection per
//! dependency between modules on the same map. Roots sit in the left
//! column; dependents move right by their longest dependency chain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::WorldmapConfig;
use crate::content::{ModuleDefinition, ModuleRegistry, TaskOwnership};
use crate::progress::ModuleProgressionState;
use crate::progression::ModuleProgressionService;
use crate::requirement::{
    extract_module_dependencies, extract_requirement_details, requires_interaction,
    RequirementDetail,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldmapLayout {
    /// No module on the map depends on another
    Linear,
    Branching,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorldmapPosition {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldmapNode {
    pub id: String,
    pub name: String,
    pub summary: String,
    pub icon: Option<String>,
    pub position: WorldmapPosition,
    /// Length of the longest dependency chain leading here
    pub depth: usize,
    pub state: ModuleProgressionState,
    /// The unlock requirement needs a password prompt
    pub requires_interaction: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldmapConnection {
    /// The dependency
    pub from: String,
    /// The dependent module
    pub to: String,
    pub from_state: ModuleProgressionState,
    pub to_state: ModuleProgressionState,
    /// Flattened unlock requirement of `to`, for tooltips
    pub requirements: Vec<RequirementDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Worldmap {
    pub layout: WorldmapLayout,
    pub nodes: Vec<WorldmapNode>,
    pub connections: Vec<WorldmapConnection>,
}

impl Worldmap {
    pub fn empty() -> Self {
        Self {
            layout: WorldmapLayout::Linear,
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn node(&self, module_id: &str) -> Option<&WorldmapNode> {
        self.nodes.iter().find(|n| n.id == module_id)
    }
}

pub struct WorldmapGenerator {
    registry: Arc<dyn ModuleRegistry>,
    ownership: Arc<dyn TaskOwnership>,
    progression: Arc<ModuleProgressionService>,
    config: WorldmapConfig,
}

impl WorldmapGenerator {
    pub fn new(
        registry: Arc<dyn ModuleRegistry>,
        ownership: Arc<dyn TaskOwnership>,
        progression: Arc<ModuleProgressionService>,
        config: WorldmapConfig,
    ) -> Self {
        Self {
            registry,
            ownership,
            progression,
            config,
        }
    }

    /// Map of every registered module
    pub fn generate_all(&self) -> Worldmap {
        self.generate(&self.registry.registered_module_ids())
    }

    pub fn generate(&self, module_ids: &[String]) -> Worldmap {
        if module_ids.is_empty() {
            return Worldmap::empty();
        }

        let mut seen = HashSet::new();
        let mut modules: Vec<Arc<ModuleDefinition>> = Vec::new();
        for module_id in module_ids {
            if !seen.insert(module_id.as_str()) {
                continue;
            }
            match self.registry.get_module(module_id) {
                Some(module) => modules.push(module),
                None => warn!("Worldmap skipping unknown module '{}'", module_id),
            }
        }

        let on_map: HashSet<&str> = modules.iter().map(|m| m.id.as_str()).collect();
        let dependencies: HashMap<String, Vec<String>> = modules
            .iter()
            .map(|module| {
                let deps = module
                    .unlock
                    .as_ref()
                    .map(|unlock| extract_module_dependencies(unlock, self.ownership.as_ref()))
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|dep| dep != &module.id && on_map.contains(dep.as_str()))
                    .collect();
                (module.id.clone(), deps)
            })
            .collect();

        let layout = if dependencies.values().all(Vec::is_empty) {
            WorldmapLayout::Linear
        } else {
            WorldmapLayout::Branching
        };

        let mut depths = HashMap::new();
        for module in &modules {
            dependency_depth(&module.id, &dependencies, &mut depths, &mut HashSet::new());
        }

        let mut rows_per_column: HashMap<usize, usize> = HashMap::new();
        let mut nodes = Vec::with_capacity(modules.len());
        for module in &modules {
            let depth = depths.get(&module.id).copied().unwrap_or_default();
            let row = rows_per_column.entry(depth).or_default();
            let position = WorldmapPosition {
                x: self.config.origin_x + depth as f32 * self.config.column_spacing,
                y: self.config.origin_y + *row as f32 * self.config.row_spacing,
            };
            *row += 1;

            nodes.push(WorldmapNode {
                id: module.id.clone(),
                name: module.name.clone(),
                summary: module.summary.clone(),
                icon: module.icon.clone(),
                position,
                depth,
                state: self.progression.state(&module.id),
                requires_interaction: module.unlock.as_ref().is_some_and(requires_interaction),
            });
        }

        let mut connections = Vec::new();
        for module in &modules {
            let Some(deps) = dependencies.get(&module.id) else {
                continue;
            };
            if deps.is_empty() {
                continue;
            }
            let requirements = module
                .unlock
                .as_ref()
                .map(extract_requirement_details)
                .unwrap_or_default();
            let to_state = self.progression.state(&module.id);

            for dep in deps {
                connections.push(WorldmapConnection {
                    from: dep.clone(),
                    to: module.id.clone(),
                    from_state: self.progression.state(dep),
                    to_state,
                    requirements: requirements.clone(),
                });
            }
        }

        debug!(
            "Generated {:?} worldmap with {} nodes and {} connections",
            layout,
            nodes.len(),
            connections.len()
        );

        Worldmap {
            layout,
            nodes,
            connections,
        }
    }
}

/// Longest dependency chain below `module_id`, memoized
///
/// A module met again while its own depth is being computed is a cycle;
/// the back edge counts as a root so generation still terminates.
fn dependency_depth(
    module_id: &str,
    dependencies: &HashMap<String, Vec<String>>,
    depths: &mut HashMap<String, usize>,
    visiting: &mut HashSet<String>,
) -> usize {
    if let Some(depth) = depths.get(module_id) {
        return *depth;
    }
    if !visiting.insert(module_id.to_string()) {
        warn!("Dependency cycle through module '{}'", module_id);
        return 0;
    }

    let depth = dependencies
        .get(module_id)
        .map(|deps| {
            deps.iter()
                .map(|dep| dependency_depth(dep, dependencies, depths, visiting) + 1)
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);

    visiting.remove(module_id);
    depths.insert(module_id.to_string(), depth);
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorRegistry;
    use crate::content::{ContentRegistry, Task};
    use crate::error::LogErrorHandler;
    use crate::progress::InMemoryProgressStore;
    use crate::requirement::{RequirementEvaluator, RequirementKind, UnlockRequirement};
    use std::time::Duration;

    fn generator(registry: ContentRegistry) -> (Arc<ModuleProgressionService>, WorldmapGenerator) {
        let registry = Arc::new(registry);
        let store = Arc::new(InMemoryProgressStore::new());
        let evaluator = Arc::new(RequirementEvaluator::new(
            store.clone(),
            registry.clone(),
            Arc::new(BehaviorRegistry::new()),
            Arc::new(LogErrorHandler),
            Duration::from_millis(100),
        ));
        let progression = Arc::new(ModuleProgressionService::new(
            registry.clone(),
            store,
            evaluator,
        ));
        let generator = WorldmapGenerator::new(
            registry.clone(),
            registry,
            progression.clone(),
            WorldmapConfig::default(),
        );
        (progression, generator)
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_input_is_linear_and_empty() {
        let (_progression, generator) = generator(ContentRegistry::new());
        assert_eq!(generator.generate(&[]), Worldmap::empty());
    }

    #[test]
    fn test_single_dependency() {
        let registry = ContentRegistry::new()
            .with_module(ModuleDefinition::new("A", "Alpha"))
            .with_module(
                ModuleDefinition::new("B", "Beta")
                    .with_unlock(UnlockRequirement::module_complete("A")),
            );
        let (progression, generator) = generator(registry);
        progression.unlock("A").unwrap();

        let map = generator.generate(&ids(&["A", "B"]));
        assert_eq!(map.layout, WorldmapLayout::Branching);
        assert_eq!(map.connections.len(), 1);

        let connection = &map.connections[0];
        assert_eq!((connection.from.as_str(), connection.to.as_str()), ("A", "B"));
        assert_eq!(connection.from_state, ModuleProgressionState::Unlocked);
        assert_eq!(connection.to_state, ModuleProgressionState::Locked);
        assert_eq!(connection.requirements[0].kind, RequirementKind::ModuleComplete);

        let a = map.node("A").unwrap();
        let b = map.node("B").unwrap();
        assert!(a.position.x < b.position.x);
        assert_eq!((a.depth, b.depth), (0, 1));
    }

    #[test]
    fn test_no_dependencies_is_linear_in_one_column() {
        let registry = ContentRegistry::new()
            .with_module(ModuleDefinition::new("A", "Alpha"))
            .with_module(
                ModuleDefinition::new("B", "Beta").with_unlock(UnlockRequirement::password("pw", None)),
            );
        let (_progression, generator) = generator(registry);

        let map = generator.generate(&ids(&["A", "B", "ghost"]));
        assert_eq!(map.layout, WorldmapLayout::Linear);
        assert_eq!(map.nodes.len(), 2);
        assert!(map.connections.is_empty());
        assert_eq!(map.nodes[0].position.x, map.nodes[1].position.x);
        assert!(map.nodes[0].position.y < map.nodes[1].position.y);
        assert!(map.node("B").unwrap().requires_interaction);
    }

    #[test]
    fn test_foreign_dependencies_are_filtered() {
        let registry = ContentRegistry::new()
            .with_module(ModuleDefinition::new("A", "Alpha").with_task(Task::new("a1", "A1")))
            .with_module(ModuleDefinition::new("X", "Elsewhere"))
            .with_module(
                ModuleDefinition::new("B", "Beta").with_unlock(UnlockRequirement::and(vec![
                    UnlockRequirement::module_complete("X"),
                    UnlockRequirement::task_complete("a1"),
                ])),
            );
        let (_progression, generator) = generator(registry);

        let map = generator.generate(&ids(&["A", "B"]));
        assert_eq!(map.connections.len(), 1);
        assert_eq!(map.connections[0].from, "A");
        assert_eq!(map.connections[0].requirements.len(), 2);
    }

    #[test]
    fn test_depth_uses_longest_chain() {
        // A -> B -> C, and A -> C directly
        let registry = ContentRegistry::new()
            .with_module(ModuleDefinition::new("A", "Alpha"))
            .with_module(
                ModuleDefinition::new("B", "Beta")
                    .with_unlock(UnlockRequirement::module_complete("A")),
            )
            .with_module(ModuleDefinition::new("C", "Gamma").with_unlock(UnlockRequirement::or(
                vec![
                    UnlockRequirement::module_complete("A"),
                    UnlockRequirement::module_complete("B"),
                ],
            )))
            .with_module(ModuleDefinition::new("D", "Delta"));
        let (_progression, generator) = generator(registry);

        let map = generator.generate_all();
        assert_eq!(map.node("C").unwrap().depth, 2);
        assert_eq!(map.connections.len(), 3);
        assert_eq!(map.node("D").unwrap().depth, 0);
        assert!(map.node("B").unwrap().position.x < map.node("C").unwrap().position.x);
    }

    #[test]
    fn test_cycles_terminate() {
        let registry = ContentRegistry::new()
            .with_module(
                ModuleDefinition::new("A", "Alpha")
                    .with_unlock(UnlockRequirement::module_complete("B")),
            )
            .with_module(
                ModuleDefinition::new("B", "Beta")
                    .with_unlock(UnlockRequirement::module_complete("A")),
            );
        let (_progression, generator) = generator(registry);

        let map = generator.generate_all();
        assert_eq!(map.layout, WorldmapLayout::Branching);
        assert_eq!(map.nodes.len(), 2);
        assert_eq!(map.connections.len(), 2);
    }
}
