//! Module Content
//!
//! Authored module definitions (tasks, npcs, objects, dialogue trees),
//! their registry, and the TOML loader.

pub mod definition;
pub mod loader;
pub mod registry;

pub use definition::{
    InteractableObject, ModuleDefinition, NpcDefinition, RawModule, RawModuleFile, SubmissionKind,
    SubmissionSpec, Task,
};
pub use loader::{ContentLoader, ContentWatcher, HotReloadEvent};
pub use registry::{ContentRegistry, ModuleRegistry, TaskOwnership};
