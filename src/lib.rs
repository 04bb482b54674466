//! Module Progression
//!
//! Progression engine for module-based learning content: unlock
//! requirements, task availability and lifecycle, dialogue resolution,
//! module progression and worldmap generation.

pub mod behavior;
pub mod config;
pub mod content;
pub mod dialogue;
pub mod engine;
pub mod error;
pub mod events;
pub mod progress;
pub mod progression;
pub mod requirement;
pub mod task;
pub mod worldmap;

pub use behavior::BehaviorRegistry;
pub use config::EngineConfig;
pub use content::{ContentLoader, ContentRegistry, ContentWatcher, HotReloadEvent, ModuleDefinition};
pub use engine::{ProgressionEngine, TaskView};
pub use error::{ErrorHandler, LogErrorHandler, ProgressionError, Result};
pub use events::ProgressionEvent;
pub use progress::{InMemoryProgressStore, ModuleProgressionState, ProgressStore};
pub use requirement::UnlockRequirement;
pub use worldmap::Worldmap;
