//! Player Progress
//!
//! Module progress snapshots, the progression state machine records, and
//! the store abstraction they live behind.

pub mod state;
pub mod store;

pub use state::{ModuleProgress, ModuleProgressionRecord, ModuleProgressionState, ProgressUpdate};
pub use store::{InMemoryProgressStore, ProgressSnapshot, ProgressStore};
