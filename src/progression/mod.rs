//! Module Progression
//!
//! Locked / unlocked / completed tracking for whole modules.

pub mod service;

pub use service::{CompletionCheck, InitialUnlockPolicy, ModuleProgressionService};
