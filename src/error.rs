//! Error Types
//!
//! A single error enum covers registry lookups, malformed content and
//! failing custom checks. Expected absence (an NPC without dialogue, a task
//! that is simply locked) is never an error; resolution functions return
//! `None` or an empty result instead.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// What kind of content a `NotFound` error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Module,
    Task,
    Npc,
    Object,
    Dialogue,
    DialogueNode,
    Choice,
    Check,
    Action,
    Validator,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Task => "task",
            EntityKind::Npc => "npc",
            EntityKind::Object => "object",
            EntityKind::Dialogue => "dialogue",
            EntityKind::DialogueNode => "dialogue node",
            EntityKind::Choice => "choice",
            EntityKind::Check => "custom check",
            EntityKind::Action => "dialogue action",
            EntityKind::Validator => "task validator",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProgressionError {
    /// A referenced module, task, npc, dialogue or node is absent
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    /// Content that can never be resolved (e.g. conditional entry without a default)
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// A custom check failed, timed out, or is not registered
    #[error("custom check '{check}' failed: {reason}")]
    EvaluationFailure { check: String, reason: String },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProgressionError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        ProgressionError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ProgressionError::InvalidStructure(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProgressionError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProgressionError>;

/// Receives errors that evaluation swallows into a `false` result
///
/// Requirement evaluation always yields a boolean; failures of custom checks
/// are handed to this handler so the caller can decide how to surface them.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, error: &ProgressionError);
}

/// Default handler: forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, error: &ProgressionError) {
        warn!("Progression error: {}", error);
    }
}
