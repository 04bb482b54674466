//! Dialogue
//!
//! Authored dialogue trees, the resolver that picks what an NPC shows, the
//! actions choices run, and per-conversation sessions.

pub mod action;
pub mod definition;
pub mod resolver;
pub mod session;

pub use action::{ActionContext, ActionSpec, DialogueAction};
pub use definition::{
    DialogueChoice, DialogueEdge, DialogueNode, DialogueTree, EntryBranch, EntryCondition,
    EntryResolver, RawDialogueTree,
};
pub use resolver::{
    task_choice_label, DialogueResolver, NodeOrigin, ResolvedNode, MAX_CHOICE_LABEL_CHARS,
    ROOT_NODE_ID,
};
pub use session::{DialogueRunner, DialogueSession};
