//! Unlock Requirements
//!
//! The requirement expression tree, its asynchronous evaluator, and the
//! pure companions used for prompts, tooltips and the worldmap.

pub mod definition;
pub mod evaluator;
pub mod inspect;

pub use definition::{RequirementKind, UnlockRequirement};
pub use evaluator::{CheckContext, CustomCheck, EvaluatedDetail, RequirementContext, RequirementEvaluator};
pub use inspect::{
    extract_module_dependencies, extract_requirement_details, requires_interaction,
    RequirementDetail,
};
