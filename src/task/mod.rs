//! Tasks
//!
//! Status classification, submission validation and the accept / submit /
//! complete lifecycle.

pub mod availability;
pub mod lifecycle;
pub mod validation;

pub use availability::{TaskAvailabilityService, TaskClassification, TaskContext, TaskStatus};
pub use lifecycle::TaskLifecycle;
pub use validation::{validate_builtin, TaskValidator, ValidationOutcome, ValidatorSpec};
