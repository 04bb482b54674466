//! Task Submission Validation
//!
//! Authored validators cover exact answers and keyword lists; anything
//! richer is a `TaskValidator` registered by id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::content::{SubmissionKind, Task};

/// How a task's submission is judged, as authored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorSpec {
    /// Submission must equal `expected` after trimming
    Exact {
        expected: String,
        #[serde(default)]
        ignore_case: bool,
    },
    /// Submission must contain every keyword
    Keywords {
        keywords: Vec<String>,
        #[serde(default = "default_true")]
        ignore_case: bool,
    },
    /// A registered `TaskValidator`
    Custom { id: String },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub feedback: Option<String>,
}

impl ValidationOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            feedback: None,
        }
    }

    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            passed: false,
            feedback: Some(feedback.into()),
        }
    }
}

/// A content-defined submission check, registered by id
///
/// May await I/O (an external grader). `Err` means the validator itself
/// failed, not that the submission was wrong.
#[async_trait]
pub trait TaskValidator: Send + Sync {
    async fn validate(&self, task: &Task, submission: &str) -> Result<ValidationOutcome, String>;
}

/// Judge a submission against an authored (non-custom) validator
///
/// Returns `None` for `Custom`, which needs the behavior registry.
pub fn validate_builtin(task: &Task, submission: &str) -> Option<ValidationOutcome> {
    let trimmed = submission.trim();

    match &task.validator {
        None => Some(match task.submission.kind {
            SubmissionKind::Confirmation => ValidationOutcome::pass(),
            SubmissionKind::Text | SubmissionKind::Code if trimmed.is_empty() => {
                ValidationOutcome::fail("Submission is empty")
            }
            SubmissionKind::Text | SubmissionKind::Code => ValidationOutcome::pass(),
        }),
        Some(ValidatorSpec::Exact {
            expected,
            ignore_case,
        }) => {
            let matches = if *ignore_case {
                trimmed.to_lowercase() == expected.trim().to_lowercase()
            } else {
                trimmed == expected.trim()
            };
            Some(if matches {
                ValidationOutcome::pass()
            } else {
                ValidationOutcome::fail("That's not quite right")
            })
        }
        Some(ValidatorSpec::Keywords {
            keywords,
            ignore_case,
        }) => {
            let haystack = if *ignore_case {
                trimmed.to_lowercase()
            } else {
                trimmed.to_string()
            };
            let missing: Vec<&str> = keywords
                .iter()
                .filter(|k| {
                    let needle = if *ignore_case {
                        k.to_lowercase()
                    } else {
                        k.to_string()
                    };
                    !haystack.contains(&needle)
                })
                .map(String::as_str)
                .collect();

            Some(if missing.is_empty() {
                ValidationOutcome::pass()
            } else {
                ValidationOutcome::fail(format!("Missing: {}", missing.join(", ")))
            })
        }
        Some(ValidatorSpec::Custom { .. }) => None,
    }
}
