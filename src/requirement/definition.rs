//! Unlock Requirement Definitions
//!
//! Requirements are authored as content (TOML inline tables tagged by
//! `kind`) and nest arbitrarily through `and` / `or`.

use serde::{Deserialize, Serialize};

/// A boolean expression gating a task, npc, object or module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnlockRequirement {
    /// Always satisfied
    Always,
    /// Never satisfied
    Never,
    /// Satisfied only by matching interactive input
    Password {
        password: String,
        #[serde(default)]
        hint: Option<String>,
    },
    /// A task must be completed; `module` pins the owning module when known
    TaskComplete {
        task: String,
        #[serde(default)]
        module: Option<String>,
    },
    ModuleComplete { module_id: String },
    /// A custom state field must equal `value`
    StateCheck {
        key: String,
        value: serde_json::Value,
    },
    /// A registered custom check, referenced by id
    Custom { check: String },
    And { requirements: Vec<UnlockRequirement> },
    Or { requirements: Vec<UnlockRequirement> },
}

impl UnlockRequirement {
    pub fn password(password: &str, hint: Option<&str>) -> Self {
        UnlockRequirement::Password {
            password: password.to_string(),
            hint: hint.map(str::to_string),
        }
    }

    pub fn task_complete(task: &str) -> Self {
        UnlockRequirement::TaskComplete {
            task: task.to_string(),
            module: None,
        }
    }

    pub fn task_complete_in(module_id: &str, task: &str) -> Self {
        UnlockRequirement::TaskComplete {
            task: task.to_string(),
            module: Some(module_id.to_string()),
        }
    }

    pub fn module_complete(module_id: &str) -> Self {
        UnlockRequirement::ModuleComplete {
            module_id: module_id.to_string(),
        }
    }

    pub fn state_check(key: &str, value: serde_json::Value) -> Self {
        UnlockRequirement::StateCheck {
            key: key.to_string(),
            value,
        }
    }

    pub fn custom(check: &str) -> Self {
        UnlockRequirement::Custom {
            check: check.to_string(),
        }
    }

    pub fn and(requirements: Vec<UnlockRequirement>) -> Self {
        UnlockRequirement::And { requirements }
    }

    pub fn or(requirements: Vec<UnlockRequirement>) -> Self {
        UnlockRequirement::Or { requirements }
    }

    pub fn kind(&self) -> RequirementKind {
        match self {
            UnlockRequirement::Always => RequirementKind::Always,
            UnlockRequirement::Never => RequirementKind::Never,
            UnlockRequirement::Password { .. } => RequirementKind::Password,
            UnlockRequirement::TaskComplete { .. } => RequirementKind::TaskComplete,
            UnlockRequirement::ModuleComplete { .. } => RequirementKind::ModuleComplete,
            UnlockRequirement::StateCheck { .. } => RequirementKind::StateCheck,
            UnlockRequirement::Custom { .. } => RequirementKind::Custom,
            UnlockRequirement::And { .. } => RequirementKind::And,
            UnlockRequirement::Or { .. } => RequirementKind::Or,
        }
    }

    /// True for `and` / `or`
    pub fn is_combinator(&self) -> bool {
        matches!(
            self,
            UnlockRequirement::And { .. } | UnlockRequirement::Or { .. }
        )
    }
}

/// Discriminant of an `UnlockRequirement`, used in display lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    Always,
    Never,
    Password,
    TaskComplete,
    ModuleComplete,
    StateCheck,
    Custom,
    And,
    Or,
}

impl RequirementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementKind::Always => "always",
            RequirementKind::Never => "never",
            RequirementKind::Password => "password",
            RequirementKind::TaskComplete => "task_complete",
            RequirementKind::ModuleComplete => "module_complete",
            RequirementKind::StateCheck => "state_check",
            RequirementKind::Custom => "custom",
            RequirementKind::And => "and",
            RequirementKind::Or => "or",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Holder {
        unlock: UnlockRequirement,
    }

    #[test]
    fn test_nested_requirement_from_toml() {
        let holder: Holder = toml::from_str(
            r#"
[unlock]
kind = "or"

[[unlock.requirements]]
kind = "module_complete"
module_id = "basics"

[[unlock.requirements]]
kind = "and"
requirements = [
    { kind = "task_complete", task = "loops" },
    { kind = "state_check", key = "door", value = "open" },
    { kind = "password", password = "swordfish", hint = "a fish" },
]
"#,
        )
        .unwrap();

        let expected = UnlockRequirement::or(vec![
            UnlockRequirement::module_complete("basics"),
            UnlockRequirement::and(vec![
                UnlockRequirement::task_complete("loops"),
                UnlockRequirement::state_check("door", json!("open")),
                UnlockRequirement::password("swordfish", Some("a fish")),
            ]),
        ]);
        assert_eq!(holder.unlock, expected);
        assert_eq!(holder.unlock.kind(), RequirementKind::Or);
        assert!(holder.unlock.is_combinator());
    }

    #[test]
    fn test_unit_variants_from_toml() {
        let holder: Holder = toml::from_str("unlock = { kind = \"always\" }").unwrap();
        assert_eq!(holder.unlock, UnlockRequirement::Always);
    }
}
