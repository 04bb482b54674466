//! Engine Configuration
//!
//! Loaded from a TOML file; every field has a default so a partial (or
//! missing) file still produces a usable configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ProgressionError, Result};
use crate::progression::InitialUnlockPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub progression: ProgressionConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub worldmap: WorldmapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ProgressionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ProgressionError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Directory containing `modules/**.toml`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Reload content when files under `data_dir` change
    #[serde(default)]
    pub hot_reload: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            hot_reload: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressionConfig {
    #[serde(default)]
    pub initial_unlock: InitialUnlockPolicy,
}

fn default_custom_check_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Upper bound on a single custom check; a check that exceeds it evaluates to false
    #[serde(default = "default_custom_check_timeout_ms")]
    pub custom_check_timeout_ms: u64,
}

impl EvaluationConfig {
    pub fn custom_check_timeout(&self) -> Duration {
        Duration::from_millis(self.custom_check_timeout_ms)
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            custom_check_timeout_ms: default_custom_check_timeout_ms(),
        }
    }
}

fn default_root_greeting() -> Vec<String> {
    vec!["Hello! What can I do for you?".to_string()]
}

fn default_talk_label() -> String {
    "Talk".to_string()
}

fn default_goodbye_label() -> String {
    "Goodbye".to_string()
}

/// Text used for the generated root menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueConfig {
    #[serde(default = "default_root_greeting")]
    pub root_greeting: Vec<String>,
    #[serde(default = "default_talk_label")]
    pub talk_label: String,
    #[serde(default = "default_goodbye_label")]
    pub goodbye_label: String,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            root_greeting: default_root_greeting(),
            talk_label: default_talk_label(),
            goodbye_label: default_goodbye_label(),
        }
    }
}

fn default_origin() -> f32 {
    100.0
}

fn default_column_spacing() -> f32 {
    220.0
}

fn default_row_spacing() -> f32 {
    140.0
}

/// Worldmap spacing; roots sit at `origin_x`, each dependency level one column further right
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldmapConfig {
    #[serde(default = "default_origin")]
    pub origin_x: f32,
    #[serde(default = "default_origin")]
    pub origin_y: f32,
    #[serde(default = "default_column_spacing")]
    pub column_spacing: f32,
    #[serde(default = "default_row_spacing")]
    pub row_spacing: f32,
}

impl Default for WorldmapConfig {
    fn default() -> Self {
        Self {
            origin_x: default_origin(),
            origin_y: default_origin(),
            column_spacing: default_column_spacing(),
            row_spacing: default_row_spacing(),
        }
    }
}

fn default_log_filter() -> String {
    "module_progression=info,progression_server=info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
[content]
data_dir = "content"

[progression.initial_unlock]
mode = "manual"
modules = ["intro"]

[evaluation]
custom_check_timeout_ms = 250
"#,
        )
        .unwrap();

        assert_eq!(config.content.data_dir, PathBuf::from("content"));
        assert!(!config.content.hot_reload);
        assert_eq!(
            config.progression.initial_unlock,
            InitialUnlockPolicy::Manual {
                modules: vec!["intro".to_string()]
            }
        );
        assert_eq!(config.evaluation.custom_check_timeout(), Duration::from_millis(250));
        assert_eq!(config.dialogue.talk_label, "Talk");
        assert_eq!(config.worldmap.column_spacing, 220.0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = EngineConfig::load(&temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(
            config.progression.initial_unlock,
            InitialUnlockPolicy::FirstN { count: 2 }
        );
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "[content\n").unwrap();

        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, ProgressionError::Parse { .. }));
    }
}
