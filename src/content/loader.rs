//! Content Loading
//!
//! Reads module definitions from `<data_dir>/modules/**/*.toml` and watches
//! that directory for changes during development.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::definition::{ModuleDefinition, RawModuleFile};
use super::registry::ContentRegistry;
use crate::error::{ProgressionError, Result};

pub struct ContentLoader;

impl ContentLoader {
    /// Directory module files live in
    pub fn modules_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("modules")
    }

    /// Load every module under the data directory
    ///
    /// Files are loaded in path order so registration order is stable. A
    /// file that fails to parse is skipped with a warning; a missing
    /// directory yields an empty registry.
    pub fn load_directory(data_dir: &Path) -> Result<ContentRegistry> {
        let modules_dir = Self::modules_dir(data_dir);
        info!("Loading modules from {:?}", modules_dir);

        let mut registry = ContentRegistry::new();
        if !modules_dir.exists() {
            warn!("Module directory does not exist: {:?}", modules_dir);
            return Ok(registry);
        }

        let mut paths = Vec::new();
        collect_toml_files(&modules_dir, &mut paths)?;
        paths.sort();

        for path in paths {
            match Self::load_file(&path) {
                Ok(module) => {
                    info!("Loaded module: {} ({})", module.name, module.id);
                    registry.register(module);
                }
                Err(e) => warn!("Failed to load module {:?}: {}", path, e),
            }
        }

        let problems = registry.validate_references();
        info!(
            "Loaded {} module definitions ({} reference warnings)",
            registry.len(),
            problems
        );

        Ok(registry)
    }

    pub fn load_file(path: &Path) -> Result<ModuleDefinition> {
        let content = std::fs::read_to_string(path).map_err(|source| ProgressionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse module TOML; `path` is only used for error reporting
    pub fn parse(content: &str, path: &Path) -> Result<ModuleDefinition> {
        let raw: RawModuleFile = toml::from_str(content).map_err(|source| ProgressionError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        ModuleDefinition::from_raw(&raw.module)
    }
}

fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|source| ProgressionError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| ProgressionError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|source| ProgressionError::Io {
            path: path.clone(),
            source,
        })?;

        // Symlinked directories are not followed
        if file_type.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}

/// Events from the hot-reload watcher
#[derive(Debug, Clone)]
pub enum HotReloadEvent {
    /// The content directory was reloaded after a change to `path`
    Reloaded {
        path: PathBuf,
        registry: Arc<ContentRegistry>,
    },
    Error(String),
}

pub struct ContentWatcher;

impl ContentWatcher {
    /// Watch the module directory and reload the whole registry on change
    ///
    /// The watcher runs on its own thread; the receiver closing stops it.
    pub fn start(data_dir: &Path) -> Result<mpsc::Receiver<HotReloadEvent>> {
        use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};

        let modules_dir = ContentLoader::modules_dir(data_dir);
        if !modules_dir.exists() {
            return Err(ProgressionError::Io {
                path: modules_dir,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "module directory missing"),
            });
        }

        let (tx, rx) = mpsc::channel(32);
        let data_dir = data_dir.to_path_buf();

        std::thread::spawn(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: std::result::Result<notify::Event, notify::Error>| {
                    if let Ok(event) = res {
                        let _ = notify_tx.send(event);
                    }
                },
                Config::default().with_poll_interval(Duration::from_secs(1)),
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!("Failed to create file watcher: {}", e);
                    let _ = tx.blocking_send(HotReloadEvent::Error(e.to_string()));
                    return;
                }
            };

            if let Err(e) = watcher.watch(&modules_dir, RecursiveMode::Recursive) {
                error!("Failed to watch module directory: {}", e);
                let _ = tx.blocking_send(HotReloadEvent::Error(e.to_string()));
                return;
            }

            info!("Content hot-reload watcher started for {:?}", modules_dir);

            while let Ok(event) = notify_rx.recv() {
                use notify::EventKind;
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    continue;
                }

                let Some(path) = event
                    .paths
                    .iter()
                    .find(|p| p.extension().is_some_and(|ext| ext == "toml"))
                    .cloned()
                else {
                    continue;
                };

                info!("Detected change in {:?}, reloading content", path);
                let message = match ContentLoader::load_directory(&data_dir) {
                    Ok(registry) => HotReloadEvent::Reloaded {
                        path,
                        registry: Arc::new(registry),
                    },
                    Err(e) => {
                        error!("Hot-reload failed: {}", e);
                        HotReloadEvent::Error(e.to_string())
                    }
                };

                if tx.blocking_send(message).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ModuleRegistry, TaskOwnership};
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_directory_recursive_in_path_order() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "modules/02_basics.toml",
            r#"
[module]
id = "basics"
name = "Basics"
unlock = { kind = "module_complete", module_id = "intro" }

[[module.tasks]]
id = "loops"
name = "Loops"
"#,
        );
        write(
            temp.path(),
            "modules/01_intro.toml",
            r#"
[module]
id = "intro"
name = "Intro"

[[module.tasks]]
id = "hello"
name = "Hello"
"#,
        );
        write(
            temp.path(),
            "modules/extra/03_advanced.toml",
            r#"
[module]
id = "advanced"
name = "Advanced"
"#,
        );
        write(temp.path(), "modules/broken.toml", "[module\nid = ");
        write(temp.path(), "modules/notes.txt", "not a module");

        let registry = ContentLoader::load_directory(temp.path()).unwrap();
        assert_eq!(
            registry.registered_module_ids(),
            vec!["intro", "basics", "advanced"]
        );
        assert_eq!(registry.find_task_module("loops").as_deref(), Some("basics"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let registry = ContentLoader::load_directory(temp.path()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_parse_errors_carry_path() {
        let err = ContentLoader::parse("[module]\nname = \"x\"", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ProgressionError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_watcher_requires_module_directory() {
        let temp = TempDir::new().unwrap();
        assert!(ContentWatcher::start(temp.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_are_not_followed() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "modules/intro.toml",
            "[module]\nid = \"intro\"\nname = \"Intro\"\n",
        );
        let modules = temp.path().join("modules");
        std::os::unix::fs::symlink(&modules, modules.join("loop")).unwrap();

        let registry = ContentLoader::load_directory(temp.path()).unwrap();
        assert_eq!(registry.registered_module_ids(), vec!["intro"]);
    }
}
