//! Plugin payload loading
//!
//! A payload is the source of one plugin plus the interpreter that runs it
//! inside the container. The filesystem loader reads
//! `<assets>/<type>/<id>/index.<ext>`; sources are cached after first read.

use async_trait::async_trait;
use ignite_foundation::{Error, PluginType, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Entry files tried in order, with the interpreter prefix for each
const ENTRY_POINTS: &[(&str, &[&str])] = &[
    ("index.js", &["node", "-e"]),
    ("index.mjs", &["node", "--input-type=module", "-e"]),
    ("index.py", &["python3", "-c"]),
];

/// Source plus interpreter for one plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginPayload {
    pub interpreter: Vec<String>,
    pub source: String,
}

impl PluginPayload {
    pub fn new(interpreter: &[&str], source: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.iter().map(|s| s.to_string()).collect(),
            source: source.into(),
        }
    }

    /// Node.js inline script
    pub fn node(source: impl Into<String>) -> Self {
        Self::new(&["node", "-e"], source)
    }

    /// `<interpreter...> <source> <operation> <params-json>`
    pub fn command(&self, operation: &str, params_json: &str) -> Vec<String> {
        let mut cmd = self.interpreter.clone();
        cmd.push(self.source.clone());
        cmd.push(operation.to_string());
        cmd.push(params_json.to_string());
        cmd
    }
}

/// Supplies plugin payloads to the execution engine
#[async_trait]
pub trait PluginAssetLoader: Send + Sync {
    async fn load(&self, plugin_type: PluginType, plugin_id: &str) -> Result<Arc<PluginPayload>>;
}

/// Loads payloads from a directory tree on the host
pub struct FsAssetLoader {
    root: PathBuf,
    cache: RwLock<HashMap<(PluginType, String), Arc<PluginPayload>>>,
}

impl FsAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop cached sources so edits on disk are picked up
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    fn plugin_dir(&self, plugin_type: PluginType, plugin_id: &str) -> PathBuf {
        self.root.join(plugin_type.as_str()).join(plugin_id)
    }
}

fn validate_id(plugin_id: &str) -> Result<()> {
    let valid = !plugin_id.is_empty()
        && plugin_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !plugin_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(Error::PayloadLoad {
            plugin: plugin_id.to_string(),
            message: "invalid plugin id".into(),
        })
    }
}

#[async_trait]
impl PluginAssetLoader for FsAssetLoader {
    async fn load(&self, plugin_type: PluginType, plugin_id: &str) -> Result<Arc<PluginPayload>> {
        validate_id(plugin_id)?;
        let key = (plugin_type, plugin_id.to_string());
        if let Some(payload) = self.cache.read().get(&key) {
            return Ok(payload.clone());
        }

        let dir = self.plugin_dir(plugin_type, plugin_id);
        for (file, interpreter) in ENTRY_POINTS {
            let path = dir.join(file);
            match tokio::fs::read_to_string(&path).await {
                Ok(source) => {
                    debug!("Loaded plugin payload {}", path.display());
                    let payload = Arc::new(PluginPayload::new(interpreter, source));
                    self.cache.write().insert(key, payload.clone());
                    return Ok(payload);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::PayloadLoad {
                        plugin: plugin_id.to_string(),
                        message: format!("{}: {}", path.display(), e),
                    })
                }
            }
        }

        Err(Error::PayloadLoad {
            plugin: plugin_id.to_string(),
            message: format!("no entry point in {}", dir.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_layout() {
        let payload = PluginPayload::node("console.log(1)");
        assert_eq!(
            payload.command("init", "{\"a\":1}"),
            vec!["node", "-e", "console.log(1)", "init", "{\"a\":1}"]
        );
    }

    #[tokio::test]
    async fn test_fs_loader_reads_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("repo-manager").join("repo-manager");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("index.js"), "v1").unwrap();

        let loader = FsAssetLoader::new(dir.path());
        let first = loader.load(PluginType::RepoManager, "repo-manager").await.unwrap();
        assert_eq!(first.source, "v1");
        assert_eq!(first.interpreter, vec!["node", "-e"]);

        std::fs::write(plugin_dir.join("index.js"), "v2").unwrap();
        let cached = loader.load(PluginType::RepoManager, "repo-manager").await.unwrap();
        assert_eq!(cached.source, "v1");

        loader.clear_cache();
        let fresh = loader.load(PluginType::RepoManager, "repo-manager").await.unwrap();
        assert_eq!(fresh.source, "v2");
    }

    #[tokio::test]
    async fn test_fs_loader_python_entry() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("compiler").join("foundry");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("index.py"), "print('{}')").unwrap();

        let loader = FsAssetLoader::new(dir.path());
        let payload = loader.load(PluginType::Compiler, "foundry").await.unwrap();
        assert_eq!(payload.interpreter, vec!["python3", "-c"]);
    }

    #[tokio::test]
    async fn test_fs_loader_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsAssetLoader::new(dir.path());
        assert!(matches!(
            loader.load(PluginType::Compiler, "hardhat").await,
            Err(Error::PayloadLoad { .. })
        ));
        assert!(matches!(
            loader.load(PluginType::Compiler, "../etc").await,
            Err(Error::PayloadLoad { .. })
        ));
    }
}
