//! JSON 파일 저장소
//!
//! Config files are plain JSON. Layers (global, then project) are merged at
//! the `serde_json::Value` level before deserializing, so a project file
//! only needs the keys it overrides.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 글로벌/프로젝트 디렉토리 이름
pub const IGNITE_DIR: &str = "ignite";
const PROJECT_DIR: &str = ".ignite";

/// JSON 설정 저장소
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// 글로벌 설정 (<config_dir>/ignite/)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join(IGNITE_DIR);
        Ok(Self::new(dir))
    }

    /// 프로젝트 설정 (.ignite/)
    pub fn project(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(PROJECT_DIR))
    }

    /// 현재 디렉토리 프로젝트 설정
    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot get current directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    /// Raw JSON value, `None` when the file does not exist
    pub fn load_value(&self, filename: &str) -> Result<Option<Value>> {
        let path = self.file_path(filename);
        if !path.exists() {
            debug!("No config at {}", path.display());
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            warn!("Unreadable config {}: {}", path.display(), e);
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let value = serde_json::from_str(&content).map_err(|e| {
            warn!("Invalid JSON in {}: {}", path.display(), e);
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        debug!("Loaded config layer {}", path.display());
        Ok(Some(value))
    }

    /// Merge the same file across several stores, later stores win
    pub fn load_layered<T: DeserializeOwned>(stores: &[JsonStore], filename: &str) -> Result<T> {
        let mut merged = Value::Object(Default::default());
        for store in stores {
            match store.load_value(filename)? {
                Some(layer @ Value::Object(_)) => merge_values(&mut merged, layer),
                // 객체가 아닌 레이어는 병합 불가
                Some(_) => warn!(
                    "Ignoring {}: top level is not a JSON object",
                    store.file_path(filename).display()
                ),
                None => {}
            }
        }
        serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", filename, e)))
    }
}

/// Deep-merge `overlay` into `base`: objects merge key by key, anything
/// else replaces.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
