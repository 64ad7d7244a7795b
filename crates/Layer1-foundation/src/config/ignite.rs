//! Ignite Config - 통합 설정
//!
//! Loaded once at orchestrator start: global `<config_dir>/ignite/config.json`
//! deep-merged with the project's `.ignite/config.json`.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 설정 파일명
pub const IGNITE_CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the active profile
pub const PROFILE_ENV: &str = "IGNITE_PROFILE";

// ============================================================================
// Ignite Config (통합)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IgniteConfig {
    /// 버전 (마이그레이션용)
    pub version: u32,

    /// Active profile; namespaces every container name
    pub active_profile: String,

    pub runtime: RuntimeConfig,

    pub credentials: CredentialConfig,

    pub plugins: PluginsConfig,
}

impl Default for IgniteConfig {
    fn default() -> Self {
        Self {
            version: 1,
            active_profile: "default".to_string(),
            runtime: RuntimeConfig::default(),
            credentials: CredentialConfig::default(),
            plugins: PluginsConfig::default(),
        }
    }
}

impl IgniteConfig {
    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut stores = Vec::with_capacity(2);
        if let Ok(global) = JsonStore::global() {
            stores.push(global);
        }
        if let Ok(project) = JsonStore::current_project() {
            stores.push(project);
        }

        let mut config: Self = JsonStore::load_layered(&stores, IGNITE_CONFIG_FILE)?;
        config.apply_env();
        Ok(config)
    }

    /// `IGNITE_PROFILE` wins over the files
    pub fn apply_env(&mut self) {
        if let Ok(profile) = std::env::var(PROFILE_ENV) {
            if !profile.trim().is_empty() {
                self.active_profile = profile.trim().to_string();
            }
        }
    }
}

// ============================================================================
// Runtime
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Image used for repo containers
    pub image: String,

    /// Fixed in-container workspace mount point
    pub workspace_path: String,

    /// Upper bound on one plugin exec; `None` waits forever
    pub exec_timeout_secs: Option<u64>,

    /// Grace period for `docker stop`
    pub stop_timeout_secs: i64,

    /// Remove repo containers when the orchestrator shuts down
    pub cleanup_on_shutdown: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            image: "node:20-bookworm".to_string(),
            workspace_path: "/workspace".to_string(),
            exec_timeout_secs: Some(300),
            stop_timeout_secs: 10,
            cleanup_on_shutdown: true,
        }
    }
}

impl RuntimeConfig {
    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec_timeout_secs.map(Duration::from_secs)
    }
}

// ============================================================================
// Credentials
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialConfig {
    /// Host SSH key directory (defaults to ~/.ssh)
    pub ssh_dir: Option<PathBuf>,

    /// Hard timeout for one `git ls-remote` / `ssh-keygen` probe
    pub probe_timeout_secs: u64,

    /// Hard timeout for one hosting-API privacy request
    pub api_timeout_secs: u64,

    /// How long a privacy verdict stays fresh
    pub privacy_ttl_secs: u64,

    pub github_api_url: String,
    pub gitlab_api_url: String,
    pub bitbucket_api_url: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            ssh_dir: None,
            probe_timeout_secs: 10,
            api_timeout_secs: 5,
            privacy_ttl_secs: 300,
            github_api_url: "https://api.github.com".to_string(),
            gitlab_api_url: "https://gitlab.com/api/v4".to_string(),
            bitbucket_api_url: "https://api.bitbucket.org/2.0".to_string(),
        }
    }
}

impl CredentialConfig {
    pub fn ssh_dir(&self) -> Option<PathBuf> {
        self.ssh_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".ssh")))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn privacy_ttl(&self) -> Duration {
        Duration::from_secs(self.privacy_ttl_secs)
    }
}

// ============================================================================
// Plugins
// ============================================================================

/// Plugin family; decides which handler serves a plugin id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginType {
    RepoManager,
    Compiler,
}

impl PluginType {
    /// Directory name under the assets root
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepoManager => "repo-manager",
            Self::Compiler => "compiler",
        }
    }
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
}

impl PluginEntry {
    pub fn new(id: impl Into<String>, plugin_type: PluginType) -> Self {
        Self {
            id: id.into(),
            plugin_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginsConfig {
    /// Root of packaged plugin payloads (defaults to <data_dir>/ignite/plugins)
    pub assets_dir: Option<PathBuf>,

    pub registry: Vec<PluginEntry>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            assets_dir: None,
            registry: vec![
                PluginEntry::new("repo-manager", PluginType::RepoManager),
                PluginEntry::new("hardhat", PluginType::Compiler),
                PluginEntry::new("foundry", PluginType::Compiler),
            ],
        }
    }
}

impl PluginsConfig {
    pub fn assets_dir(&self) -> PathBuf {
        self.assets_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ignite")
                .join("plugins")
        })
    }
}
