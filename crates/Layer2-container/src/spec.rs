//! Container specification and Ignite labels

use crate::naming::{workspace_hash, RepoContainerKind};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Label keys stamped on every repo container
pub mod labels {
    pub const TYPE: &str = "ignite.type";
    pub const PLUGIN: &str = "ignite.plugin";
    pub const IMAGE: &str = "ignite.image";
    /// Source of the workspace: host path or repository URL. The
    /// in-container mount point is not labelled; it comes from config.
    pub const WORKSPACE: &str = "ignite.workspace";
    /// Local source only
    pub const HOST_PATH: &str = "ignite.hostPath";
    /// Cloned source only
    pub const REPO_URL: &str = "ignite.repoUrl";
    pub const WORKSPACE_HASH: &str = "ignite.workspaceHash";
    pub const PROFILE: &str = "ignite.profile";
    pub const SESSION: &str = "ignite.session";
    pub const CREATED: &str = "created";

    /// Owner value of [`PLUGIN`] for repo containers; cleanup filters on it
    pub const REPO_MANAGER: &str = "repo-manager";
}

/// Keeps the container alive between exec sessions
pub const IDLE_COMMAND: [&str; 2] = ["sleep", "infinity"];

/// Volume mount configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn new(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host_path: host.into(),
            container_path: container.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// `host:container[:ro]` bind string
    pub fn to_bind(&self) -> String {
        let ro = if self.read_only { ":ro" } else { "" };
        format!(
            "{}:{}{}",
            self.host_path.to_string_lossy(),
            self.container_path,
            ro
        )
    }
}

/// Everything needed to create one container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub working_dir: Option<String>,
    pub env: Vec<String>,
    pub volumes: Vec<VolumeMount>,
    pub labels: HashMap<String, String>,
    /// Removed by the runtime once stopped
    pub auto_remove: bool,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: IDLE_COMMAND.iter().map(|s| s.to_string()).collect(),
            working_dir: None,
            env: Vec::new(),
            volumes: Vec::new(),
            labels: HashMap::new(),
            auto_remove: false,
        }
    }

    pub fn with_command(mut self, cmd: Vec<String>) -> Self {
        self.command = cmd;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env.push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    pub fn with_volume(mut self, mount: VolumeMount) -> Self {
        self.volumes.push(mount);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn with_auto_remove(mut self, auto_remove: bool) -> Self {
        self.auto_remove = auto_remove;
        self
    }

    pub fn binds(&self) -> Vec<String> {
        self.volumes.iter().map(VolumeMount::to_bind).collect()
    }
}

/// Label set for a repo container
#[derive(Debug, Clone)]
pub struct RepoLabels<'a> {
    pub kind: RepoContainerKind,
    /// Host path (local) or repository URL (cloned), as given by the caller
    pub target: &'a str,
    pub image: &'a str,
    pub profile: &'a str,
    pub session: bool,
}

impl RepoLabels<'_> {
    pub fn build(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(labels::TYPE.to_string(), self.kind.label_type().to_string());
        map.insert(labels::PLUGIN.to_string(), labels::REPO_MANAGER.to_string());
        map.insert(labels::IMAGE.to_string(), self.image.to_string());
        map.insert(labels::WORKSPACE.to_string(), self.target.to_string());
        let origin_key = match self.kind {
            RepoContainerKind::Local => labels::HOST_PATH,
            RepoContainerKind::Cloned => labels::REPO_URL,
        };
        map.insert(origin_key.to_string(), self.target.to_string());
        map.insert(labels::WORKSPACE_HASH.to_string(), workspace_hash(self.target));
        map.insert(labels::PROFILE.to_string(), self.profile.to_string());
        map.insert(labels::SESSION.to_string(), self.session.to_string());
        map.insert(labels::CREATED.to_string(), Utc::now().to_rfc3339());
        map
    }
}
