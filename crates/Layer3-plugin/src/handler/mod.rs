//! Plugin handlers
//!
//! Handlers translate operation requests into "resolve container, then
//! execute" calls. [`HandlerContext`] holds what they share: the runtime
//! client, the engine, credentials and the per-name mount locks.

pub mod compiler;
pub mod repo_manager;

pub use compiler::CompilerHandler;
pub use repo_manager::{CleanupResult, MountResult, RepoInfo, RepoManagerHandler, UnmountResult};

use crate::locks::KeyedLocks;
use ignite_container::{
    derive_repo_container_name, derive_repo_kind, ContainerRuntimeClient, ContainerSpec,
    ContainerState, PluginExecutionEngine, RepoContainerKind, RepoLabels, VolumeMount,
};
use ignite_foundation::{Error, Result, RuntimeConfig};
use ignite_git::{local_path, GitCredentialManager};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collaborators shared by every handler
pub struct HandlerContext {
    pub runtime: Arc<dyn ContainerRuntimeClient>,
    pub engine: Arc<PluginExecutionEngine>,
    pub credentials: Arc<GitCredentialManager>,
    pub config: RuntimeConfig,
    /// Active profile, part of every container name
    pub profile: String,
    locks: KeyedLocks,
}

/// A container ready to receive exec sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContainer {
    pub name: String,
    pub kind: RepoContainerKind,
    /// Existed before this call
    pub reused: bool,
}

impl HandlerContext {
    pub fn new(
        runtime: Arc<dyn ContainerRuntimeClient>,
        engine: Arc<PluginExecutionEngine>,
        credentials: Arc<GitCredentialManager>,
        config: RuntimeConfig,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            engine,
            credentials,
            config,
            profile: profile.into(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn container_name(
        &self,
        kind: RepoContainerKind,
        path_or_url: &str,
        session: bool,
    ) -> Result<String> {
        derive_repo_container_name(kind, path_or_url, &self.profile, session)
    }

    /// Make sure `name` is running; `false` when it does not exist
    async fn ensure_running(&self, name: &str) -> Result<bool> {
        match self.runtime.state(name).await? {
            ContainerState::Running => Ok(true),
            ContainerState::Stopped => {
                info!("Starting stopped container {}", name);
                self.runtime.start(name).await?;
                Ok(true)
            }
            ContainerState::Absent => Ok(false),
        }
    }

    /// Existing container for a target: persistent name first, then session
    ///
    /// Never creates anything.
    pub async fn resolve_existing(&self, path_or_url: &str) -> Result<ResolvedContainer> {
        let kind = derive_repo_kind(path_or_url)?;
        let candidates = vec![
            self.container_name(kind, path_or_url, false)?,
            self.container_name(kind, path_or_url, true)?,
        ];

        for name in &candidates {
            if self.ensure_running(name).await? {
                debug!("Resolved {} to {}", path_or_url, name);
                return Ok(ResolvedContainer {
                    name: name.clone(),
                    kind,
                    reused: true,
                });
            }
        }

        Err(Error::ContainerNotFound {
            target: path_or_url.to_string(),
            candidates,
        })
    }

    /// Reuse or create the container for a target
    ///
    /// Creation of one name is serialized; losing a create race to another
    /// process (conflict) counts as reuse.
    pub async fn ensure_container(
        &self,
        kind: RepoContainerKind,
        path_or_url: &str,
        persistent: bool,
    ) -> Result<ResolvedContainer> {
        let name = self.container_name(kind, path_or_url, !persistent)?;
        let _guard = self.locks.lock(&name).await;

        if self.ensure_running(&name).await? {
            info!("Reusing container {}", name);
            return Ok(ResolvedContainer {
                name,
                kind,
                reused: true,
            });
        }

        let spec = self.build_spec(kind, path_or_url, &name, persistent).await?;
        match self.runtime.create(&spec).await {
            Ok(id) => {
                debug!("Container {} created with id {}", name, id);
                self.runtime.start(&name).await?;
                info!("Started {} container {}", kind, name);
                Ok(ResolvedContainer {
                    name,
                    kind,
                    reused: false,
                })
            }
            Err(Error::ContainerConflict { .. }) => {
                warn!("Container {} appeared concurrently, reusing it", name);
                self.ensure_running(&name).await?;
                Ok(ResolvedContainer {
                    name,
                    kind,
                    reused: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn build_spec(
        &self,
        kind: RepoContainerKind,
        path_or_url: &str,
        name: &str,
        persistent: bool,
    ) -> Result<ContainerSpec> {
        let workspace = self.config.workspace_path.as_str();
        let labels = RepoLabels {
            kind,
            target: path_or_url,
            image: &self.config.image,
            profile: &self.profile,
            session: !persistent,
        }
        .build();

        let mut spec = ContainerSpec::new(name, &self.config.image)
            .with_working_dir(workspace)
            .with_labels(labels)
            .with_auto_remove(!persistent);

        if kind == RepoContainerKind::Local {
            let host = local_path(path_or_url);
            let is_dir = tokio::fs::metadata(&host)
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false);
            if !is_dir {
                return Err(Error::Resolution(format!(
                    "{} is not a directory",
                    host.display()
                )));
            }
            spec = spec.with_volume(VolumeMount::new(host, workspace));
        }
        Ok(spec)
    }

    /// Credential environment for a target; empty when none applies
    ///
    /// Lookup failures only cost the injection, never the operation.
    pub async fn credential_env(&self, path_or_url: &str) -> Vec<String> {
        match self
            .credentials
            .get_ssh_credentials_for_container(path_or_url)
            .await
        {
            Ok(Some(creds)) => {
                debug!("Injecting SSH credentials ({}) for {}", creds.key_path.display(), path_or_url);
                creds.container_env()
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Credential lookup for {} failed: {}", path_or_url, e);
                Vec::new()
            }
        }
    }
}

/// Operation options forwarded to the payload, plus the workspace path
pub(crate) fn plugin_params(options: &Value, workspace: &str) -> Value {
    let mut params = match options {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    params.insert("workspacePath".into(), Value::String(workspace.to_string()));
    Value::Object(params)
}
