//! Repo Manager Handler
//!
//! Container lifecycle (`mount`, `unmount`, `cleanup`) is handled here
//! directly. Repository operations (`init`, `checkoutBranch`, ...) resolve
//! a container and run the repo-manager payload inside it.

use super::{plugin_params, HandlerContext, ResolvedContainer};
use ignite_container::{
    derive_repo_kind, labels, ContainerState, PluginInvocation, RepoContainerKind,
};
use ignite_foundation::{Envelope, Error, ErrorCode, OperationRequest, PluginType, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Operations served by this handler
pub const OPERATIONS: &[&str] = &[
    "mount",
    "unmount",
    "cleanup",
    "init",
    "checkoutBranch",
    "checkoutCommit",
    "getBranches",
    "pullChanges",
    "getRepoInfo",
];

fn default_persistent() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MountOptions {
    host_path: String,
    #[serde(default = "default_persistent")]
    persistent: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnmountOptions {
    container_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitOptions {
    path_or_url: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default = "default_persistent")]
    persistent: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetOptions {
    path_or_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BranchOptions {
    path_or_url: String,
    branch: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitOptions {
    path_or_url: String,
    commit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullOptions {
    path_or_url: String,
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountResult {
    pub container_name: String,
    pub reused: bool,
    pub workspace_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmountResult {
    pub container_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub cleaned: usize,
}

/// `getRepoInfo` data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoInfo {
    /// `None` on a detached HEAD
    pub branch: Option<String>,
    pub commit: String,
    pub dirty: bool,
    pub up_to_date: bool,
}

pub struct RepoManagerHandler {
    plugin_id: String,
    ctx: Arc<HandlerContext>,
}

impl RepoManagerHandler {
    pub fn new(plugin_id: impl Into<String>, ctx: Arc<HandlerContext>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            ctx,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Dispatch an operation request
    pub async fn handle(&self, request: &OperationRequest) -> Envelope<Value> {
        match request.operation.as_str() {
            "mount" => match request.options::<MountOptions>() {
                Ok(o) => self.mount(&o.host_path, o.persistent).await.into_value(),
                Err(e) => invalid(&e),
            },
            "unmount" => match request.options::<UnmountOptions>() {
                Ok(o) => self.unmount(&o.container_name).await.into_value(),
                Err(e) => invalid(&e),
            },
            "cleanup" => self.cleanup().await.into_value(),
            "init" => match request.options::<InitOptions>() {
                Ok(o) => {
                    self.init(&o.path_or_url, o.branch.as_deref(), o.persistent, &request.options)
                        .await
                }
                Err(e) => invalid(&e),
            },
            "checkoutBranch" => match request.options::<BranchOptions>() {
                Ok(o) => {
                    let options = overlay(
                        &request.options,
                        json!({ "pathOrUrl": o.path_or_url, "branch": o.branch }),
                    );
                    self.run_existing(
                        &o.path_or_url,
                        "checkoutBranch",
                        &options,
                        true,
                        ErrorCode::CheckoutBranchFailed,
                    )
                    .await
                }
                Err(e) => invalid(&e),
            },
            "checkoutCommit" => match request.options::<CommitOptions>() {
                Ok(o) => {
                    let options = overlay(
                        &request.options,
                        json!({ "pathOrUrl": o.path_or_url, "commit": o.commit }),
                    );
                    self.run_existing(
                        &o.path_or_url,
                        "checkoutCommit",
                        &options,
                        false,
                        ErrorCode::CheckoutCommitFailed,
                    )
                    .await
                }
                Err(e) => invalid(&e),
            },
            "getBranches" => match request.options::<TargetOptions>() {
                Ok(o) => self.get_branches(&o.path_or_url).await,
                Err(e) => invalid(&e),
            },
            "pullChanges" => match request.options::<PullOptions>() {
                Ok(o) => {
                    let options = overlay(
                        &request.options,
                        json!({ "pathOrUrl": o.path_or_url, "branch": o.branch }),
                    );
                    self.run_existing(
                        &o.path_or_url,
                        "pullChanges",
                        &options,
                        true,
                        ErrorCode::PullFailed,
                    )
                    .await
                }
                Err(e) => invalid(&e),
            },
            "getRepoInfo" => match request.options::<TargetOptions>() {
                Ok(o) => self.get_repo_info(&o.path_or_url).await.into_value(),
                Err(e) => invalid(&e),
            },
            other => unknown_operation(&self.plugin_id, other),
        }
    }

    // ========================================================================
    // Container lifecycle
    // ========================================================================

    /// Reuse or create the local container for `host_path`
    ///
    /// `persistent = false` gives a `-session` container that the runtime
    /// removes once it stops.
    pub async fn mount(&self, host_path: &str, persistent: bool) -> Envelope<MountResult> {
        match self.try_mount(host_path, persistent).await {
            Ok(resolved) => Envelope::ok(MountResult {
                container_name: resolved.name,
                reused: resolved.reused,
                workspace_path: self.ctx.config.workspace_path.clone(),
            }),
            Err(e) => {
                warn!("Mount of {} failed: {}", host_path, e);
                Envelope::from_error(ErrorCode::MountFailed, &e)
            }
        }
    }

    async fn try_mount(&self, host_path: &str, persistent: bool) -> Result<ResolvedContainer> {
        if derive_repo_kind(host_path)? != RepoContainerKind::Local {
            return Err(Error::Resolution(format!(
                "{} is not a local path",
                host_path
            )));
        }
        self.ctx
            .ensure_container(RepoContainerKind::Local, host_path, persistent)
            .await
    }

    /// Stop then remove a container
    ///
    /// Both steps always run. A container that was already stopped, or that
    /// the runtime removed by itself after stopping, counts as done.
    pub async fn unmount(&self, container_name: &str) -> Envelope<UnmountResult> {
        match self.try_unmount(container_name).await {
            Ok(()) => {
                info!("Unmounted {}", container_name);
                Envelope::ok(UnmountResult {
                    container_name: container_name.to_string(),
                })
            }
            Err(e) => {
                warn!("Unmount of {} failed: {}", container_name, e);
                Envelope::from_error(ErrorCode::UnmountFailed, &e)
            }
        }
    }

    async fn try_unmount(&self, name: &str) -> Result<()> {
        let runtime = &self.ctx.runtime;
        let stopped = runtime.stop(name, self.ctx.config.stop_timeout_secs).await;
        let removed = match runtime.remove(name, true).await {
            Err(Error::ContainerConflict { .. }) => {
                // removal already in progress (auto-remove)
                match runtime.state(name).await {
                    Ok(ContainerState::Absent) => {
                        Err(Error::NoSuchContainer {
                            container: name.to_string(),
                        })
                    }
                    _ => Err(Error::ContainerConflict {
                        container: name.to_string(),
                    }),
                }
            }
            other => other,
        };

        match (stopped, removed) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(Error::NoSuchContainer { .. })) => Ok(()),
            (Err(Error::NoSuchContainer { .. }), Ok(())) => Ok(()),
            (Err(e @ Error::NoSuchContainer { .. }), Err(Error::NoSuchContainer { .. })) => Err(e),
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }

    /// Force-remove every repo-manager container, stopped ones included
    pub async fn cleanup(&self) -> Envelope<CleanupResult> {
        match self.try_cleanup().await {
            Ok(cleaned) => Envelope::ok(CleanupResult { cleaned }),
            Err(e) => Envelope::from_error(ErrorCode::CleanupFailed, &e),
        }
    }

    async fn try_cleanup(&self) -> Result<usize> {
        let containers = self
            .ctx
            .runtime
            .list_by_label(labels::PLUGIN, labels::REPO_MANAGER)
            .await?;

        let mut cleaned = 0;
        for container in &containers {
            match self.ctx.runtime.remove(&container.name, true).await {
                Ok(()) | Err(Error::NoSuchContainer { .. }) => cleaned += 1,
                Err(e) => warn!("Failed to remove {}: {}", container.name, e),
            }
        }
        info!("Cleaned up {}/{} container(s)", cleaned, containers.len());
        Ok(cleaned)
    }

    // ========================================================================
    // Repository operations
    // ========================================================================

    /// Prepare a repository; the only operation that may create a container
    pub async fn init(
        &self,
        path_or_url: &str,
        branch: Option<&str>,
        persistent: bool,
        options: &Value,
    ) -> Envelope<Value> {
        let result = self
            .try_init(path_or_url, branch, persistent, options)
            .await;
        wrap(result, ErrorCode::InitFailed)
    }

    async fn try_init(
        &self,
        path_or_url: &str,
        branch: Option<&str>,
        persistent: bool,
        options: &Value,
    ) -> Result<Envelope<Value>> {
        let kind = derive_repo_kind(path_or_url)?;
        let container = self
            .ctx
            .ensure_container(kind, path_or_url, persistent)
            .await?;

        let mut params = plugin_params(options, &self.ctx.config.workspace_path);
        params["pathOrUrl"] = json!(path_or_url);
        params["branch"] = json!(branch);
        if kind == RepoContainerKind::Cloned {
            params["repoUrl"] = json!(path_or_url);
        }
        self.execute(&container.name, path_or_url, "init", params, true)
            .await
    }

    pub async fn checkout_branch(&self, path_or_url: &str, branch: &str) -> Envelope<Value> {
        let options = json!({ "pathOrUrl": path_or_url, "branch": branch });
        self.run_existing(
            path_or_url,
            "checkoutBranch",
            &options,
            true,
            ErrorCode::CheckoutBranchFailed,
        )
        .await
    }

    pub async fn checkout_commit(&self, path_or_url: &str, commit: &str) -> Envelope<Value> {
        let options = json!({ "pathOrUrl": path_or_url, "commit": commit });
        self.run_existing(
            path_or_url,
            "checkoutCommit",
            &options,
            false,
            ErrorCode::CheckoutCommitFailed,
        )
        .await
    }

    pub async fn get_branches(&self, path_or_url: &str) -> Envelope<Value> {
        let options = json!({ "pathOrUrl": path_or_url });
        self.run_existing(
            path_or_url,
            "getBranches",
            &options,
            true,
            ErrorCode::GetBranchesFailed,
        )
        .await
    }

    pub async fn pull_changes(&self, path_or_url: &str, branch: Option<&str>) -> Envelope<Value> {
        let options = json!({ "pathOrUrl": path_or_url, "branch": branch });
        self.run_existing(path_or_url, "pullChanges", &options, true, ErrorCode::PullFailed)
            .await
    }

    /// Branch/commit/dirty state, validated against [`RepoInfo`]
    pub async fn get_repo_info(&self, path_or_url: &str) -> Envelope<RepoInfo> {
        let options = json!({ "pathOrUrl": path_or_url });
        let envelope = self
            .run_existing(
                path_or_url,
                "getRepoInfo",
                &options,
                true,
                ErrorCode::RepoInfoFailed,
            )
            .await;

        match envelope {
            Envelope::Success(data) => match serde_json::from_value::<RepoInfo>(data) {
                Ok(info) => Envelope::ok(info),
                Err(e) => Envelope::from_error(
                    ErrorCode::RepoInfoFailed,
                    &Error::InvalidEnvelope(format!("unexpected repo info shape: {}", e)),
                ),
            },
            Envelope::Failure(body) => Envelope::Failure(body),
        }
    }

    async fn run_existing(
        &self,
        path_or_url: &str,
        operation: &str,
        options: &Value,
        network: bool,
        code: ErrorCode,
    ) -> Envelope<Value> {
        let result = self
            .try_run_existing(path_or_url, operation, options, network)
            .await;
        wrap(result, code)
    }

    async fn try_run_existing(
        &self,
        path_or_url: &str,
        operation: &str,
        options: &Value,
        network: bool,
    ) -> Result<Envelope<Value>> {
        let container = self.ctx.resolve_existing(path_or_url).await?;
        let params = plugin_params(options, &self.ctx.config.workspace_path);
        self.execute(&container.name, path_or_url, operation, params, network)
            .await
    }

    async fn execute(
        &self,
        container: &str,
        path_or_url: &str,
        operation: &str,
        params: Value,
        network: bool,
    ) -> Result<Envelope<Value>> {
        let env = if network {
            self.ctx.credential_env(path_or_url).await
        } else {
            Vec::new()
        };

        let invocation = PluginInvocation::new(
            PluginType::RepoManager,
            &self.plugin_id,
            operation,
            params,
            container,
        )
        .with_env(env)
        .with_working_dir(&self.ctx.config.workspace_path);

        self.ctx.engine.execute(invocation).await
    }
}

/// Typed fields over the caller's raw options; unknown keys pass through
fn overlay(options: &Value, fields: Value) -> Value {
    let mut merged = match options {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let Value::Object(fields) = fields {
        merged.extend(fields);
    }
    Value::Object(merged)
}

/// Orchestration errors get the operation code; plugin-domain failures
/// pass through untouched
fn wrap(result: Result<Envelope<Value>>, code: ErrorCode) -> Envelope<Value> {
    match result {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("{} ({}): {}", code, e.code(), e);
            Envelope::from_error(code, &e)
        }
    }
}

pub(crate) fn invalid(err: &Error) -> Envelope<Value> {
    Envelope::from_error(ErrorCode::InvalidOptions, err)
}

pub(crate) fn unknown_operation(plugin: &str, operation: &str) -> Envelope<Value> {
    let err = Error::UnknownOperation {
        plugin: plugin.to_string(),
        operation: operation.to_string(),
    };
    Envelope::from_error(ErrorCode::UnknownOperation, &err)
}
