//! Plugin Orchestrator - 플러그인 진입점
//!
//! Built once from [`IgniteConfig`]. Owns the runtime client, credential
//! manager, asset loader and engine, and routes `execute(plugin_id, ..)`
//! through a dispatch table resolved at startup.

use crate::handler::{CleanupResult, CompilerHandler, HandlerContext, RepoManagerHandler};
use ignite_container::{
    ContainerRuntimeClient, DockerRuntime, FsAssetLoader, PluginAssetLoader,
    PluginExecutionEngine,
};
use ignite_foundation::{
    Envelope, Error, ErrorCode, IgniteConfig, OperationRequest, PluginType, Result,
};
use ignite_git::GitCredentialManager;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Id used when the registry has no repo-manager entry
pub const DEFAULT_REPO_MANAGER_ID: &str = "repo-manager";

/// 디스패치 대상 플러그인
#[derive(Clone)]
pub enum Plugin {
    RepoManager(Arc<RepoManagerHandler>),
    Compiler(Arc<CompilerHandler>),
}

impl Plugin {
    pub fn id(&self) -> &str {
        match self {
            Plugin::RepoManager(handler) => handler.plugin_id(),
            Plugin::Compiler(handler) => handler.plugin_id(),
        }
    }

    pub fn plugin_type(&self) -> PluginType {
        match self {
            Plugin::RepoManager(_) => PluginType::RepoManager,
            Plugin::Compiler(_) => PluginType::Compiler,
        }
    }

    pub async fn handle(&self, request: &OperationRequest) -> Envelope<Value> {
        match self {
            Plugin::RepoManager(handler) => handler.handle(request).await,
            Plugin::Compiler(handler) => handler.handle(request).await,
        }
    }
}

pub struct PluginOrchestrator {
    ctx: Arc<HandlerContext>,
    plugins: HashMap<String, Plugin>,
    /// Registration order, for listing
    order: Vec<String>,
    repo_manager: Arc<RepoManagerHandler>,
    cleanup_on_shutdown: bool,
    shut_down: AtomicBool,
}

impl PluginOrchestrator {
    /// Production wiring: Docker daemon, host git, filesystem assets
    pub fn new(config: &IgniteConfig) -> Result<Self> {
        let runtime: Arc<dyn ContainerRuntimeClient> = Arc::new(DockerRuntime::connect()?);
        let loader: Arc<dyn PluginAssetLoader> =
            Arc::new(FsAssetLoader::new(config.plugins.assets_dir()));
        let credentials = Arc::new(GitCredentialManager::new(&config.credentials)?);
        Ok(Self::with_components(config, runtime, loader, credentials))
    }

    /// Wiring with caller-supplied collaborators
    pub fn with_components(
        config: &IgniteConfig,
        runtime: Arc<dyn ContainerRuntimeClient>,
        loader: Arc<dyn PluginAssetLoader>,
        credentials: Arc<GitCredentialManager>,
    ) -> Self {
        let engine = Arc::new(
            PluginExecutionEngine::new(runtime.clone(), loader)
                .with_exec_timeout(config.runtime.exec_timeout()),
        );
        let ctx = Arc::new(HandlerContext::new(
            runtime,
            engine,
            credentials,
            config.runtime.clone(),
            config.active_profile.clone(),
        ));

        let mut plugins = HashMap::new();
        let mut order = Vec::new();
        let mut repo_manager: Option<Arc<RepoManagerHandler>> = None;

        for entry in &config.plugins.registry {
            if plugins.contains_key(&entry.id) {
                warn!("Duplicate plugin id {} in registry, keeping the first", entry.id);
                continue;
            }
            let plugin = match entry.plugin_type {
                PluginType::RepoManager => {
                    let handler = Arc::new(RepoManagerHandler::new(&entry.id, ctx.clone()));
                    repo_manager.get_or_insert_with(|| handler.clone());
                    Plugin::RepoManager(handler)
                }
                PluginType::Compiler => {
                    Plugin::Compiler(Arc::new(CompilerHandler::new(&entry.id, ctx.clone())))
                }
            };
            debug!("Registered plugin {} ({})", entry.id, entry.plugin_type);
            order.push(entry.id.clone());
            plugins.insert(entry.id.clone(), plugin);
        }

        let repo_manager = repo_manager.unwrap_or_else(|| {
            Arc::new(RepoManagerHandler::new(DEFAULT_REPO_MANAGER_ID, ctx.clone()))
        });
        info!(
            "Plugin orchestrator ready: {} plugin(s), profile {}",
            plugins.len(),
            ctx.profile
        );

        Self {
            ctx,
            plugins,
            order,
            repo_manager,
            cleanup_on_shutdown: config.runtime.cleanup_on_shutdown,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Run one operation of one plugin
    pub async fn execute(&self, plugin_id: &str, request: OperationRequest) -> Envelope<Value> {
        let Some(plugin) = self.plugins.get(plugin_id) else {
            let err = Error::PluginNotFound(plugin_id.to_string());
            return Envelope::from_error(ErrorCode::PluginNotFound, &err);
        };
        debug!("{} <- {}", plugin.id(), request.operation);
        plugin.handle(&request).await
    }

    pub fn plugin(&self, plugin_id: &str) -> Option<&Plugin> {
        self.plugins.get(plugin_id)
    }

    /// Registered plugins in registry order
    pub fn plugins(&self) -> impl Iterator<Item = &Plugin> {
        self.order.iter().filter_map(|id| self.plugins.get(id))
    }

    pub fn repo_manager(&self) -> &Arc<RepoManagerHandler> {
        &self.repo_manager
    }

    pub fn credentials(&self) -> &Arc<GitCredentialManager> {
        &self.ctx.credentials
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntimeClient> {
        &self.ctx.runtime
    }

    pub fn profile(&self) -> &str {
        &self.ctx.profile
    }

    /// Tear down: optional container cleanup, then cache reset
    ///
    /// Only the first call does anything.
    pub async fn shutdown(&self) -> Option<Envelope<CleanupResult>> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Orchestrator already shut down");
            return None;
        }

        let cleanup = if self.cleanup_on_shutdown {
            let result = self.repo_manager.cleanup().await;
            match &result {
                Envelope::Success(done) => info!("Shutdown cleanup removed {} container(s)", done.cleaned),
                Envelope::Failure(body) => warn!("Shutdown cleanup failed: {}", body.message),
            }
            Some(result)
        } else {
            None
        };

        self.ctx.credentials.clear_caches();
        cleanup
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}
