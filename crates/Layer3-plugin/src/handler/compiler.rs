//! Compiler Handler
//!
//! Smart-contract toolchains (hardhat, foundry, ...) run inside the repo
//! container that already exists for the project. Operations are whatever
//! the compiler payload implements (`detect`, `compile`, ...); every request
//! carries the project `path`.

use super::repo_manager::invalid;
use super::{plugin_params, HandlerContext};
use ignite_container::PluginInvocation;
use ignite_foundation::{Envelope, Error, ErrorCode, OperationRequest, PluginType, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
struct CompilerOptions {
    path: String,
}

pub struct CompilerHandler {
    plugin_id: String,
    ctx: Arc<HandlerContext>,
}

impl CompilerHandler {
    pub fn new(plugin_id: impl Into<String>, ctx: Arc<HandlerContext>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            ctx,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub async fn handle(&self, request: &OperationRequest) -> Envelope<Value> {
        if request.operation.trim().is_empty() {
            return invalid(&Error::invalid_options("", "operation name is empty"));
        }
        let options = match request.options::<CompilerOptions>() {
            Ok(options) => options,
            Err(e) => return invalid(&e),
        };

        match self.run(&options.path, request).await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("{} {} failed: {}", self.plugin_id, request.operation, e);
                Envelope::from_error(ErrorCode::CompilerOperationFailed, &e)
            }
        }
    }

    /// Never creates a container; the project must be mounted or initialized
    async fn run(&self, path: &str, request: &OperationRequest) -> Result<Envelope<Value>> {
        let container = self.ctx.resolve_existing(path).await?;
        let params = plugin_params(&request.options, &self.ctx.config.workspace_path);

        let invocation = PluginInvocation::new(
            PluginType::Compiler,
            &self.plugin_id,
            &request.operation,
            params,
            container.name,
        )
        .with_working_dir(&self.ctx.config.workspace_path);

        self.ctx.engine.execute(invocation).await
    }
}
