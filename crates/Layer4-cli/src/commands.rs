//! Subcommand implementations
//!
//! Every command returns whether it succeeded; envelopes go to stdout as
//! pretty JSON, logs go to stderr.

use anyhow::{bail, Context};
use ignite_container::{derive_repo_container_name, derive_repo_kind};
use ignite_foundation::{Envelope, IgniteConfig, OperationRequest};
use ignite_git::GitCredentialManager;
use ignite_plugin::PluginOrchestrator;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use tracing::{info, warn};

/// Orchestrator for one CLI invocation
///
/// Each invocation is its own process, so normal completion must not tear
/// down containers a previous `mount` created. Cleanup only runs when the
/// user interrupts, and only if the config asks for it.
struct Session {
    orchestrator: PluginOrchestrator,
    cleanup_on_interrupt: bool,
}

impl Session {
    fn connect(config: &IgniteConfig) -> anyhow::Result<Self> {
        let mut config = config.clone();
        let cleanup_on_interrupt = config.runtime.cleanup_on_shutdown;
        config.runtime.cleanup_on_shutdown = false;

        let orchestrator =
            PluginOrchestrator::new(&config).context("Failed to start the plugin orchestrator")?;
        Ok(Self {
            orchestrator,
            cleanup_on_interrupt,
        })
    }

    /// Drive `fut` to completion unless Ctrl-C comes first
    async fn run<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        let out = tokio::select! {
            out = fut => Some(out),
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                if self.cleanup_on_interrupt {
                    let result = self.orchestrator.repo_manager().cleanup().await;
                    if let Envelope::Success(done) = result {
                        info!("Removed {} container(s)", done.cleaned);
                    }
                }
                None
            }
        };
        self.orchestrator.shutdown().await;
        out
    }
}

fn print_envelope<T: Serialize>(envelope: &Envelope<T>) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(envelope.is_success())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `--options` must be a JSON object
fn parse_options(raw: &str) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_str(raw).context("--options is not valid JSON")?;
    if !value.is_object() {
        bail!("--options must be a JSON object");
    }
    Ok(value)
}

// ============================================================================
// Orchestrator commands
// ============================================================================

pub async fn exec(
    config: &IgniteConfig,
    plugin: &str,
    operation: &str,
    options: &str,
) -> anyhow::Result<bool> {
    let request = OperationRequest::new(operation, parse_options(options)?);
    let session = Session::connect(config)?;
    match session
        .run(session.orchestrator.execute(plugin, request))
        .await
    {
        Some(envelope) => print_envelope(&envelope),
        None => Ok(false),
    }
}

pub async fn mount(config: &IgniteConfig, path: &str, persistent: bool) -> anyhow::Result<bool> {
    let session = Session::connect(config)?;
    let rm = session.orchestrator.repo_manager();
    match session.run(rm.mount(path, persistent)).await {
        Some(envelope) => print_envelope(&envelope),
        None => Ok(false),
    }
}

pub async fn unmount(config: &IgniteConfig, name: &str) -> anyhow::Result<bool> {
    let session = Session::connect(config)?;
    let rm = session.orchestrator.repo_manager();
    match session.run(rm.unmount(name)).await {
        Some(envelope) => print_envelope(&envelope),
        None => Ok(false),
    }
}

pub async fn cleanup(config: &IgniteConfig) -> anyhow::Result<bool> {
    let session = Session::connect(config)?;
    let rm = session.orchestrator.repo_manager();
    match session.run(rm.cleanup()).await {
        Some(envelope) => print_envelope(&envelope),
        None => Ok(false),
    }
}

// ============================================================================
// Credential commands (no container runtime needed)
// ============================================================================

pub async fn keys(config: &IgniteConfig) -> anyhow::Result<bool> {
    let credentials = GitCredentialManager::new(&config.credentials)?;
    let keys = credentials.discovered_keys().await;
    if keys.is_empty() {
        eprintln!("No SSH keys found.");
    }
    print_json(keys.as_ref())?;
    Ok(true)
}

pub async fn privacy(config: &IgniteConfig, url: &str) -> anyhow::Result<bool> {
    let credentials = GitCredentialManager::new(&config.credentials)?;
    let info = credentials.repo_privacy(url).await;
    print_json(&info)?;
    Ok(info.is_public.is_some())
}

pub fn name(config: &IgniteConfig, path_or_url: &str, session: bool) -> anyhow::Result<bool> {
    let kind = derive_repo_kind(path_or_url)?;
    let name = derive_repo_container_name(kind, path_or_url, &config.active_profile, session)?;
    println!("{}", name);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_options() {
        assert_eq!(
            parse_options(r#"{"pathOrUrl": "/tmp/app"}"#).unwrap(),
            json!({ "pathOrUrl": "/tmp/app" })
        );
        assert!(parse_options("[1, 2]").is_err());
        assert!(parse_options("{not json").is_err());
    }

    #[test]
    fn test_name_needs_no_runtime() {
        let config = IgniteConfig::default();
        assert!(name(&config, "git@github.com:acme/app.git", true).unwrap());
        assert!(name(&config, "relative/path", false).is_err());
    }
}
