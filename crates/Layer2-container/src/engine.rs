//! Plugin Execution Engine
//!
//! Runs one operation of one plugin inside one running container:
//! load payload, open an exec session, decode the output stream, pull the
//! JSON envelope out of stdout.

use crate::loader::PluginAssetLoader;
use crate::runtime::{ContainerRuntimeClient, ExecChunk, ExecRequest, ExecStream};
use crate::stream::{extract_json_object, DecodedOutput, StreamDecoder, StreamKind};
use futures::StreamExt;
use ignite_foundation::{Envelope, Error, PluginType, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Tags every process of one exec session, children included
pub const EXEC_ID_ENV: &str = "IGNITE_EXEC_ID";

/// Upper bound for the follow-up kill session after a timeout
const KILL_TIMEOUT: Duration = Duration::from_secs(5);

static EXEC_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_exec_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!(
        "{}-{:08x}-{}",
        std::process::id(),
        nanos,
        EXEC_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Shell snippet that signals every process carrying `exec_id`
///
/// Walks `/proc` and matches the tag in each process environment, so the
/// interpreter and anything it spawned (git, npm) are all hit.
pub fn kill_command(exec_id: &str) -> Vec<String> {
    let script = format!(
        "for p in /proc/[0-9]*; do \
         if tr '\\0' '\\n' < \"$p/environ\" 2>/dev/null | grep -qx '{}={}'; then \
         kill -TERM \"${{p#/proc/}}\" 2>/dev/null; fi; done; true",
        EXEC_ID_ENV, exec_id
    );
    vec!["sh".to_string(), "-c".to_string(), script]
}

/// One operation call
#[derive(Debug, Clone)]
pub struct PluginInvocation {
    pub plugin_type: PluginType,
    pub plugin_id: String,
    pub operation: String,
    pub params: Value,
    /// Target container name
    pub container: String,
    /// Extra `KEY=VALUE` pairs (credential injection)
    pub env: Vec<String>,
    pub working_dir: Option<String>,
}

impl PluginInvocation {
    pub fn new(
        plugin_type: PluginType,
        plugin_id: impl Into<String>,
        operation: impl Into<String>,
        params: Value,
        container: impl Into<String>,
    ) -> Self {
        Self {
            plugin_type,
            plugin_id: plugin_id.into(),
            operation: operation.into(),
            params,
            container: container.into(),
            env: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Executes plugin payloads in containers
pub struct PluginExecutionEngine {
    runtime: Arc<dyn ContainerRuntimeClient>,
    loader: Arc<dyn PluginAssetLoader>,
    /// `None` waits for the session forever
    exec_timeout: Option<Duration>,
}

impl PluginExecutionEngine {
    pub fn new(runtime: Arc<dyn ContainerRuntimeClient>, loader: Arc<dyn PluginAssetLoader>) -> Self {
        Self {
            runtime,
            loader,
            exec_timeout: Some(Duration::from_secs(300)),
        }
    }

    /// Bound on one exec session
    ///
    /// When it fires, a second exec sends SIGTERM to every process of the
    /// timed-out session before [`Error::ExecTimeout`] is returned.
    pub fn with_exec_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.exec_timeout = timeout;
        self
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntimeClient> {
        &self.runtime
    }

    /// Run the invocation and decode its envelope
    ///
    /// `Err` means the orchestration itself failed (payload, exec session,
    /// stream, output protocol). A plugin that reports its own failure comes
    /// back as `Ok(Envelope::Failure(..))`.
    pub async fn execute(&self, invocation: PluginInvocation) -> Result<Envelope<Value>> {
        let started = Instant::now();
        let payload = self
            .loader
            .load(invocation.plugin_type, &invocation.plugin_id)
            .await?;

        let params = serde_json::to_string(&invocation.params)?;
        let exec_id = next_exec_id();
        let mut env = invocation.env;
        env.push(format!("{}={}", EXEC_ID_ENV, exec_id));
        let request = ExecRequest::new(payload.command(&invocation.operation, &params))
            .with_env(env)
            .with_working_dir(invocation.working_dir);

        debug!(
            plugin = %invocation.plugin_id,
            operation = %invocation.operation,
            container = %invocation.container,
            exec_id = %exec_id,
            env = ?request.env_keys(),
            "executing plugin operation"
        );

        let run = self.run_session(&invocation.container, &request);
        let output = match self.exec_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(output) => output?,
                Err(_) => {
                    warn!(
                        "Plugin {} {} timed out in {}",
                        invocation.plugin_id, invocation.operation, invocation.container
                    );
                    self.kill_session(&invocation.container, &exec_id).await;
                    return Err(Error::ExecTimeout {
                        container: invocation.container,
                        secs: limit.as_secs(),
                    });
                }
            },
            None => run.await?,
        };
        drop(request);

        if !output.stderr.is_empty() {
            debug!(
                plugin = %invocation.plugin_id,
                "plugin stderr: {}",
                output.stderr_text().trim_end()
            );
        }

        let value = extract_json_object(&output)?;
        let envelope = Envelope::from_value(value)?;
        debug!(
            plugin = %invocation.plugin_id,
            operation = %invocation.operation,
            success = envelope.is_success(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "plugin operation finished"
        );
        Ok(envelope)
    }

    /// Best effort: failures are logged, never returned
    async fn kill_session(&self, container: &str, exec_id: &str) {
        let request = ExecRequest::new(kill_command(exec_id));
        match tokio::time::timeout(KILL_TIMEOUT, self.run_session(container, &request)).await {
            Ok(Ok(_)) => debug!("Sent SIGTERM to exec {} in {}", exec_id, container),
            Ok(Err(e)) => warn!("Failed to stop exec {} in {}: {}", exec_id, container, e),
            Err(_) => warn!("Stopping exec {} in {} timed out", exec_id, container),
        }
    }

    async fn run_session(&self, container: &str, request: &ExecRequest) -> Result<DecodedOutput> {
        let stream = self
            .runtime
            .exec(container, request)
            .await?
            .ok_or_else(|| Error::ExecNoStream {
                container: container.to_string(),
            })?;
        collect_output(stream).await
    }
}

/// Drain an exec stream through the decoder
pub async fn collect_output(mut stream: ExecStream) -> Result<DecodedOutput> {
    let mut decoder = StreamDecoder::new();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            ExecChunk::Raw(bytes) => decoder.push(&bytes),
            ExecChunk::Stdout(bytes) => decoder.push_typed(StreamKind::Stdout, &bytes),
            ExecChunk::Stderr(bytes) => decoder.push_typed(StreamKind::Stderr, &bytes),
            ExecChunk::Stdin(_) => {}
        }
    }
    Ok(decoder.finish())
}
