//! Container runtime client
//!
//! The engine and handlers only talk to [`ContainerRuntimeClient`]; the
//! bollard-backed [`DockerRuntime`] is the production implementation.

mod docker;

pub use docker::DockerRuntime;

use crate::spec::ContainerSpec;
use async_trait::async_trait;
use futures::stream::BoxStream;
use ignite_foundation::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Lifecycle state of a named container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

/// One container returned by a label query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub labels: HashMap<String, String>,
}

/// A piece of exec output
///
/// Clients that already demultiplex (bollard does for non-tty sessions)
/// hand over typed chunks; anything else arrives as `Raw` and goes through
/// the stream decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecChunk {
    Raw(Vec<u8>),
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Stdin(Vec<u8>),
}

pub type ExecStream = BoxStream<'static, Result<ExecChunk>>;

/// Command plus environment for one exec session
///
/// The environment may hold injected key material and is wiped on drop.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct ExecRequest {
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub working_dir: Option<String>,
}

impl ExecRequest {
    pub fn new(cmd: Vec<String>) -> Self {
        Self {
            cmd,
            env: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_working_dir(mut self, dir: Option<String>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Variable names only
    pub fn env_keys(&self) -> Vec<&str> {
        self.env
            .iter()
            .map(|pair| pair.split_once('=').map(|(k, _)| k).unwrap_or(pair))
            .collect()
    }
}

impl fmt::Debug for ExecRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 명령 인자는 소스 코드 전체를 담고 있어 operation 이후만 출력
        let shown = &self.cmd[self.cmd.len().saturating_sub(2)..];
        f.debug_struct("ExecRequest")
            .field("cmd_tail", &shown)
            .field("env", &self.env_keys())
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

/// Minimal container runtime surface
#[async_trait]
pub trait ContainerRuntimeClient: Send + Sync {
    /// Runtime name for logs
    fn name(&self) -> &'static str;

    /// Check the daemon is reachable
    async fn ping(&self) -> Result<()>;

    /// State of the container called `name` (`Absent` when unknown)
    async fn state(&self, name: &str) -> Result<ContainerState>;

    /// Create a container, returning its id
    ///
    /// Fails with `Error::ContainerConflict` when the name is taken.
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start(&self, name: &str) -> Result<()>;

    /// Stop; an already stopped container is not an error
    async fn stop(&self, name: &str, timeout_secs: i64) -> Result<()>;

    /// Remove; fails with `Error::NoSuchContainer` when already gone
    async fn remove(&self, name: &str, force: bool) -> Result<()>;

    /// All containers (including stopped) carrying `key=value`
    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<ContainerSummary>>;

    /// Start an attached exec session
    ///
    /// `Ok(None)` means the runtime accepted the session but returned no
    /// output stream.
    async fn exec(&self, name: &str, request: &ExecRequest) -> Result<Option<ExecStream>>;
}
