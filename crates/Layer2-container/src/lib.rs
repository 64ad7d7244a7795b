//! # ignite-container
//!
//! Container layer for Ignite.
//!
//! ## Features
//!
//! - Syntax-only repo classification and deterministic container names
//! - Container spec and the `ignite.*` label set
//! - Runtime client trait with a bollard-backed Docker implementation
//! - Exec stream decoding (multiplexed frames or raw passthrough)
//! - Plugin payload loading and the Plugin Execution Engine

pub mod engine;
pub mod loader;
pub mod naming;
pub mod runtime;
pub mod spec;
pub mod stream;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{collect_output, kill_command, PluginExecutionEngine, PluginInvocation, EXEC_ID_ENV};
pub use loader::{FsAssetLoader, PluginAssetLoader, PluginPayload};
pub use naming::{
    derive_repo_container_name, derive_repo_kind, slugify, workspace_hash, RepoContainerKind,
};
pub use runtime::{
    ContainerRuntimeClient, ContainerState, ContainerSummary, DockerRuntime, ExecChunk,
    ExecRequest, ExecStream,
};
pub use spec::{labels, ContainerSpec, RepoLabels, VolumeMount};
pub use stream::{clean_output, extract_json_object, DecodedOutput, StreamDecoder, StreamKind};
