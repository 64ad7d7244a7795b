//! Stable, machine-readable error codes
//!
//! Codes are part of the wire contract: the UI branches on them
//! ("offer retry" vs. "ask for credentials"), so existing variants must
//! never be renamed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code carried in every failed operation envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Resolution
    // ========================================================================
    ResolutionFailed,
    ContainerNotFound,

    // ========================================================================
    // Container runtime
    // ========================================================================
    RuntimeUnavailable,
    RuntimeError,
    ContainerConflict,

    // ========================================================================
    // Credentials
    // ========================================================================
    CredentialsUnavailable,
    ProbeTimeout,

    // ========================================================================
    // Exec protocol
    // ========================================================================
    PayloadLoadFailed,
    ExecCreateFailed,
    ExecNoStream,
    ExecStreamError,
    ExecTimeout,
    PluginOutputNoJson,
    PluginOutputInvalidJson,
    PluginOutputInvalidEnvelope,

    // ========================================================================
    // Dispatch
    // ========================================================================
    PluginNotFound,
    UnknownOperation,
    InvalidOptions,

    // ========================================================================
    // Per-operation failure categories
    // ========================================================================
    MountFailed,
    UnmountFailed,
    CleanupFailed,
    InitFailed,
    CheckoutBranchFailed,
    CheckoutCommitFailed,
    GetBranchesFailed,
    PullFailed,
    RepoInfoFailed,
    CompilerOperationFailed,

    // ========================================================================
    // General
    // ========================================================================
    ConfigError,
    IoError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolutionFailed => "RESOLUTION_FAILED",
            Self::ContainerNotFound => "CONTAINER_NOT_FOUND",
            Self::RuntimeUnavailable => "RUNTIME_UNAVAILABLE",
            Self::RuntimeError => "RUNTIME_ERROR",
            Self::ContainerConflict => "CONTAINER_CONFLICT",
            Self::CredentialsUnavailable => "CREDENTIALS_UNAVAILABLE",
            Self::ProbeTimeout => "PROBE_TIMEOUT",
            Self::PayloadLoadFailed => "PAYLOAD_LOAD_FAILED",
            Self::ExecCreateFailed => "EXEC_CREATE_FAILED",
            Self::ExecNoStream => "EXEC_NO_STREAM",
            Self::ExecStreamError => "EXEC_STREAM_ERROR",
            Self::ExecTimeout => "EXEC_TIMEOUT",
            Self::PluginOutputNoJson => "PLUGIN_OUTPUT_NO_JSON",
            Self::PluginOutputInvalidJson => "PLUGIN_OUTPUT_INVALID_JSON",
            Self::PluginOutputInvalidEnvelope => "PLUGIN_OUTPUT_INVALID_ENVELOPE",
            Self::PluginNotFound => "PLUGIN_NOT_FOUND",
            Self::UnknownOperation => "UNKNOWN_OPERATION",
            Self::InvalidOptions => "INVALID_OPTIONS",
            Self::MountFailed => "MOUNT_FAILED",
            Self::UnmountFailed => "UNMOUNT_FAILED",
            Self::CleanupFailed => "CLEANUP_FAILED",
            Self::InitFailed => "INIT_FAILED",
            Self::CheckoutBranchFailed => "CHECKOUT_BRANCH_FAILED",
            Self::CheckoutCommitFailed => "CHECKOUT_COMMIT_FAILED",
            Self::GetBranchesFailed => "GET_BRANCHES_FAILED",
            Self::PullFailed => "PULL_FAILED",
            Self::RepoInfoFailed => "REPO_INFO_FAILED",
            Self::CompilerOperationFailed => "COMPILER_OPERATION_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
