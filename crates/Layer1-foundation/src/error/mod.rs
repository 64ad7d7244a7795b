//! Error types for Ignite
//!
//! Every failure in the orchestration core funnels into [`Error`]. Each
//! variant maps to a stable [`ErrorCode`] and, where useful, a diagnostics
//! payload so a caller can tell "our orchestration failed" apart from
//! "the plugin's own logic failed".

mod code;

pub use code::ErrorCode;

use serde_json::{json, Value};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Ignite error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Resolution
    // ========================================================================
    #[error("Cannot resolve repository target: {0}")]
    Resolution(String),

    #[error("No container exists for {target} (looked for {candidates:?})")]
    ContainerNotFound {
        target: String,
        candidates: Vec<String>,
    },

    // ========================================================================
    // Container runtime
    // ========================================================================
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("Container {container} not found")]
    NoSuchContainer { container: String },

    #[error("Container {container} already exists")]
    ContainerConflict { container: String },

    #[error("Container runtime error on {container}: {message}")]
    Runtime { container: String, message: String },

    // ========================================================================
    // Credentials
    // ========================================================================
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Probe timed out after {secs}s: {what}")]
    ProbeTimeout { what: String, secs: u64 },

    // ========================================================================
    // Exec protocol
    // ========================================================================
    #[error("Failed to load plugin payload {plugin}: {message}")]
    PayloadLoad { plugin: String, message: String },

    #[error("Failed to create exec session in {container}: {message}")]
    ExecCreate { container: String, message: String },

    #[error("Exec session in {container} returned no output stream")]
    ExecNoStream { container: String },

    #[error("Exec stream from {container} failed: {message}")]
    ExecStream { container: String, message: String },

    #[error("Exec session in {container} timed out after {secs}s")]
    ExecTimeout { container: String, secs: u64 },

    #[error("No JSON object found in plugin output")]
    NoJsonFound { stdout: String, stderr: String },

    #[error("Failed to parse plugin output as JSON: {message}")]
    JsonParse {
        message: String,
        stdout: String,
        stderr: String,
    },

    #[error("Plugin output is not an operation envelope: {0}")]
    InvalidEnvelope(String),

    // ========================================================================
    // Dispatch
    // ========================================================================
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Unknown operation {operation} for plugin {plugin}")]
    UnknownOperation { plugin: String, operation: String },

    #[error("Invalid options for {operation}: {message}")]
    InvalidOptions { operation: String, message: String },

    // ========================================================================
    // General
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl Error {
    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Resolution(_) => ErrorCode::ResolutionFailed,
            Error::ContainerNotFound { .. } | Error::NoSuchContainer { .. } => {
                ErrorCode::ContainerNotFound
            }
            Error::RuntimeUnavailable(_) => ErrorCode::RuntimeUnavailable,
            Error::ContainerConflict { .. } => ErrorCode::ContainerConflict,
            Error::Runtime { .. } => ErrorCode::RuntimeError,
            Error::Credential(_) => ErrorCode::CredentialsUnavailable,
            Error::ProbeTimeout { .. } => ErrorCode::ProbeTimeout,
            Error::PayloadLoad { .. } => ErrorCode::PayloadLoadFailed,
            Error::ExecCreate { .. } => ErrorCode::ExecCreateFailed,
            Error::ExecNoStream { .. } => ErrorCode::ExecNoStream,
            Error::ExecStream { .. } => ErrorCode::ExecStreamError,
            Error::ExecTimeout { .. } => ErrorCode::ExecTimeout,
            Error::NoJsonFound { .. } => ErrorCode::PluginOutputNoJson,
            Error::JsonParse { .. } => ErrorCode::PluginOutputInvalidJson,
            Error::InvalidEnvelope(_) => ErrorCode::PluginOutputInvalidEnvelope,
            Error::PluginNotFound(_) => ErrorCode::PluginNotFound,
            Error::UnknownOperation { .. } => ErrorCode::UnknownOperation,
            Error::InvalidOptions { .. } => ErrorCode::InvalidOptions,
            Error::Config(_) => ErrorCode::ConfigError,
            Error::Io(_) => ErrorCode::IoError,
            Error::Json(_) | Error::Http(_) => ErrorCode::InternalError,
        }
    }

    /// Diagnostics attached to a failed envelope
    ///
    /// Always carries `cause` (the code of this error). Runtime and exec
    /// errors add the container name, protocol errors add the cleaned
    /// stdout and raw stderr of the plugin payload.
    pub fn details(&self) -> Value {
        let mut details = json!({ "cause": self.code().as_str() });
        let extra = match self {
            Error::ContainerNotFound { target, candidates } => {
                json!({ "target": target, "candidates": candidates })
            }
            Error::NoSuchContainer { container }
            | Error::ContainerConflict { container }
            | Error::Runtime { container, .. }
            | Error::ExecCreate { container, .. }
            | Error::ExecNoStream { container }
            | Error::ExecStream { container, .. }
            | Error::ExecTimeout { container, .. } => json!({ "container": container }),
            Error::NoJsonFound { stdout, stderr } | Error::JsonParse { stdout, stderr, .. } => {
                json!({ "stdout": stdout, "stderr": stderr })
            }
            Error::UnknownOperation { plugin, operation } => {
                json!({ "plugin": plugin, "operation": operation })
            }
            _ => Value::Null,
        };
        if let (Value::Object(target), Value::Object(extra)) = (&mut details, extra) {
            target.extend(extra);
        }
        details
    }

    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProbeTimeout { .. }
                | Error::ExecTimeout { .. }
                | Error::RuntimeUnavailable(_)
                | Error::Http(_)
        )
    }

    /// Runtime error helper
    pub fn runtime(container: impl Into<String>, message: impl ToString) -> Self {
        Error::Runtime {
            container: container.into(),
            message: message.to_string(),
        }
    }

    /// Invalid options helper
    pub fn invalid_options(operation: impl Into<String>, message: impl ToString) -> Self {
        Error::InvalidOptions {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}
