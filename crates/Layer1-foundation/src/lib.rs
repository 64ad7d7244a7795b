//! # ignite-foundation
//!
//! Foundation layer for Ignite:
//! - Error: 에러 분류 + 안정적인 에러 코드 (ErrorCode)
//! - Core: 플러그인 작업 envelope (`{success, data}` / `{success, error}`)
//! - Config: 통합 설정 (IgniteConfig - runtime, credentials, plugins)
//! - Storage: JsonStore (글로벌 + 프로젝트 병합)

pub mod config;
pub mod core;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, ErrorCode, Result};

// ============================================================================
// Core (작업 계약)
// ============================================================================
pub use core::{Envelope, ErrorBody, OperationRequest};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    CredentialConfig, IgniteConfig, PluginEntry, PluginType, PluginsConfig, RuntimeConfig,
    IGNITE_CONFIG_FILE, PROFILE_ENV,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::JsonStore;
