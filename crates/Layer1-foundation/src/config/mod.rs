//! Config - 통합 설정 관리
//!
//! - `ignite.rs` - IgniteConfig 통합 설정 (runtime, credentials, plugins)

mod ignite;

pub use ignite::{
    CredentialConfig, IgniteConfig, PluginEntry, PluginType, PluginsConfig, RuntimeConfig,
    IGNITE_CONFIG_FILE, PROFILE_ENV,
};
