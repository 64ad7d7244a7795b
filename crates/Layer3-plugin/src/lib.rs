//! # ignite-plugin
//!
//! Plugin layer for Ignite.
//!
//! - [`RepoManagerHandler`]: container lifecycle and repository operations
//! - [`CompilerHandler`]: toolchain operations inside existing repo containers
//! - [`PluginOrchestrator`]: dispatch table and shutdown

pub mod handler;
pub mod locks;
pub mod orchestrator;

pub use handler::{
    CleanupResult, CompilerHandler, HandlerContext, MountResult, RepoInfo, RepoManagerHandler,
    UnmountResult,
};
pub use locks::KeyedLocks;
pub use orchestrator::{Plugin, PluginOrchestrator, DEFAULT_REPO_MANAGER_ID};
