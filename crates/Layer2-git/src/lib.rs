//! # ignite-git
//!
//! Git credential subsystem for Ignite.
//!
//! ## Features
//!
//! - Host SSH key discovery (one scan per run, shared by concurrent callers)
//! - Per-repository key testing with forced-identity `git ls-remote`
//! - Public/private classification via hosting APIs or anonymous probes
//! - Session and privacy caches with explicit invalidation
//! - In-memory key material for container injection

pub mod credentials;
pub mod keys;
pub mod privacy;
pub mod probe;
pub mod url;

pub use credentials::{GitCredentialManager, SessionKeyEntry, SshCredentials, CONTAINER_KEY_PATH};
pub use keys::{SshKeyInfo, SshKeyType};
pub use privacy::{ApiVerdict, HostingApi, HostingProvider, PrivacyMethod, RepoPrivacyInfo};
pub use probe::{forced_identity_ssh_command, CommandGitProbe, GitProbe, ProbeOutput};
pub use url::{
    is_local_path, is_remote_url, local_path, normalize_repo_url, parse_repo_url, to_ssh_url,
    RepoCoordinates,
};
