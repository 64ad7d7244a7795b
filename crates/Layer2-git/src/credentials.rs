//! Git Credential Manager
//!
//! Finds an SSH key that actually works for a given repository instead of
//! assuming one global identity:
//!
//! 1. the host key directory is scanned once (single-flight: concurrent
//!    first callers await the same scan);
//! 2. keys are tried in discovery order with `git ls-remote`, the first
//!    one that lists refs is remembered for that exact URL;
//! 3. repositories proven public skip credentials entirely.
//!
//! All state is instance-scoped and process-lifetime; nothing is persisted.

use crate::keys::{discover_keys, SshKeyInfo, SshKeyType};
use crate::privacy::{ApiVerdict, HostingApi, PrivacyMethod, RepoPrivacyInfo};
use crate::probe::{forced_identity_ssh_command, CommandGitProbe, GitProbe};
use crate::url::{is_local_path, local_path, normalize_repo_url, parse_repo_url, to_ssh_url};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use ignite_foundation::{CredentialConfig, Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// In-container path the payload writes the injected key to
pub const CONTAINER_KEY_PATH: &str = "/tmp/.ignite/id_key";

type KeyScan = Shared<BoxFuture<'static, Arc<Vec<SshKeyInfo>>>>;

/// "This key works for this repo URL"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeyEntry {
    pub working_key_path: PathBuf,
    pub tested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CachedPrivacy {
    info: RepoPrivacyInfo,
    fresh_until: Instant,
}

/// Key material ready for injection into a container
///
/// Held in memory only and wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SshCredentials {
    #[zeroize(skip)]
    pub key_path: PathBuf,
    #[zeroize(skip)]
    pub key_type: SshKeyType,
    pub private_key: String,
    pub public_key: String,
}

impl SshCredentials {
    /// `KEY=VALUE` pairs for the exec session environment
    pub fn container_env(&self) -> Vec<String> {
        vec![
            format!("IGNITE_SSH_PRIVATE_KEY={}", self.private_key),
            format!("IGNITE_SSH_PUBLIC_KEY={}", self.public_key),
            format!("IGNITE_SSH_KEY_PATH={}", CONTAINER_KEY_PATH),
            format!(
                "GIT_SSH_COMMAND={}",
                forced_identity_ssh_command(CONTAINER_KEY_PATH)
            ),
            "GIT_TERMINAL_PROMPT=0".to_string(),
        ]
    }
}

impl fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCredentials")
            .field("key_path", &self.key_path)
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

pub struct GitCredentialManager {
    ssh_dir: Option<PathBuf>,
    probe: Arc<dyn GitProbe>,
    api: Option<HostingApi>,
    privacy_ttl: Duration,
    scan: Mutex<Option<KeyScan>>,
    session_keys: RwLock<HashMap<String, SessionKeyEntry>>,
    privacy: RwLock<HashMap<String, CachedPrivacy>>,
}

impl GitCredentialManager {
    /// Manager backed by the host's git binary and the hosting APIs
    pub fn new(config: &CredentialConfig) -> Result<Self> {
        let probe = Arc::new(CommandGitProbe::new(config.probe_timeout()));
        Ok(Self::with_probe(config.ssh_dir(), probe, config.privacy_ttl())
            .with_hosting_api(HostingApi::new(config)?))
    }

    /// Manager with a custom probe and no hosting API
    pub fn with_probe(
        ssh_dir: Option<PathBuf>,
        probe: Arc<dyn GitProbe>,
        privacy_ttl: Duration,
    ) -> Self {
        Self {
            ssh_dir,
            probe,
            api: None,
            privacy_ttl,
            scan: Mutex::new(None),
            session_keys: RwLock::new(HashMap::new()),
            privacy: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_hosting_api(mut self, api: HostingApi) -> Self {
        self.api = Some(api);
        self
    }

    // ========================================================================
    // Key discovery
    // ========================================================================

    /// Discovered keys; the first call triggers the one and only scan
    pub async fn discovered_keys(&self) -> Arc<Vec<SshKeyInfo>> {
        let scan = {
            let mut slot = self.scan.lock();
            slot.get_or_insert_with(|| {
                let probe = Arc::clone(&self.probe);
                match self.ssh_dir.clone() {
                    Some(dir) => {
                        info!("Scanning SSH keys in {}", dir.display());
                        async move { Arc::new(discover_keys(dir, probe).await) }
                            .boxed()
                            .shared()
                    }
                    None => {
                        warn!("No SSH key directory available");
                        futures::future::ready(Arc::new(Vec::new())).boxed().shared()
                    }
                }
            })
            .clone()
        };
        scan.await
    }

    /// Alias kept for callers that only need to make sure the scan ran
    pub async fn initialize(&self) {
        let keys = self.discovered_keys().await;
        debug!("{} SSH key(s) available", keys.len());
    }

    /// Forget the key list; the next lookup scans again
    ///
    /// Session entries for keys that disappear are dropped lazily by
    /// the validity check in [`find_working_ssh_key`](Self::find_working_ssh_key).
    pub fn rescan_keys(&self) {
        *self.scan.lock() = None;
    }

    // ========================================================================
    // Working key lookup
    // ========================================================================

    /// First non-encrypted key that can list refs of `repo_url`
    pub async fn find_working_ssh_key(&self, repo_url: &str) -> Option<SshKeyInfo> {
        let keys = self.discovered_keys().await;

        let cached = self.session_keys.read().get(repo_url).cloned();
        if let Some(entry) = cached {
            match keys
                .iter()
                .find(|key| key.key_path == entry.working_key_path && !key.is_encrypted)
            {
                Some(key) => {
                    debug!("Session cache hit for {}", repo_url);
                    return Some(key.clone());
                }
                None => {
                    debug!("Dropping stale session key for {}", repo_url);
                    self.session_keys.write().remove(repo_url);
                }
            }
        }

        let ssh_url = to_ssh_url(repo_url);
        for key in keys.iter().filter(|key| !key.is_encrypted) {
            match self.probe.ls_remote_with_key(&ssh_url, &key.key_path).await {
                Ok(output) if output.has_output() => {
                    info!("SSH key {} works for {}", key.file_name(), repo_url);
                    self.session_keys.write().insert(
                        repo_url.to_string(),
                        SessionKeyEntry {
                            working_key_path: key.key_path.clone(),
                            tested_at: Utc::now(),
                        },
                    );
                    return Some(key.clone());
                }
                Ok(_) => debug!("SSH key {} rejected by {}", key.file_name(), repo_url),
                Err(e) => debug!("SSH key {} probe failed: {}", key.file_name(), e),
            }
        }

        debug!("No working SSH key for {}", repo_url);
        None
    }

    /// True iff some discovered key can reach `repo_url`
    pub async fn has_ssh_credentials_for_repo(&self, repo_url: &str) -> bool {
        self.find_working_ssh_key(repo_url).await.is_some()
    }

    pub fn session_entry(&self, repo_url: &str) -> Option<SessionKeyEntry> {
        self.session_keys.read().get(repo_url).cloned()
    }

    // ========================================================================
    // Privacy
    // ========================================================================

    /// Cached-or-fresh privacy verdict; `None` means undetermined
    pub async fn is_repo_public(&self, repo_url: &str) -> Option<bool> {
        self.repo_privacy(repo_url).await.is_public
    }

    pub async fn repo_privacy(&self, repo_url: &str) -> RepoPrivacyInfo {
        let key = normalize_repo_url(repo_url);

        let cached = self.privacy.read().get(&key).cloned();
        if let Some(cached) = cached {
            if Instant::now() < cached.fresh_until {
                debug!("Privacy cache hit for {}", key);
                return cached.info.clone();
            }
        }

        let info = self.check_privacy(repo_url).await;
        self.privacy.write().insert(
            key,
            CachedPrivacy {
                info: info.clone(),
                fresh_until: Instant::now() + self.privacy_ttl,
            },
        );
        info
    }

    async fn check_privacy(&self, repo_url: &str) -> RepoPrivacyInfo {
        if let (Some(api), Some(coords)) = (&self.api, parse_repo_url(repo_url)) {
            if api.supports(&coords) {
                match api.lookup(&coords).await {
                    Ok(Some(verdict)) => {
                        return RepoPrivacyInfo {
                            is_public: Some(verdict == ApiVerdict::Public),
                            checked_at: Utc::now(),
                            method: PrivacyMethod::Api,
                        };
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Privacy API lookup failed for {}: {}", repo_url, e),
                }
            }
        }

        let is_public = match self.probe.ls_remote_anonymous(repo_url).await {
            Ok(output) if output.success => Some(true),
            Ok(output) if output.is_auth_failure() => Some(false),
            Ok(output) => {
                debug!("Anonymous probe inconclusive for {}: {}", repo_url, output.stderr.trim());
                None
            }
            Err(e) => {
                debug!("Anonymous probe failed for {}: {}", repo_url, e);
                None
            }
        };

        RepoPrivacyInfo {
            is_public,
            checked_at: Utc::now(),
            method: PrivacyMethod::Probe,
        }
    }

    // ========================================================================
    // Container injection
    // ========================================================================

    /// Key material for a path or URL, or `None` when none is needed/found
    ///
    /// Local paths are resolved to their `origin` remote first. Public
    /// repositories need no credentials. Encrypted keys are never returned.
    pub async fn get_ssh_credentials_for_container(
        &self,
        path_or_url: &str,
    ) -> Result<Option<SshCredentials>> {
        let repo_url = if is_local_path(path_or_url) {
            match self.probe.remote_url(&local_path(path_or_url)).await? {
                Some(url) => url,
                None => {
                    debug!("{} has no origin remote, no credentials needed", path_or_url);
                    return Ok(None);
                }
            }
        } else {
            path_or_url.to_string()
        };

        if self.is_repo_public(&repo_url).await == Some(true) {
            debug!("{} is public, skipping credentials", repo_url);
            return Ok(None);
        }

        let Some(key) = self.find_working_ssh_key(&repo_url).await else {
            return Ok(None);
        };
        if key.is_encrypted {
            return Ok(None);
        }

        let private_key = tokio::fs::read_to_string(&key.key_path)
            .await
            .map_err(|e| Error::Credential(format!("cannot read {}: {}", key.key_path.display(), e)))?;
        let public_key = tokio::fs::read_to_string(&key.public_key_path)
            .await
            .map_err(|e| {
                Error::Credential(format!("cannot read {}: {}", key.public_key_path.display(), e))
            })?;

        Ok(Some(SshCredentials {
            key_path: key.key_path,
            key_type: key.key_type,
            private_key,
            public_key,
        }))
    }

    // ========================================================================
    // Cache management
    // ========================================================================

    /// Drop session keys and privacy verdicts (the key list stays)
    pub fn clear_caches(&self) {
        self.session_keys.write().clear();
        self.privacy.write().clear();
    }

    /// Forget everything known about one repository
    pub fn invalidate_repo(&self, repo_url: &str) {
        self.session_keys.write().remove(repo_url);
        self.privacy.write().remove(&normalize_repo_url(repo_url));
    }
}
