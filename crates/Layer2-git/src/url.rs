//! Git URL parsing and normalization
//!
//! Supports:
//! - SCP-like shorthand: `git@host:owner/repo.git`
//! - SSH protocol: `ssh://git@host[:port]/owner/repo.git`
//! - HTTP/HTTPS: `https://[user[:pass]@]host/owner/repo.git`
//! - Git protocol: `git://host/owner/repo.git`

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Host and path pieces of a remote repository URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    /// Lowercased hostname, without port or credentials
    pub host: String,
    /// Everything between host and repo (may contain `/` for subgroups)
    pub owner: String,
    /// Repository name without `.git`
    pub repo: String,
}

impl RepoCoordinates {
    /// `owner/repo`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

fn scp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[^@/\s]+@)?([^:/\s]+):(.+)$").expect("static regex is valid")
    })
}

fn scheme_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?i)(https?|ssh|git)://(?:[^@/]+@)?([^/:]+)(?::\d+)?/(.+)$")
            .expect("static regex is valid")
    })
}

fn shorthand_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@/\s:]+@[^:/\s]+:.+$").expect("static regex is valid"))
}

/// `http(s)://`, `ssh://`, `git://` or `user@host:path`
pub fn is_remote_url(s: &str) -> bool {
    let s = s.trim();
    scheme_regex().is_match(s) || shorthand_regex().is_match(s)
}

/// Absolute filesystem path or `file:` URL
pub fn is_local_path(s: &str) -> bool {
    let s = s.trim();
    if s.starts_with("file:") {
        return true;
    }
    if Path::new(s).is_absolute() {
        return true;
    }
    // Windows drive paths are absolute regardless of the host platform
    let bytes = s.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Filesystem path behind a local target (`file://` prefix stripped)
pub fn local_path(s: &str) -> PathBuf {
    let s = s.trim();
    let stripped = s
        .strip_prefix("file://")
        .or_else(|| s.strip_prefix("file:"))
        .unwrap_or(s);
    PathBuf::from(stripped)
}

/// Split a remote URL into host / owner / repo
pub fn parse_repo_url(url: &str) -> Option<RepoCoordinates> {
    let url = url.trim();
    let (host, path) = if let Some(caps) = scheme_regex().captures(url) {
        (caps.get(2)?.as_str(), caps.get(3)?.as_str())
    } else if url.contains("://") {
        return None;
    } else {
        let caps = scp_regex().captures(url)?;
        (caps.get(1)?.as_str(), caps.get(2)?.as_str())
    };

    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let (repo, owner) = segments.split_last()?;
    if owner.is_empty() {
        return None;
    }

    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if repo.is_empty() {
        return None;
    }

    Some(RepoCoordinates {
        host: host.to_ascii_lowercase(),
        owner: owner.join("/"),
        repo: repo.to_string(),
    })
}

/// Canonical https-style key used for the privacy cache
///
/// `git@github.com:Org/Repo.git` and `https://github.com/Org/Repo` both
/// become `https://github.com/Org/Repo`.
pub fn normalize_repo_url(url: &str) -> String {
    match parse_repo_url(url) {
        Some(coords) => format!("https://{}/{}/{}", coords.host, coords.owner, coords.repo),
        None => {
            let trimmed = url.trim().trim_end_matches('/');
            trimmed.strip_suffix(".git").unwrap_or(trimmed).to_string()
        }
    }
}

/// SSH form used when probing with a key
///
/// SSH URLs pass through untouched; http(s)/git URLs are rewritten to
/// `git@host:owner/repo.git`.
pub fn to_ssh_url(url: &str) -> String {
    let trimmed = url.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("ssh://") || shorthand_regex().is_match(trimmed) {
        return trimmed.to_string();
    }
    match parse_repo_url(trimmed) {
        Some(coords) => format!("git@{}:{}/{}.git", coords.host, coords.owner, coords.repo),
        None => trimmed.to_string(),
    }
}
