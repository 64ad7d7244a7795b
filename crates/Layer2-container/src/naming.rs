//! Repository kind and deterministic container naming
//!
//! Names look like
//! `ignite-<local|cloned>-<slug>-<hash8>-<profile>-<phash6>[-session]`.
//! Everything here is pure: the same input and profile always produce the
//! same name, so a container can be found again without a registry.
//!
//! The profile slug is lossy (case, punctuation, length cap), so the raw
//! profile is hashed as well. A persistent name always ends in that hex
//! hash, which `session` can never be.

use ignite_foundation::{Error, Result};
use ignite_git::{is_local_path, is_remote_url, local_path, parse_repo_url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Container name prefix
pub const NAME_PREFIX: &str = "ignite";

/// Suffix marking an ephemeral instance
pub const SESSION_SUFFIX: &str = "session";

const SLUG_MAX_LEN: usize = 40;
const PROFILE_MAX_LEN: usize = 24;
const HASH_LEN: usize = 8;
const PROFILE_HASH_LEN: usize = 6;

/// Profile used when none is configured
const DEFAULT_PROFILE: &str = "default";

/// Placeholder owner when a remote URL has no parseable owner/repo pair
const UNKNOWN_OWNER: &str = "unknown";

/// Where the repository content of a container comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoContainerKind {
    /// Host directory bind-mounted into the container
    Local,
    /// Repository cloned inside the container
    Cloned,
}

impl RepoContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloned => "cloned",
        }
    }

    /// Value of the `ignite.type` label
    pub fn label_type(&self) -> &'static str {
        match self {
            Self::Local => "local-repo",
            Self::Cloned => "cloned-repo",
        }
    }
}

impl fmt::Display for RepoContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a target by syntax alone
pub fn derive_repo_kind(path_or_url: &str) -> Result<RepoContainerKind> {
    let target = path_or_url.trim();
    if target.is_empty() {
        return Err(Error::Resolution("empty repository target".into()));
    }
    if is_local_path(target) {
        Ok(RepoContainerKind::Local)
    } else if is_remote_url(target) {
        Ok(RepoContainerKind::Cloned)
    } else {
        Err(Error::Resolution(format!(
            "{} is neither an absolute path nor a repository URL",
            target
        )))
    }
}

/// First 8 hex chars of SHA-256 over the original input
pub fn workspace_hash(path_or_url: &str) -> String {
    short_hash(path_or_url, HASH_LEN)
}

fn short_hash(input: &str, len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(len);
    hash
}

/// Deterministic container name for a repository target
pub fn derive_repo_container_name(
    kind: RepoContainerKind,
    path_or_url: &str,
    profile: &str,
    session: bool,
) -> Result<String> {
    let target = path_or_url.trim();
    if target.is_empty() {
        return Err(Error::Resolution("empty repository target".into()));
    }

    let slug = match kind {
        RepoContainerKind::Local => local_slug(target),
        RepoContainerKind::Cloned => cloned_slug(target),
    };
    let profile = match profile.trim() {
        "" => DEFAULT_PROFILE,
        p => p,
    };
    let profile_slug = match slugify(profile, PROFILE_MAX_LEN) {
        p if p.is_empty() => "p".to_string(),
        p => p,
    };

    let mut name = format!(
        "{}-{}-{}-{}-{}-{}",
        NAME_PREFIX,
        kind.as_str(),
        slug,
        workspace_hash(path_or_url),
        profile_slug,
        short_hash(profile, PROFILE_HASH_LEN)
    );
    if session {
        name.push('-');
        name.push_str(SESSION_SUFFIX);
    }
    Ok(name)
}

fn local_slug(target: &str) -> String {
    let path = local_path(target);
    let path = path.to_string_lossy();
    let last = path
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    match slugify(last, SLUG_MAX_LEN) {
        s if s.is_empty() => "root".to_string(),
        s => s,
    }
}

fn cloned_slug(target: &str) -> String {
    let raw = match parse_repo_url(target) {
        Some(coords) => format!("{}-{}", coords.owner, coords.repo),
        None => {
            let trimmed = target.trim_end_matches('/');
            let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
            let last = last.strip_suffix(".git").unwrap_or(last);
            format!("{}-{}", UNKNOWN_OWNER, last)
        }
    };
    match slugify(&raw, SLUG_MAX_LEN) {
        s if s.is_empty() => "repo".to_string(),
        s => s,
    }
}

/// Lowercase, collapse non-alphanumeric runs to `-`, bound the length
pub fn slugify(input: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(max_len);
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !name.contains("--")
    }

    #[test]
    fn test_kind_from_syntax() {
        assert_eq!(derive_repo_kind("/home/me/app").unwrap(), RepoContainerKind::Local);
        assert_eq!(derive_repo_kind("file:///srv/app").unwrap(), RepoContainerKind::Local);
        assert_eq!(
            derive_repo_kind("https://github.com/acme/app.git").unwrap(),
            RepoContainerKind::Cloned
        );
        assert_eq!(
            derive_repo_kind("git@github.com:acme/app.git").unwrap(),
            RepoContainerKind::Cloned
        );
        assert_eq!(
            derive_repo_kind("git://example.org/app").unwrap(),
            RepoContainerKind::Cloned
        );
    }

    #[test]
    fn test_kind_rejects_relative_and_empty() {
        assert!(matches!(derive_repo_kind("relative/dir"), Err(Error::Resolution(_))));
        assert!(matches!(derive_repo_kind("   "), Err(Error::Resolution(_))));
    }

    #[test]
    fn test_kind_is_deterministic() {
        for target in ["/a/b", "ssh://git@host/x/y.git", "git@host:x/y"] {
            assert_eq!(derive_repo_kind(target).unwrap(), derive_repo_kind(target).unwrap());
        }
    }

    #[test]
    fn test_local_name_format() {
        let name =
            derive_repo_container_name(RepoContainerKind::Local, "/home/me/My App", "default", false)
                .unwrap();
        let hash = workspace_hash("/home/me/My App");
        let prefix = format!("ignite-local-my-app-{}-default-", hash);
        assert!(name.starts_with(&prefix), "{}", name);
        assert_eq!(name.len(), prefix.len() + 6);
        assert!(is_valid_name(&name));
    }

    #[test]
    fn test_session_suffix() {
        let name =
            derive_repo_container_name(RepoContainerKind::Local, "/srv/app", "dev", true).unwrap();
        let persistent =
            derive_repo_container_name(RepoContainerKind::Local, "/srv/app", "dev", false).unwrap();
        assert_eq!(name, format!("{}-session", persistent));
    }

    #[test]
    fn test_profiles_differing_in_case_or_punctuation() {
        let name = |profile| {
            derive_repo_container_name(RepoContainerKind::Local, "/srv/app", profile, false)
                .unwrap()
        };
        assert_ne!(name("Work"), name("work"));
        assert_ne!(name("work.laptop"), name("work-laptop"));
        assert_ne!(name("work laptop"), name("work_laptop"));
    }

    #[test]
    fn test_long_profiles_sharing_a_prefix() {
        let a = "a".repeat(24) + "-one";
        let b = "a".repeat(24) + "-two";
        let na = derive_repo_container_name(RepoContainerKind::Local, "/srv/app", &a, false).unwrap();
        let nb = derive_repo_container_name(RepoContainerKind::Local, "/srv/app", &b, false).unwrap();
        assert_ne!(na, nb);
        assert!(is_valid_name(&na));
    }

    #[test]
    fn test_session_suffix_cannot_come_from_a_profile() {
        let session =
            derive_repo_container_name(RepoContainerKind::Local, "/srv/app", "dev", true).unwrap();
        for profile in ["dev-session", "dev session", "Dev-Session"] {
            let persistent =
                derive_repo_container_name(RepoContainerKind::Local, "/srv/app", profile, false)
                    .unwrap();
            assert_ne!(persistent, session);
            assert!(!persistent.ends_with("-session"));
        }
    }

    #[test]
    fn test_same_profile_same_name() {
        let a = derive_repo_container_name(RepoContainerKind::Cloned, "git@h:o/r.git", "Work", true)
            .unwrap();
        let b = derive_repo_container_name(RepoContainerKind::Cloned, "git@h:o/r.git", "Work", true)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cloned_name_uses_owner_and_repo() {
        let name = derive_repo_container_name(
            RepoContainerKind::Cloned,
            "git@github.com:Acme/Contracts.git",
            "default",
            false,
        )
        .unwrap();
        assert!(name.starts_with("ignite-cloned-acme-contracts-"));
        assert!(is_valid_name(&name));
    }

    #[test]
    fn test_cloned_name_without_owner() {
        let name = derive_repo_container_name(
            RepoContainerKind::Cloned,
            "https://example.org/solo.git",
            "default",
            false,
        )
        .unwrap();
        assert!(name.starts_with("ignite-cloned-unknown-solo-"), "{}", name);
    }

    #[test]
    fn test_same_slug_different_hash() {
        let a = derive_repo_container_name(RepoContainerKind::Local, "/one/app", "p", false).unwrap();
        let b = derive_repo_container_name(RepoContainerKind::Local, "/two/app", "p", false).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn test_hash_uses_original_input() {
        // Same repository, different spelling: separate containers
        let a = workspace_hash("https://github.com/acme/app");
        let b = workspace_hash("https://github.com/acme/app.git");
        assert_ne!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_lengths_are_bounded() {
        let long = format!("/tmp/{}", "x".repeat(200));
        let name =
            derive_repo_container_name(RepoContainerKind::Local, &long, &"p".repeat(100), true)
                .unwrap();
        assert!(
            name.len() <= "ignite-local-".len() + 40 + 1 + 8 + 1 + 24 + 1 + 6 + "-session".len()
        );
        assert!(is_valid_name(&name));
    }

    #[test]
    fn test_root_and_empty_profile() {
        let name = derive_repo_container_name(RepoContainerKind::Local, "/", "", false).unwrap();
        assert!(name.starts_with("ignite-local-root-"));
        assert_eq!(
            name,
            derive_repo_container_name(RepoContainerKind::Local, "/", "default", false).unwrap()
        );
        assert!(name.contains("-default-"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello,  World!", 40), "hello-world");
        assert_eq!(slugify("--a--", 40), "a");
        assert_eq!(slugify("abc-def", 4), "abc");
        assert_eq!(slugify("한글", 10), "");
    }
}
