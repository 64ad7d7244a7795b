//! External git / ssh probes
//!
//! Every probe shells out (`git ls-remote`, `git config`, `ssh-keygen`) under
//! a hard timeout; the child is killed when the timeout fires. Nothing here
//! touches host SSH state.

use async_trait::async_trait;
use ignite_foundation::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Connect timeout handed to ssh for every keyed probe and injected command
pub const SSH_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Captured result of one probe process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ProbeOutput {
    pub fn has_output(&self) -> bool {
        !self.stdout.trim().is_empty()
    }

    /// stderr looks like git/ssh refused us for lack of credentials
    pub fn is_auth_failure(&self) -> bool {
        const MARKERS: &[&str] = &[
            "authentication failed",
            "could not read username",
            "could not read password",
            "terminal prompts disabled",
            "permission denied",
            "repository not found",
            "access denied",
            "invalid username or password",
            // curl-style HTTP status reports
            "returned error: 401",
            "returned error: 403",
            "http 401",
            "http 403",
        ];
        let stderr = self.stderr.to_ascii_lowercase();
        MARKERS.iter().any(|marker| stderr.contains(marker))
    }
}

/// Probe seam; the credential manager only talks to git/ssh through this
#[async_trait]
pub trait GitProbe: Send + Sync {
    /// `git ls-remote --heads` with `key_path` forced as the only identity
    async fn ls_remote_with_key(&self, ssh_url: &str, key_path: &Path) -> Result<ProbeOutput>;

    /// `git ls-remote --heads` without any credentials or prompts
    async fn ls_remote_anonymous(&self, url: &str) -> Result<ProbeOutput>;

    /// `remote.origin.url` of a local checkout, if configured
    async fn remote_url(&self, repo_path: &Path) -> Result<Option<String>>;

    /// `ssh-keygen -lf` fingerprint of a public key
    async fn fingerprint(&self, public_key_path: &Path) -> Option<String>;
}

/// ssh invocation that can only ever use `key_path`
///
/// Agent and default identity files disabled, host-key checking disabled,
/// short connect timeout, no interactive prompts.
pub fn forced_identity_ssh_command(key_path: &str) -> String {
    let quoted = shlex::try_quote(key_path)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| key_path.to_string());
    format!(
        "ssh -i {} -o IdentitiesOnly=yes -o IdentityAgent=none -o StrictHostKeyChecking=no \
         -o UserKnownHostsFile=/dev/null -o ConnectTimeout={} -o BatchMode=yes",
        quoted, SSH_CONNECT_TIMEOUT_SECS
    )
}

/// Probe backed by the host's `git` and `ssh-keygen` binaries
pub struct CommandGitProbe {
    git: PathBuf,
    ssh_keygen: PathBuf,
    timeout: Duration,
}

impl CommandGitProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            git: which::which("git").unwrap_or_else(|_| PathBuf::from("git")),
            ssh_keygen: which::which("ssh-keygen").unwrap_or_else(|_| PathBuf::from("ssh-keygen")),
            timeout,
        }
    }

    fn git_command(&self) -> Command {
        let mut cmd = Command::new(&self.git);
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "")
            .env("SSH_ASKPASS", "")
            .env_remove("SSH_AUTH_SOCK");
        cmd
    }

    async fn run(&self, mut cmd: Command, what: &str) -> Result<ProbeOutput> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::ProbeTimeout {
                what: what.to_string(),
                secs: self.timeout.as_secs(),
            })??;

        let result = ProbeOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(probe = what, success = result.success, "probe finished");
        Ok(result)
    }
}

#[async_trait]
impl GitProbe for CommandGitProbe {
    async fn ls_remote_with_key(&self, ssh_url: &str, key_path: &Path) -> Result<ProbeOutput> {
        let mut cmd = self.git_command();
        cmd.env(
            "GIT_SSH_COMMAND",
            forced_identity_ssh_command(&key_path.to_string_lossy()),
        )
        .args(["ls-remote", "--heads", ssh_url]);
        self.run(cmd, "ls-remote (keyed)").await
    }

    async fn ls_remote_anonymous(&self, url: &str) -> Result<ProbeOutput> {
        let mut cmd = self.git_command();
        cmd.env(
            "GIT_SSH_COMMAND",
            format!(
                "ssh -o IdentitiesOnly=yes -o IdentityAgent=none -o StrictHostKeyChecking=no \
                 -o UserKnownHostsFile=/dev/null -o ConnectTimeout={} -o BatchMode=yes",
                SSH_CONNECT_TIMEOUT_SECS
            ),
        )
        .args(["-c", "credential.helper=", "ls-remote", "--heads", url]);
        self.run(cmd, "ls-remote (anonymous)").await
    }

    async fn remote_url(&self, repo_path: &Path) -> Result<Option<String>> {
        let mut cmd = self.git_command();
        cmd.arg("-C")
            .arg(repo_path)
            .args(["config", "--get", "remote.origin.url"]);
        let output = self.run(cmd, "git config remote.origin.url").await?;
        let url = output.stdout.trim();
        Ok((output.success && !url.is_empty()).then(|| url.to_string()))
    }

    async fn fingerprint(&self, public_key_path: &Path) -> Option<String> {
        let mut cmd = Command::new(&self.ssh_keygen);
        cmd.arg("-lf").arg(public_key_path);
        let output = self.run(cmd, "ssh-keygen -lf").await.ok()?;
        if !output.success {
            return None;
        }
        // "256 SHA256:abc... comment (ED25519)"
        output
            .stdout
            .split_whitespace()
            .nth(1)
            .map(|fp| fp.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stderr(text: &str) -> ProbeOutput {
        ProbeOutput {
            success: false,
            stdout: String::new(),
            stderr: text.into(),
        }
    }

    #[test]
    fn test_auth_failure_http_status() {
        assert!(stderr(
            "fatal: unable to access 'https://git.example.com/a/b/': The requested URL returned error: 403"
        )
        .is_auth_failure());
        assert!(stderr("remote: HTTP 401 Unauthorized").is_auth_failure());
    }

    #[test]
    fn test_auth_failure_ignores_bare_numbers() {
        assert!(!stderr("ssh: connect to host git.example.com port 4031: Connection refused")
            .is_auth_failure());
        assert!(!stderr("error: RPC failed; received 14013 bytes").is_auth_failure());
    }

    #[test]
    fn test_forced_identity_command() {
        let cmd = forced_identity_ssh_command("/home/me/.ssh/id_ed25519");
        assert!(cmd.starts_with("ssh -i /home/me/.ssh/id_ed25519 "));
        assert!(cmd.contains("IdentitiesOnly=yes"));
        assert!(cmd.contains("IdentityAgent=none"));
        assert!(cmd.contains("StrictHostKeyChecking=no"));
        assert!(cmd.contains("BatchMode=yes"));
        assert!(cmd.contains("ConnectTimeout=5"));
    }

    #[test]
    fn test_forced_identity_command_quotes_spaces() {
        let cmd = forced_identity_ssh_command("/home/me/my keys/id_rsa");
        assert!(
            cmd.contains("'/home/me/my keys/id_rsa'") || cmd.contains("\"/home/me/my keys/id_rsa\"")
        );
    }

    #[test]
    fn test_auth_failure_detection() {
        let denied = ProbeOutput {
            success: false,
            stdout: String::new(),
            stderr: "fatal: could not read Username for 'https://github.com': terminal prompts disabled".into(),
        };
        assert!(denied.is_auth_failure());

        let dns = ProbeOutput {
            success: false,
            stdout: String::new(),
            stderr: "fatal: unable to access: Could not resolve host: nowhere.invalid".into(),
        };
        assert!(!dns.is_auth_failure());
    }
}
