//! Hosting API lookups against a local HTTP stub
//!
//! `cargo test -p ignite-git --test privacy_test`

use async_trait::async_trait;
use ignite_foundation::{CredentialConfig, Error, Result};
use ignite_git::url::parse_repo_url;
use ignite_git::{
    ApiVerdict, GitCredentialManager, GitProbe, HostingApi, PrivacyMethod, ProbeOutput,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const REPO: &str = "https://github.com/acme/app";

/// Serve one canned response to every connection, return the base URL
async fn stub_server(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

fn api_for(base: &str) -> HostingApi {
    let config = CredentialConfig {
        github_api_url: base.to_string(),
        ..Default::default()
    };
    HostingApi::new(&config).unwrap()
}

async fn lookup(status: &'static str, body: &'static str) -> Result<Option<ApiVerdict>> {
    let base = stub_server(status, body).await;
    let coords = parse_repo_url(REPO).unwrap();
    api_for(&base).lookup(&coords).await
}

// ============================================================================
// HostingApi::lookup
// ============================================================================

#[tokio::test]
async fn test_not_found_means_private() {
    let verdict = lookup("404 Not Found", r#"{"message":"Not Found"}"#).await;
    assert_eq!(verdict.unwrap(), Some(ApiVerdict::Private));
}

#[tokio::test]
async fn test_public_flag_is_read() {
    let verdict = lookup("200 OK", r#"{"full_name":"acme/app","private":false}"#).await;
    assert_eq!(verdict.unwrap(), Some(ApiVerdict::Public));

    let verdict = lookup("200 OK", r#"{"full_name":"acme/app","private":true}"#).await;
    assert_eq!(verdict.unwrap(), Some(ApiVerdict::Private));
}

#[tokio::test]
async fn test_server_error_is_undecided() {
    let verdict = lookup("500 Internal Server Error", r#"{"message":"boom"}"#).await;
    assert_eq!(verdict.unwrap(), None);

    let verdict = lookup("403 Forbidden", r#"{"message":"API rate limit exceeded"}"#).await;
    assert_eq!(verdict.unwrap(), None);
}

#[tokio::test]
async fn test_malformed_body_is_http_error() {
    let verdict = lookup("200 OK", "<html>not json</html>").await;
    assert!(matches!(verdict, Err(Error::Http(_))), "{:?}", verdict);
}

#[tokio::test]
async fn test_unreachable_api_is_undecided() {
    // bind then drop so the port is closed
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let coords = parse_repo_url(REPO).unwrap();
    assert_eq!(api_for(&base).lookup(&coords).await.unwrap(), None);
}

// ============================================================================
// Manager fallback
// ============================================================================

/// Probe double that only answers the anonymous ls-remote
struct AnonymousProbe {
    output: ProbeOutput,
    calls: AtomicUsize,
}

impl AnonymousProbe {
    fn new(success: bool) -> Arc<Self> {
        Arc::new(Self {
            output: ProbeOutput {
                success,
                stdout: String::new(),
                stderr: String::new(),
            },
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GitProbe for AnonymousProbe {
    async fn ls_remote_with_key(&self, _ssh_url: &str, _key_path: &Path) -> Result<ProbeOutput> {
        Ok(ProbeOutput::default())
    }

    async fn ls_remote_anonymous(&self, _url: &str) -> Result<ProbeOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }

    async fn remote_url(&self, _repo_path: &Path) -> Result<Option<String>> {
        Ok(None)
    }

    async fn fingerprint(&self, _public_key_path: &Path) -> Option<String> {
        None
    }
}

fn manager(base: &str, probe: Arc<AnonymousProbe>) -> GitCredentialManager {
    let dir = std::env::temp_dir().join("ignite-privacy-test-no-keys");
    GitCredentialManager::with_probe(Some(dir), probe, Duration::from_secs(300))
        .with_hosting_api(api_for(base))
}

#[tokio::test]
async fn test_server_error_falls_back_to_anonymous_probe() {
    let base = stub_server("500 Internal Server Error", "{}").await;
    let probe = AnonymousProbe::new(true);
    let creds = manager(&base, probe.clone());

    let info = creds.repo_privacy(REPO).await;
    assert_eq!(info.is_public, Some(true));
    assert_eq!(info.method, PrivacyMethod::Probe);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_body_falls_back_to_anonymous_probe() {
    let base = stub_server("200 OK", "garbage").await;
    let probe = AnonymousProbe::new(true);
    let creds = manager(&base, probe.clone());

    let info = creds.repo_privacy(REPO).await;
    assert_eq!(info.method, PrivacyMethod::Probe);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_api_verdict_skips_probe() {
    let base = stub_server("404 Not Found", "{}").await;
    let probe = AnonymousProbe::new(true);
    let creds = manager(&base, probe.clone());

    let info = creds.repo_privacy(REPO).await;
    assert_eq!(info.is_public, Some(false));
    assert_eq!(info.method, PrivacyMethod::Api);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
}
