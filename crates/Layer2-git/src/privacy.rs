//! Repository privacy lookups against hosting provider APIs
//!
//! Only used for hosts with a known metadata endpoint; everything else goes
//! through an anonymous `git ls-remote` probe in the credential manager.

use crate::url::RepoCoordinates;
use chrono::{DateTime, Utc};
use ignite_foundation::{CredentialConfig, Error, Result};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// How a privacy verdict was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyMethod {
    Api,
    Probe,
}

/// Cached privacy verdict for one normalized repository URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoPrivacyInfo {
    /// `None` when neither the API nor the probe could decide
    pub is_public: Option<bool>,
    pub checked_at: DateTime<Utc>,
    pub method: PrivacyMethod,
}

/// Hosting providers with a metadata endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostingProvider {
    GitHub,
    GitLab,
    Bitbucket,
}

impl HostingProvider {
    pub fn from_host(host: &str) -> Option<Self> {
        match host.trim_start_matches("www.") {
            "github.com" => Some(Self::GitHub),
            "gitlab.com" => Some(Self::GitLab),
            "bitbucket.org" => Some(Self::Bitbucket),
            _ => None,
        }
    }
}

/// Outcome of one API lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVerdict {
    Public,
    Private,
}

/// Thin client over the provider metadata endpoints
pub struct HostingApi {
    client: reqwest::Client,
    github: String,
    gitlab: String,
    bitbucket: String,
}

impl HostingApi {
    pub fn new(config: &CredentialConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.api_timeout())
            .connect_timeout(config.api_timeout().min(Duration::from_secs(3)))
            .user_agent(concat!("ignite/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            github: config.github_api_url.trim_end_matches('/').to_string(),
            gitlab: config.gitlab_api_url.trim_end_matches('/').to_string(),
            bitbucket: config.bitbucket_api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn supports(&self, coords: &RepoCoordinates) -> bool {
        HostingProvider::from_host(&coords.host).is_some()
    }

    fn endpoint(&self, provider: HostingProvider, coords: &RepoCoordinates) -> String {
        match provider {
            HostingProvider::GitHub => {
                format!("{}/repos/{}/{}", self.github, coords.owner, coords.repo)
            }
            HostingProvider::GitLab => format!(
                "{}/projects/{}",
                self.gitlab,
                coords.full_name().replace('/', "%2F")
            ),
            HostingProvider::Bitbucket => format!(
                "{}/repositories/{}/{}",
                self.bitbucket, coords.owner, coords.repo
            ),
        }
    }

    /// Ask the provider whether the repository is private
    ///
    /// `Ok(None)` means the host has no known API or the API gave no usable
    /// answer (rate limit, network error); the caller should probe instead.
    /// A 404 is reported as private: providers hide private repositories
    /// from anonymous callers behind the same status as missing ones.
    pub async fn lookup(&self, coords: &RepoCoordinates) -> Result<Option<ApiVerdict>> {
        let Some(provider) = HostingProvider::from_host(&coords.host) else {
            return Ok(None);
        };
        let url = self.endpoint(provider, coords);
        debug!("Privacy lookup via {:?}: {}", provider, url);

        let response = match self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Hosting API request failed for {}: {}", coords.full_name(), e);
                return Ok(None);
            }
        };

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(Some(ApiVerdict::Private)),
            status if !status.is_success() => {
                warn!(
                    "Hosting API returned {} for {}, falling back to probe",
                    status,
                    coords.full_name()
                );
                return Ok(None);
            }
            _ => {}
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("invalid hosting API response: {}", e)))?;
        Ok(parse_verdict(provider, &body))
    }
}

/// Read the provider-specific privacy flag
pub fn parse_verdict(provider: HostingProvider, body: &Value) -> Option<ApiVerdict> {
    let private = match provider {
        HostingProvider::GitHub => body.get("private")?.as_bool()?,
        HostingProvider::GitLab => body.get("visibility")?.as_str()? != "public",
        HostingProvider::Bitbucket => body.get("is_private")?.as_bool()?,
    };
    Some(if private {
        ApiVerdict::Private
    } else {
        ApiVerdict::Public
    })
}
