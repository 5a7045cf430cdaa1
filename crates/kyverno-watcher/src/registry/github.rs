//! Version resolution through the GitHub Packages REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::VersionResolver;
use crate::config::{ArtifactReference, OwnerType};
use crate::error::{Result, WatcherError};

/// Maximum length of a response body quoted in an error message.
const MAX_ERROR_BODY_LENGTH: usize = 200;

const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

/// One entry of `GET /{owner_type}/{owner}/packages/container/{package}/versions`.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageVersion {
    pub id: i64,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub metadata: PackageMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageMetadata {
    #[serde(default)]
    pub container: ContainerMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PackageVersion {
    /// The first tag, or `version-id-<id>` for untagged versions.
    pub fn identifier(&self) -> String {
        match self.metadata.container.tags.first() {
            Some(tag) => tag.clone(),
            None => format!("version-id-{}", self.id),
        }
    }
}

/// Error payload returned by the GitHub API.
#[derive(Debug, Default, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

/// Picks the most recently updated version. Ties keep the earliest entry.
pub fn select_latest(versions: &[PackageVersion]) -> Option<&PackageVersion> {
    let mut latest = versions.first()?;
    for version in versions {
        if version.updated_at > latest.updated_at {
            latest = version;
        }
    }
    Some(latest)
}

/// Resolves the newest package version via the GitHub Packages API.
pub struct GitHubPackagesResolver {
    client: Client,
    api_url: String,
    owner_type: OwnerType,
    reference: ArtifactReference,
    token: SecretString,
}

impl GitHubPackagesResolver {
    pub fn new(
        api_url: impl Into<String>,
        owner_type: OwnerType,
        reference: ArtifactReference,
        token: SecretString,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| WatcherError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            owner_type,
            reference,
            token,
        })
    }

    /// URL of the versions listing for the configured package.
    pub fn versions_url(&self) -> String {
        format!(
            "{}/{}/{}/packages/container/{}/versions",
            self.api_url.trim_end_matches('/'),
            self.owner_type,
            self.reference.owner(),
            self.reference.package_normalized()
        )
    }

    async fn fetch_versions(&self) -> Result<Vec<PackageVersion>> {
        let url = self.versions_url();
        log::debug!("Querying {}", url);

        let response = self
            .client
            .get(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", self.token.expose_secret()),
            )
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .send()
            .await
            .map_err(|e| WatcherError::Protocol(format!("failed to make API request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WatcherError::Protocol(format!("failed to read response body: {}", e)))?;

        parse_versions_response(status, &body, &self.reference, self.owner_type)
    }
}

#[async_trait]
impl VersionResolver for GitHubPackagesResolver {
    async fn resolve(&self) -> Result<Option<String>> {
        let versions = self.fetch_versions().await?;
        log::debug!("GitHub API returned {} package version(s)", versions.len());
        Ok(select_latest(&versions).map(PackageVersion::identifier))
    }
}

/// Interprets a versions listing response.
pub fn parse_versions_response(
    status: StatusCode,
    body: &str,
    reference: &ArtifactReference,
    owner_type: OwnerType,
) -> Result<Vec<PackageVersion>> {
    if status != StatusCode::OK {
        let api_message = serde_json::from_str::<ApiMessage>(body)
            .unwrap_or_default()
            .message;

        return Err(match status {
            StatusCode::UNAUTHORIZED => WatcherError::Auth(
                "authentication failed (401): invalid or expired GITHUB_TOKEN".to_string(),
            ),
            StatusCode::FORBIDDEN => WatcherError::Auth(format!(
                "access forbidden (403): token may lack required permissions (read:packages). Message: {}",
                api_message
            )),
            StatusCode::NOT_FOUND => WatcherError::NotFound(format!(
                "package not found (404): owner={}, package={} (owner type: {}). Verify package exists and token has access",
                reference.owner(),
                reference.package(),
                owner_type
            )),
            other => WatcherError::Protocol(format!(
                "GitHub API returned status {}: {}",
                other.as_u16(),
                api_message
            )),
        });
    }

    serde_json::from_str(body).map_err(|e| {
        WatcherError::Protocol(format!(
            "failed to parse GitHub API response: {}. Response body: {}",
            e,
            truncate(body)
        ))
    })
}

fn truncate(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}
