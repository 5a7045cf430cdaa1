//! Loading [`WatchConfig`] from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::{
    ApplyCommand, ArtifactReference, Credentials, OwnerType, Provider, WatchConfig,
    DEFAULT_GITHUB_API_URL, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_STATE_DIR,
};
use crate::error::{Result, WatcherError};
use crate::sanitize::{strip_non_printable, token_preview};

pub const ENV_PROVIDER: &str = "PROVIDER";
pub const ENV_IMAGE_BASE: &str = "IMAGE_BASE";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_ARTIFACTORY_USERNAME: &str = "ARTIFACTORY_USERNAME";
pub const ENV_ARTIFACTORY_PASSWORD: &str = "ARTIFACTORY_PASSWORD";
pub const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL";
pub const ENV_GITHUB_API_OWNER_TYPE: &str = "GITHUB_API_OWNER_TYPE";
pub const ENV_GITHUB_API_URL: &str = "GITHUB_API_URL";
pub const ENV_STATE_DIR: &str = "STATE_DIR";
pub const ENV_WORK_DIR: &str = "WORK_DIR";
pub const ENV_APPLY_COMMAND: &str = "APPLY_COMMAND";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";
pub const ENV_APPLY_TIMEOUT_SECS: &str = "APPLY_TIMEOUT_SECS";

impl WatchConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let provider: Provider = get(ENV_PROVIDER)
            .unwrap_or_else(|| "github".to_string())
            .parse()?;

        let image_base = get(ENV_IMAGE_BASE).ok_or_else(|| {
            WatcherError::Config(
                "IMAGE_BASE environment variable must be set (e.g., ghcr.io/owner/package)"
                    .to_string(),
            )
        })?;
        let reference =
            ArtifactReference::parse_for(provider, &image_base).map_err(|e| match e {
                WatcherError::Config(message) => {
                    WatcherError::Config(format!("Failed to parse IMAGE_BASE: {}", message))
                }
                other => other,
            })?;

        let credentials = match provider {
            Provider::GitHub => github_credentials(get(ENV_GITHUB_TOKEN))?,
            Provider::Artifactory => basic_credentials(
                get(ENV_ARTIFACTORY_USERNAME),
                get(ENV_ARTIFACTORY_PASSWORD),
            )?,
        };

        let poll_interval = Duration::from_secs(parse_positive_or_default(
            ENV_POLL_INTERVAL,
            get(ENV_POLL_INTERVAL),
            DEFAULT_POLL_INTERVAL_SECS,
        ));

        let owner_type = match get(ENV_GITHUB_API_OWNER_TYPE) {
            Some(value) => value.parse()?,
            None => OwnerType::default(),
        };

        let github_api_url = get(ENV_GITHUB_API_URL)
            .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let state_dir = get(ENV_STATE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));
        let work_dir = get(ENV_WORK_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        let apply_command = match get(ENV_APPLY_COMMAND) {
            Some(line) => ApplyCommand::parse(&line).ok_or_else(|| {
                WatcherError::Config("APPLY_COMMAND must name a program".to_string())
            })?,
            None => ApplyCommand::default(),
        };

        let http_timeout = optional_secs(ENV_HTTP_TIMEOUT_SECS, get(ENV_HTTP_TIMEOUT_SECS))?;
        let apply_timeout = optional_secs(ENV_APPLY_TIMEOUT_SECS, get(ENV_APPLY_TIMEOUT_SECS))?;

        Ok(WatchConfig {
            provider,
            reference,
            credentials,
            poll_interval,
            owner_type,
            github_api_url,
            state_dir,
            work_dir,
            apply_command,
            http_timeout,
            apply_timeout,
        })
    }
}

fn github_credentials(token: Option<String>) -> Result<Credentials> {
    let token = token.map(|t| t.trim().to_string()).unwrap_or_default();
    if token.is_empty() {
        return Err(WatcherError::Config(
            "GITHUB_TOKEN environment variable must be set".to_string(),
        ));
    }

    let token = strip_non_printable(&token);
    if token.is_empty() {
        return Err(WatcherError::Config(
            "GITHUB_TOKEN contains only invalid characters".to_string(),
        ));
    }

    log::info!(
        "Using GitHub token: {} (length: {})",
        token_preview(&token),
        token.len()
    );
    Ok(Credentials::GitHubToken(SecretString::from(token)))
}

fn basic_credentials(username: Option<String>, password: Option<String>) -> Result<Credentials> {
    let username = username.map(|u| u.trim().to_string()).unwrap_or_default();
    let password = password.map(|p| p.trim().to_string()).unwrap_or_default();

    if username.is_empty() || password.is_empty() {
        return Err(WatcherError::Config(
            "ARTIFACTORY_USERNAME and ARTIFACTORY_PASSWORD environment variables must be set for artifactory provider"
                .to_string(),
        ));
    }

    log::info!("Using Artifactory with username: {}", username);
    Ok(Credentials::Basic {
        username,
        password: SecretString::from(password),
    })
}

/// Parses a positive integer, falling back to `default` on absence or garbage.
fn parse_positive_or_default(key: &str, value: Option<String>, default: u64) -> u64 {
    match value {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => {
                log::warn!("Invalid {} '{}', using default of {}", key, raw, default);
                default
            }
        },
    }
}

fn optional_secs(key: &str, value: Option<String>) -> Result<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(n) if n > 0 => Ok(Some(Duration::from_secs(n))),
            _ => Err(WatcherError::Config(format!(
                "{} must be a positive number of seconds, got: {}",
                key, raw
            ))),
        },
    }
}
