//! Watcher configuration.
//!
//! The process is configured entirely through environment variables; see
//! [`WatchConfig::from_env`]. Loading is a pure function of a key lookup so
//! tests can supply their own environment.

pub mod env;
pub mod reference;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::WatcherError;

pub use reference::{parse_image_base, ArtifactReference};

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default directory holding the last-seen marker.
pub const DEFAULT_STATE_DIR: &str = "/tmp/kyverno-watcher";

/// Name of the marker file inside the state directory.
pub const LAST_SEEN_FILE: &str = "last_seen";

/// Default GitHub REST API base URL.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Which registry the artifact lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// GHCR, versions resolved through the GitHub Packages API.
    GitHub,
    /// Artifactory (or any OCI registry), version taken from the reference tag.
    Artifactory,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::GitHub => write!(f, "github"),
            Provider::Artifactory => write!(f, "artifactory"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = WatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "github" => Ok(Provider::GitHub),
            "artifactory" => Ok(Provider::Artifactory),
            other => Err(WatcherError::Config(format!(
                "Unsupported PROVIDER: {} (must be 'github' or 'artifactory')",
                other
            ))),
        }
    }
}

/// Path segment used by the GitHub Packages API for the package owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnerType {
    #[default]
    Users,
    Orgs,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Users => "users",
            OwnerType::Orgs => "orgs",
        }
    }
}

impl std::fmt::Display for OwnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OwnerType {
    type Err = WatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "users" => Ok(OwnerType::Users),
            "orgs" => Ok(OwnerType::Orgs),
            other => Err(WatcherError::Config(format!(
                "Unsupported GITHUB_API_OWNER_TYPE: {} (must be 'users' or 'orgs')",
                other
            ))),
        }
    }
}

/// Provider-specific credentials. Exactly one set exists per process.
#[derive(Debug)]
pub enum Credentials {
    GitHubToken(SecretString),
    Basic {
        username: String,
        password: SecretString,
    },
}

/// External command used to apply one manifest file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyCommand {
    pub program: String,
    /// Arguments placed before the file path.
    pub args: Vec<String>,
}

impl Default for ApplyCommand {
    fn default() -> Self {
        Self {
            program: "kubectl".to_string(),
            args: vec!["apply".to_string(), "-f".to_string()],
        }
    }
}

impl ApplyCommand {
    /// Parses a whitespace-separated command line such as `kubectl apply -f`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Renders the full invocation for one file, for logging.
    pub fn display_for(&self, file: &std::path::Path) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push(' ');
        line.push_str(&file.display().to_string());
        line
    }
}

/// Immutable configuration for one watcher process.
#[derive(Debug)]
pub struct WatchConfig {
    pub provider: Provider,
    pub reference: ArtifactReference,
    pub credentials: Credentials,
    pub poll_interval: Duration,
    pub owner_type: OwnerType,
    pub github_api_url: String,
    pub state_dir: PathBuf,
    /// Parent directory for pulled artifacts.
    pub work_dir: PathBuf,
    pub apply_command: ApplyCommand,
    pub http_timeout: Option<Duration>,
    pub apply_timeout: Option<Duration>,
}

impl WatchConfig {
    /// Path of the persisted last-seen marker.
    pub fn last_seen_path(&self) -> PathBuf {
        self.state_dir.join(LAST_SEEN_FILE)
    }

    /// Logs the effective configuration without secrets.
    pub fn trace_loaded(&self) {
        log::info!(
            "Loaded config: provider={}, image={}, poll_interval={}s, state_dir={}, work_dir={}",
            self.provider,
            self.reference,
            self.poll_interval.as_secs(),
            self.state_dir.display(),
            self.work_dir.display()
        );
        if self.provider == Provider::GitHub {
            log::info!(
                "GitHub package: owner={}, package={}, owner_type={}",
                self.reference.owner(),
                self.reference.package(),
                self.owner_type
            );
        }
    }
}
