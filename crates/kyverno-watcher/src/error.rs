//! Error types for the watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while watching, pulling and applying an artifact.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Registry protocol error: {0}")]
    Protocol(String),

    #[error("Failed to parse manifest '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize YAML: {0}")]
    SerializeYaml(String),

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare directory '{path}': {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk directory '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Apply command failed for '{path}': {message}")]
    Apply { path: PathBuf, message: String },
}

impl WatcherError {
    /// Returns true if the error must stop the process.
    ///
    /// Only configuration problems are fatal; everything else is retried on
    /// the next poll.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatcherError::Config(_))
    }
}

/// Classifies a registry client error message into a more specific variant.
///
/// Status codes only count as whole tokens, so digests such as
/// `sha256:4010abcd` never match `401`.
pub fn classify_registry_error(message: &str) -> WatcherError {
    let lower = message.to_lowercase();
    let has_status = |code: &str| {
        lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| token == code)
    };

    if lower.contains("unauthorized")
        || lower.contains("authentication")
        || lower.contains("denied")
        || has_status("401")
        || has_status("403")
    {
        return WatcherError::Auth(message.trim().to_string());
    }

    if lower.contains("not found")
        || lower.contains("manifest unknown")
        || lower.contains("name unknown")
        || has_status("404")
    {
        return WatcherError::NotFound(message.trim().to_string());
    }

    WatcherError::Protocol(message.trim().to_string())
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;
