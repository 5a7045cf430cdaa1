//! Injection of provenance labels into pulled manifests.

use std::path::Path;

use serde::Deserialize;

use super::{Manifest, MANAGED_BY_LABEL, MANAGED_BY_VALUE, POLICY_VERSION_LABEL};
use crate::error::{Result, WatcherError};

/// Rewrites one manifest file so it carries the watcher's labels.
pub trait Annotator: Send + Sync {
    fn annotate(&self, path: &Path, version: &str) -> Result<()>;
}

/// Annotates YAML files in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestAnnotator;

impl Annotator for ManifestAnnotator {
    fn annotate(&self, path: &Path, version: &str) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| WatcherError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let updated = add_labels_to_yaml(&content, version).map_err(|e| match e {
            WatcherError::Parse { message, .. } => WatcherError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;

        std::fs::write(path, updated).map_err(|e| WatcherError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        log::debug!("Labelled {} with version {}", path.display(), version);
        Ok(())
    }
}

/// Sets the managed-by and policy-version labels on every document in
/// `content` and returns the re-serialized YAML.
///
/// Multi-document files are supported; empty documents are dropped.
/// Any document failing to parse fails the whole file so nothing is
/// half-rewritten.
pub fn add_labels_to_yaml(content: &str, version: &str) -> Result<String> {
    let mut manifests = Vec::new();

    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document).map_err(parse_error)?;
        if value.is_null() {
            continue;
        }

        let mut manifest: Manifest = serde_yaml::from_value(value).map_err(parse_error)?;
        set_labels(&mut manifest, version);
        manifests.push(manifest);
    }

    if manifests.is_empty() {
        return Err(WatcherError::Parse {
            path: Default::default(),
            message: "no YAML documents found".to_string(),
        });
    }

    let mut rendered = Vec::with_capacity(manifests.len());
    for manifest in &manifests {
        rendered.push(
            serde_yaml::to_string(manifest)
                .map_err(|e| WatcherError::SerializeYaml(e.to_string()))?,
        );
    }

    Ok(rendered.join("---\n"))
}

fn set_labels(manifest: &mut Manifest, version: &str) {
    let labels = manifest.metadata.labels.get_or_insert_with(Default::default);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(POLICY_VERSION_LABEL.to_string(), version.to_string());
}

fn parse_error(err: serde_yaml::Error) -> WatcherError {
    WatcherError::Parse {
        path: Default::default(),
        message: err.to_string(),
    }
}
