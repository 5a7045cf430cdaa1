//! Kubernetes manifest handling: discovery and provenance labels.

pub mod annotate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Result, WatcherError};

pub use annotate::{add_labels_to_yaml, Annotator, ManifestAnnotator};

/// Label identifying this agent as the manager of an applied resource.
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Value stored under [`MANAGED_BY_LABEL`].
pub const MANAGED_BY_VALUE: &str = "kyverno-watcher";

/// Label recording the artifact version a resource came from.
pub const POLICY_VERSION_LABEL: &str = "policy-version";

/// One Kubernetes object as found in a pulled file.
///
/// Only the fields the watcher touches are typed. Everything else is kept in
/// `extra` so that re-serializing never drops content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub api_version: String,

    pub kind: String,

    pub metadata: ManifestMetadata,

    /// Opaque resource specification, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_yaml::Mapping>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Object metadata, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Empty when the document only sets `generateName`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Annotations, owner references and other metadata we do not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Returns true for `.yaml` / `.yml` files, in any letter case.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

/// Recursively lists YAML files below `dir`, sorted by path.
///
/// Fails only if the directory itself cannot be walked.
pub fn find_yaml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| WatcherError::Walk {
            path: dir.to_path_buf(),
            source: e,
        })?;

        if entry.file_type().is_file() && is_yaml_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
