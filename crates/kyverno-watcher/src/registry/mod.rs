//! Registry access: version resolution and artifact pulling.
//!
//! Two providers are supported:
//! - `github`: versions come from the GitHub Packages API, content is pulled
//!   by walking the image manifest layer by layer
//! - `artifactory`: the version is the configured tag, content is copied blob
//!   by blob into a file store keyed by the blobs' title annotations

pub mod content_copy;
pub mod github;
pub mod layer_walk;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use oci_client::client::ClientConfig;
use oci_client::secrets::RegistryAuth;
use oci_client::{Client, Reference};

use crate::config::ArtifactReference;
use crate::error::{classify_registry_error, Result, WatcherError};

pub use content_copy::ContentCopyPuller;
pub use github::GitHubPackagesResolver;
pub use layer_walk::LayerWalkPuller;

/// Determines the current version identifier of the watched artifact.
#[async_trait]
pub trait VersionResolver: Send + Sync {
    /// Returns `None` when the registry knows no versions yet.
    async fn resolve(&self) -> Result<Option<String>>;
}

/// Retrieves the content of one artifact version into a local directory.
#[async_trait]
pub trait Puller: Send + Sync {
    /// `dest` exists and is empty when this is called.
    async fn pull(&self, version: &str, dest: &Path) -> Result<PullReport>;
}

/// What a pull wrote to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Digest of the manifest that was pulled.
    pub manifest_digest: String,
    /// Files written, in manifest order.
    pub files: Vec<PathBuf>,
}

/// Resolves the version as the tag of the configured reference.
#[derive(Debug, Clone)]
pub struct ReferenceTagResolver {
    reference: ArtifactReference,
}

impl ReferenceTagResolver {
    pub fn new(reference: ArtifactReference) -> Self {
        Self { reference }
    }
}

#[async_trait]
impl VersionResolver for ReferenceTagResolver {
    async fn resolve(&self) -> Result<Option<String>> {
        match self.reference.tag() {
            Some(tag) => Ok(Some(tag.to_string())),
            None => Err(WatcherError::Config(
                "IMAGE_BASE for artifactory must include a tag (e.g., registry/path:tag)"
                    .to_string(),
            )),
        }
    }
}

/// Removes `dest` if present and creates it again, empty.
pub fn prepare_destination(dest: &Path) -> Result<()> {
    if dest.exists() {
        if let Err(e) = std::fs::remove_dir_all(dest) {
            log::warn!("Failed to remove directory {}: {}", dest.display(), e);
        }
    }

    std::fs::create_dir_all(dest).map_err(|e| WatcherError::Directory {
        path: dest.to_path_buf(),
        source: e,
    })
}

/// Annotation carrying a blob's file name.
pub const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// One layer of an artifact manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub media_type: String,
    pub digest: String,
    /// Value of the `org.opencontainers.image.title` annotation.
    pub title: Option<String>,
}

/// An artifact manifest: its digest and layers in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactManifest {
    pub digest: String,
    pub layers: Vec<LayerDescriptor>,
}

/// Fetches manifests and blobs for an image reference.
#[async_trait]
pub trait BlobSource: Send + Sync {
    async fn manifest(&self, image: &str) -> Result<ArtifactManifest>;

    async fn blob(&self, image: &str, digest: &str) -> Result<Vec<u8>>;
}

/// [`BlobSource`] backed by an OCI distribution registry.
pub struct RegistryBlobSource {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryBlobSource {
    pub fn new(auth: RegistryAuth) -> Self {
        Self {
            client: Client::new(ClientConfig::default()),
            auth,
        }
    }
}

#[async_trait]
impl BlobSource for RegistryBlobSource {
    async fn manifest(&self, image: &str) -> Result<ArtifactManifest> {
        let reference = parse_oci_reference(image)?;
        let (manifest, digest) = self
            .client
            .pull_image_manifest(&reference, &self.auth)
            .await
            .map_err(|e| registry_error(&format!("fetching manifest for {}", image), e))?;

        let layers = manifest
            .layers
            .iter()
            .map(|layer| LayerDescriptor {
                media_type: layer.media_type.clone(),
                digest: layer.digest.clone(),
                title: layer
                    .annotations
                    .as_ref()
                    .and_then(|a| a.get(TITLE_ANNOTATION))
                    .cloned(),
            })
            .collect();

        Ok(ArtifactManifest { digest, layers })
    }

    async fn blob(&self, image: &str, digest: &str) -> Result<Vec<u8>> {
        let reference = parse_oci_reference(image)?;
        let mut content = Vec::new();
        self.client
            .pull_blob(&reference, digest, &mut content)
            .await
            .map_err(|e| registry_error(&format!("fetching blob {}", digest), e))?;
        Ok(content)
    }
}

/// Parses a full image reference for the OCI client.
pub(crate) fn parse_oci_reference(image: &str) -> Result<Reference> {
    image.parse::<Reference>().map_err(|e| {
        WatcherError::Protocol(format!("parsing image reference '{}': {}", image, e))
    })
}

/// Maps an OCI client error into the watcher taxonomy, keeping context.
pub(crate) fn registry_error(
    context: &str,
    err: oci_client::errors::OciDistributionError,
) -> WatcherError {
    match classify_registry_error(&err.to_string()) {
        WatcherError::Auth(msg) => WatcherError::Auth(format!("{}: {}", context, msg)),
        WatcherError::NotFound(msg) => WatcherError::NotFound(format!("{}: {}", context, msg)),
        WatcherError::Protocol(msg) => WatcherError::Protocol(format!("{}: {}", context, msg)),
        other => other,
    }
}

/// Writes `content` to `path`, mapping failures to [`WatcherError::WriteFile`].
pub(crate) fn write_blob(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| WatcherError::Directory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, content).map_err(|e| WatcherError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}
