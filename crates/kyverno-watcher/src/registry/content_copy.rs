//! Copies an artifact blob by blob into a directory, naming files after
//! their title annotation.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use oci_client::secrets::RegistryAuth;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tracing::Instrument;

use super::{write_blob, BlobSource, PullReport, Puller, RegistryBlobSource};
use crate::config::ArtifactReference;
use crate::error::{Result, WatcherError};
use crate::manifest::find_yaml_files;

/// Content-addressed puller for Artifactory and other plain OCI registries.
pub struct ContentCopyPuller {
    source: Box<dyn BlobSource>,
    reference: ArtifactReference,
}

impl ContentCopyPuller {
    pub fn new(reference: ArtifactReference, username: String, password: SecretString) -> Self {
        let auth = RegistryAuth::Basic(username, password.expose_secret().to_string());
        Self::with_source(reference, Box::new(RegistryBlobSource::new(auth)))
    }

    pub fn with_source(reference: ArtifactReference, source: Box<dyn BlobSource>) -> Self {
        Self { source, reference }
    }

    fn image_for(&self, version: &str) -> String {
        match self.reference.tag() {
            Some(tag) if tag == version => self.reference.as_str().to_string(),
            _ => self.reference.with_tag(version),
        }
    }
}

#[async_trait]
impl Puller for ContentCopyPuller {
    async fn pull(&self, version: &str, dest: &Path) -> Result<PullReport> {
        let image = self.image_for(version);
        let span = tracing::info_span!("pull", strategy = "content-copy", image = %image);

        async {
            log::info!("Pulling {} to {}", image, dest.display());

            let manifest = self.source.manifest(&image).await?;
            let mut report = PullReport {
                manifest_digest: manifest.digest,
                files: Vec::new(),
            };

            // One blob at a time.
            for layer in &manifest.layers {
                let Some(title) = layer.title.as_deref() else {
                    log::debug!("Skipping blob {} without a title annotation", layer.digest);
                    continue;
                };
                let relative = safe_title_path(title)?;

                let content = self.source.blob(&image, &layer.digest).await?;
                verify_digest(&layer.digest, &content)?;

                let path = dest.join(relative);
                write_blob(&path, &content)?;
                log::debug!("Wrote {} ({} bytes)", path.display(), content.len());
                report.files.push(path);
            }

            log::info!("Successfully pulled artifact to {}", dest.display());

            match find_yaml_files(dest) {
                Ok(files) => {
                    log::info!(
                        "Found {} YAML file(s) in {} after pull",
                        files.len(),
                        dest.display()
                    );
                    for file in &files {
                        log::info!("  - {}", file.display());
                    }
                }
                Err(e) => log::warn!("Error listing files after pull: {}", e),
            }

            Ok(report)
        }
        .instrument(span)
        .await
    }
}

/// Validates a title annotation as a relative path inside the destination.
pub fn safe_title_path(title: &str) -> Result<PathBuf> {
    let path = Path::new(title);
    if title.trim().is_empty() {
        return Err(WatcherError::Protocol("blob title is empty".to_string()));
    }

    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WatcherError::Protocol(format!(
                    "blob title '{}' escapes the destination directory",
                    title
                )));
            }
        }
    }

    Ok(path.to_path_buf())
}

/// Checks `content` against a `sha256:<hex>` descriptor digest.
pub fn verify_digest(expected: &str, content: &[u8]) -> Result<()> {
    let Some(hex) = expected.strip_prefix("sha256:") else {
        return Err(WatcherError::Protocol(format!(
            "unsupported digest algorithm in '{}'",
            expected
        )));
    };

    let actual = format!("{:x}", Sha256::digest(content));
    if !actual.eq_ignore_ascii_case(hex) {
        return Err(WatcherError::Protocol(format!(
            "digest mismatch: expected {}, got sha256:{}",
            expected, actual
        )));
    }
    Ok(())
}
