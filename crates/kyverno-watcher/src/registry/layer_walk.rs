//! Pulls an artifact by walking its image manifest and saving each layer.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use oci_client::secrets::RegistryAuth;
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

use super::{write_blob, BlobSource, PullReport, Puller, RegistryBlobSource};
use crate::config::ArtifactReference;
use crate::error::{Result, WatcherError};

/// Media type of layers holding a Kyverno policy document.
pub const POLICY_LAYER_MEDIA_TYPE: &str = "application/vnd.cncf.kyverno.policy.layer.v1+yaml";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Layer-by-layer puller for GHCR, authenticated as `<owner>:<token>`.
pub struct LayerWalkPuller {
    source: Box<dyn BlobSource>,
    reference: ArtifactReference,
}

impl LayerWalkPuller {
    pub fn new(reference: ArtifactReference, token: SecretString) -> Self {
        let auth = registry_auth(&reference, &token);
        Self::with_source(reference, Box::new(RegistryBlobSource::new(auth)))
    }

    pub fn with_source(reference: ArtifactReference, source: Box<dyn BlobSource>) -> Self {
        Self { source, reference }
    }
}

fn registry_auth(reference: &ArtifactReference, token: &SecretString) -> RegistryAuth {
    RegistryAuth::Basic(
        reference.owner().to_string(),
        token.expose_secret().to_string(),
    )
}

#[async_trait]
impl Puller for LayerWalkPuller {
    async fn pull(&self, version: &str, dest: &Path) -> Result<PullReport> {
        let image = format!("{}:{}", self.reference.repository(), version);
        let span = tracing::info_span!("pull", strategy = "layer-walk", image = %image);

        async {
            log::info!("Pulling files from OCI image: {}", image);

            let manifest = self.source.manifest(&image).await?;
            log::info!("Found {} layers", manifest.layers.len());

            let mut report = PullReport {
                manifest_digest: manifest.digest,
                files: Vec::new(),
            };

            for (index, layer) in manifest.layers.iter().enumerate() {
                log::info!("Layer {} media type: {}", index, layer.media_type);

                let content = self.source.blob(&image, &layer.digest).await?;
                if content.is_empty() {
                    log::info!("  Layer {} is empty, skipping", index);
                    continue;
                }

                let content = decode_layer(content).map_err(|e| {
                    WatcherError::Protocol(format!("processing layer {}: {}", index, e))
                })?;

                let path = dest.join(layer_file_name(index, &layer.media_type));
                write_blob(&path, &content)?;
                log::info!(
                    "  Saved to: {} ({} bytes)",
                    path.file_name().unwrap_or_default().to_string_lossy(),
                    content.len()
                );
                report.files.push(path);
            }

            if report.files.is_empty() {
                log::warn!("No files were extracted from the image");
            } else {
                log::info!("Successfully pulled {} file(s)", report.files.len());
            }

            Ok(report)
        }
        .instrument(span)
        .await
    }
}

/// File name for the layer at `index`.
pub fn layer_file_name(index: usize, media_type: &str) -> String {
    if media_type == POLICY_LAYER_MEDIA_TYPE {
        format!("policy-{}.yaml", index)
    } else {
        format!("layer-{}.yaml", index)
    }
}

/// Gunzips `content` if it starts with the gzip magic bytes.
pub fn decode_layer(content: Vec<u8>) -> std::io::Result<Vec<u8>> {
    if !content.starts_with(&GZIP_MAGIC) {
        return Ok(content);
    }

    let mut decoded = Vec::new();
    GzDecoder::new(content.as_slice()).read_to_end(&mut decoded)?;
    Ok(decoded)
}
