//! One reconciliation cycle: resolve → compare → pull → annotate → apply → persist.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

use crate::apply::{ApplyReport, Applier, CommandApplier};
use crate::config::{Credentials, Provider, WatchConfig};
use crate::error::{Result, WatcherError};
use crate::manifest::{find_yaml_files, Annotator, ManifestAnnotator};
use crate::registry::{
    prepare_destination, ContentCopyPuller, GitHubPackagesResolver, LayerWalkPuller, Puller,
    ReferenceTagResolver, VersionResolver,
};
use crate::sanitize::sanitize_path;
use crate::state::{FileStateStore, StateStore};

/// Result of a reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The registry has no versions of the artifact.
    NoVersions,
    /// The resolved version matches the last applied one.
    Unchanged { version: String },
    /// A new version was pulled, applied and recorded.
    Applied {
        previous: String,
        version: String,
        report: ApplyReport,
    },
}

/// Drives the artifact from the registry into the cluster.
///
/// State is only written after the apply stage ran, so a failed cycle is
/// retried from scratch on the next poll.
pub struct Reconciler {
    resolver: Box<dyn VersionResolver>,
    puller: Box<dyn Puller>,
    annotator: Box<dyn Annotator>,
    applier: Box<dyn Applier>,
    state: Box<dyn StateStore>,
    work_dir: PathBuf,
}

impl Reconciler {
    pub fn new(
        resolver: Box<dyn VersionResolver>,
        puller: Box<dyn Puller>,
        annotator: Box<dyn Annotator>,
        applier: Box<dyn Applier>,
        state: Box<dyn StateStore>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resolver,
            puller,
            annotator,
            applier,
            state,
            work_dir: work_dir.into(),
        }
    }

    /// Wires up the provider-specific resolver and puller for `config`.
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let reference = config.reference.clone();

        let (resolver, puller): (Box<dyn VersionResolver>, Box<dyn Puller>) =
            match (config.provider, &config.credentials) {
                (Provider::GitHub, Credentials::GitHubToken(token)) => {
                    let resolver = GitHubPackagesResolver::new(
                        config.github_api_url.clone(),
                        config.owner_type,
                        reference.clone(),
                        copy_secret(token),
                        config.http_timeout,
                    )?;
                    let puller = LayerWalkPuller::new(reference, copy_secret(token));
                    (
                        Box::new(resolver) as Box<dyn VersionResolver>,
                        Box::new(puller) as Box<dyn Puller>,
                    )
                }
                (Provider::Artifactory, Credentials::Basic { username, password }) => {
                    if reference.tag().is_none() {
                        return Err(WatcherError::Config(
                            "IMAGE_BASE for artifactory must include a tag (e.g., registry/path:tag)"
                                .to_string(),
                        ));
                    }
                    let puller = ContentCopyPuller::new(
                        reference.clone(),
                        username.clone(),
                        copy_secret(password),
                    );
                    (
                        Box::new(ReferenceTagResolver::new(reference)) as Box<dyn VersionResolver>,
                        Box::new(puller) as Box<dyn Puller>,
                    )
                }
                (provider, _) => {
                    return Err(WatcherError::Config(format!(
                        "credentials do not match provider {}",
                        provider
                    )))
                }
            };

        Ok(Self::new(
            resolver,
            puller,
            Box::new(ManifestAnnotator),
            Box::new(CommandApplier::new(
                config.apply_command.clone(),
                config.apply_timeout,
            )),
            Box::new(FileStateStore::new(config.last_seen_path())),
            config.work_dir.clone(),
        ))
    }

    /// Directory a version is pulled into.
    pub fn destination_for(&self, version: &str) -> PathBuf {
        self.work_dir.join(format!("image-{}", sanitize_path(version)))
    }

    /// Runs one cycle. Any error leaves the recorded state untouched.
    pub async fn reconcile_once(&self) -> Result<CycleOutcome> {
        let last_seen = self.state.read();

        let version = match self.resolver.resolve().await? {
            Some(version) => version,
            None => {
                log::info!("No versions found for image");
                return Ok(CycleOutcome::NoVersions);
            }
        };

        if version == last_seen {
            log::info!("No change (version {})", version);
            return Ok(CycleOutcome::Unchanged { version });
        }

        if last_seen.is_empty() {
            log::info!("New version detected: {} (no previous version)", version);
        } else {
            log::info!("New version detected: {} (previous: {})", version, last_seen);
        }

        let dest = self.destination_for(&version);
        prepare_destination(&dest)?;

        let pulled = self.puller.pull(&version, &dest).await?;
        log::info!(
            "Pulled {} file(s) from manifest {}",
            pulled.files.len(),
            pulled.manifest_digest
        );

        self.annotate_all(&dest, &version)?;

        let report = self.applier.apply(&dest).await?;
        if !report.failed.is_empty() {
            log::warn!(
                "{} of {} manifest(s) failed to apply",
                report.failed.len(),
                report.attempted()
            );
        }

        self.state.write(&version)?;
        log::info!("Recorded version {} as applied", version);

        Ok(CycleOutcome::Applied {
            previous: last_seen,
            version,
            report,
        })
    }

    /// Labels every YAML file under `dest`. Files that fail are left as
    /// pulled and still applied.
    fn annotate_all(&self, dest: &Path, version: &str) -> Result<()> {
        for file in find_yaml_files(dest)? {
            if let Err(e) = self.annotator.annotate(&file, version) {
                log::warn!("Failed to add labels to {}: {}", file.display(), e);
            }
        }
        Ok(())
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}
