//! Applies pulled manifests to the cluster, one file at a time.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::ApplyCommand;
use crate::error::{Result, WatcherError};
use crate::manifest::find_yaml_files;

/// Applies every manifest below a directory.
#[async_trait]
pub trait Applier: Send + Sync {
    /// Only fails if the directory cannot be enumerated. Per-file failures
    /// are reported in the returned [`ApplyReport`].
    async fn apply(&self, dir: &Path) -> Result<ApplyReport>;
}

/// Outcome of applying a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<PathBuf>,
    /// Files whose command failed, with the exit code when there was one.
    pub failed: Vec<(PathBuf, Option<i32>)>,
}

impl ApplyReport {
    pub fn attempted(&self) -> usize {
        self.applied.len() + self.failed.len()
    }
}

/// Runs an external command (by default `kubectl apply -f`) per file.
#[derive(Debug, Clone, Default)]
pub struct CommandApplier {
    command: ApplyCommand,
    timeout: Option<Duration>,
}

impl CommandApplier {
    pub fn new(command: ApplyCommand, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }

    /// Runs the command for one file. Failures carry the exit code when the
    /// process ran to completion.
    async fn apply_file(
        &self,
        file: &Path,
    ) -> std::result::Result<(), (WatcherError, Option<i32>)> {
        let failed = |message: String, code: Option<i32>| {
            (
                WatcherError::Apply {
                    path: file.to_path_buf(),
                    message,
                },
                code,
            )
        };

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                failed(
                    format!("failed to start '{}': {}", self.command.program, e),
                    None,
                )
            })?;

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        log::warn!("Failed to kill apply command for {}: {}", file.display(), e);
                    }
                    return Err(failed(
                        format!("timed out after {}ms", limit.as_millis()),
                        None,
                    ));
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| failed(e.to_string(), None))?;

        match status.code() {
            _ if status.success() => Ok(()),
            Some(code) => Err(failed(format!("exit code {}", code), Some(code))),
            None => Err(failed("terminated by signal".to_string(), None)),
        }
    }
}

#[async_trait]
impl Applier for CommandApplier {
    async fn apply(&self, dir: &Path) -> Result<ApplyReport> {
        let files = find_yaml_files(dir)?;
        let mut report = ApplyReport::default();

        if files.is_empty() {
            log::info!("No YAML manifests found in {}", dir.display());
            return Ok(report);
        }

        log::info!("Applying manifests in {} ...", dir.display());

        for file in files {
            log::info!("{}", self.command.display_for(&file));

            match self.apply_file(&file).await {
                Ok(()) => report.applied.push(file),
                Err((e, code)) => {
                    log::warn!("{}", e);
                    report.failed.push((file, code));
                }
            }
        }

        Ok(report)
    }
}
