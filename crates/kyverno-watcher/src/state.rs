//! Persistence of the last successfully applied version.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, WatcherError};

/// Storage for the last-seen version marker.
pub trait StateStore: Send + Sync {
    /// Returns the stored version, or an empty string if nothing was stored
    /// yet or the marker cannot be read.
    fn read(&self) -> String;

    /// Replaces the stored version.
    fn write(&self, version: &str) -> Result<()>;
}

/// Keeps the marker as raw text in a single file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the directory holding the marker file.
    pub fn ensure_directory(&self) -> Result<()> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|e| WatcherError::Directory {
                    path: dir.to_path_buf(),
                    source: e,
                })
            }
            _ => Ok(()),
        }
    }
}

impl StateStore for FileStateStore {
    fn read(&self) -> String {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => content.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                log::warn!(
                    "Failed to read state file {}, treating as empty: {}",
                    self.path.display(),
                    e
                );
                String::new()
            }
        }
    }

    /// Writes to a temporary file next to the marker and renames it over the
    /// old one, so the marker is never observed half-written.
    fn write(&self, version: &str) -> Result<()> {
        self.ensure_directory()?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let write_err = |e: std::io::Error| WatcherError::WriteFile {
            path: self.path.clone(),
            source: e,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(version.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        log::debug!("Recorded last seen version '{}'", version);
        Ok(())
    }
}
