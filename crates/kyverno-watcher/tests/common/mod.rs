//! Shared utilities for kyverno-watcher integration tests.
//!
//! Provides a `WatcherHarness` with temp work/state directories, fixture
//! manifests and in-memory registry fakes, wired to the real annotator,
//! state store and command applier.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use kyverno_watcher::config::ApplyCommand;
use kyverno_watcher::{
    CommandApplier, FileStateStore, ManifestAnnotator, PullReport, Puller, Reconciler, Result,
    VersionResolver, WatcherError,
};

pub const CLUSTER_POLICY: &str = r#"apiVersion: kyverno.io/v1
kind: ClusterPolicy
metadata:
  name: require-labels
  labels:
    app: x
spec:
  validationFailureAction: Enforce
  rules:
  - name: check-team
    match:
      any:
      - resources:
          kinds:
          - Pod
    validate:
      message: "label 'team' is required"
      pattern:
        metadata:
          labels:
            team: "?*"
"#;

pub const MULTI_DOC: &str = r#"apiVersion: v1
kind: Namespace
metadata:
  name: policies
---
apiVersion: kyverno.io/v1
kind: Policy
metadata:
  name: restrict-registries
  namespace: policies
spec:
  rules: []
"#;

pub const BROKEN: &str = "{{{ not: yaml";

/// Resolver whose answer can be changed between cycles.
#[derive(Clone, Default)]
pub struct SwitchableResolver {
    version: Arc<Mutex<Option<String>>>,
}

impl SwitchableResolver {
    pub fn set(&self, version: Option<&str>) {
        *self.version.lock().unwrap() = version.map(str::to_string);
    }
}

#[async_trait]
impl VersionResolver for SwitchableResolver {
    async fn resolve(&self) -> Result<Option<String>> {
        Ok(self.version.lock().unwrap().clone())
    }
}

/// Puller that materializes a fixed set of files, or fails when told to.
#[derive(Clone, Default)]
pub struct FixturePuller {
    files: Arc<Mutex<Vec<(String, String)>>>,
    fail: Arc<Mutex<bool>>,
    pulls: Arc<Mutex<Vec<String>>>,
}

impl FixturePuller {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let puller = Self::default();
        *puller.files.lock().unwrap() = files
            .iter()
            .map(|(name, content)| (name.to_string(), content.to_string()))
            .collect();
        puller
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn pulls(&self) -> Vec<String> {
        self.pulls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Puller for FixturePuller {
    async fn pull(&self, version: &str, dest: &Path) -> Result<PullReport> {
        self.pulls.lock().unwrap().push(version.to_string());
        if *self.fail.lock().unwrap() {
            return Err(WatcherError::NotFound("manifest unknown".to_string()));
        }

        let mut report = PullReport {
            manifest_digest: format!("sha256:{}", version),
            files: Vec::new(),
        };
        for (name, content) in self.files.lock().unwrap().iter() {
            let path = dest.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, content).unwrap();
            report.files.push(path);
        }
        Ok(report)
    }
}

/// Isolated environment for running reconciliation cycles.
pub struct WatcherHarness {
    temp_dir: TempDir,
    pub work_dir: PathBuf,
    pub state_dir: PathBuf,
    /// Every file the apply command was invoked with, one per line.
    pub apply_log: PathBuf,
    pub resolver: SwitchableResolver,
    pub puller: FixturePuller,
}

impl WatcherHarness {
    pub fn new(puller: FixturePuller) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let work_dir = temp_dir.path().join("work");
        let state_dir = temp_dir.path().join("state");
        std::fs::create_dir_all(&work_dir).expect("Failed to create work dir");

        Self {
            apply_log: temp_dir.path().join("applied.log"),
            temp_dir,
            work_dir,
            state_dir,
            resolver: SwitchableResolver::default(),
            puller,
        }
    }

    pub fn last_seen_path(&self) -> PathBuf {
        self.state_dir.join("last_seen")
    }

    pub fn last_seen(&self) -> Option<String> {
        std::fs::read_to_string(self.last_seen_path()).ok()
    }

    /// Apply command that records each file and fails for files containing
    /// the word `fail-me`.
    pub fn apply_command(&self) -> ApplyCommand {
        let script = format!(
            "echo \"$0\" >> '{}'; ! grep -q fail-me \"$0\"",
            self.apply_log.display()
        );
        ApplyCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script],
        }
    }

    pub fn applied(&self) -> Vec<PathBuf> {
        std::fs::read_to_string(&self.apply_log)
            .unwrap_or_default()
            .lines()
            .map(PathBuf::from)
            .collect()
    }

    pub fn image_dir(&self, version: &str) -> PathBuf {
        self.work_dir.join(format!("image-{}", version))
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            Box::new(self.resolver.clone()),
            Box::new(self.puller.clone()),
            Box::new(ManifestAnnotator),
            Box::new(CommandApplier::new(self.apply_command(), None)),
            Box::new(FileStateStore::new(self.last_seen_path())),
            &self.work_dir,
        )
    }
}
