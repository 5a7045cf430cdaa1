pub mod apply;
pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod reconcile;
pub mod registry;
pub mod sanitize;
pub mod state;

pub use apply::{ApplyReport, Applier, CommandApplier};
pub use config::{ArtifactReference, Credentials, OwnerType, Provider, WatchConfig};
pub use error::{Result, WatcherError};
pub use manifest::{add_labels_to_yaml, Annotator, ManifestAnnotator};
pub use reconcile::{Clock, CycleOutcome, Reconciler, Scheduler, ShutdownHandle, TokioClock};
pub use registry::{PullReport, Puller, ReferenceTagResolver, VersionResolver};
pub use state::{FileStateStore, StateStore};
