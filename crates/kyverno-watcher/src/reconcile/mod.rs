//! The watch loop.
//!
//! [`Reconciler`] performs a single cycle against injected collaborators;
//! [`Scheduler`] repeats it every poll interval until asked to stop.

pub mod reconciler;
pub mod scheduler;

pub use reconciler::{CycleOutcome, Reconciler};
pub use scheduler::{Clock, Scheduler, ShutdownHandle, TokioClock};
