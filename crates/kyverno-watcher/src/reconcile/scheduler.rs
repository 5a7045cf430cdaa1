//! Periodic reconciliation loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::Instrument;

use super::reconciler::{CycleOutcome, Reconciler};

/// Source of the delay between cycles.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Cloneable handle used to stop a running [`Scheduler`], e.g. from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    /// Requests a stop. An in-flight cycle finishes first; a pending sleep is cut short.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Runs a [`Reconciler`] forever, one cycle per poll interval.
pub struct Scheduler {
    reconciler: Reconciler,
    interval: Duration,
    clock: Box<dyn Clock>,
    shutdown: ShutdownHandle,
}

impl Scheduler {
    pub fn new(reconciler: Reconciler, interval: Duration, clock: Box<dyn Clock>) -> Self {
        Self {
            reconciler,
            interval,
            clock,
            shutdown: ShutdownHandle::default(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signals the scheduler to stop.
    pub fn stop(&self) {
        self.shutdown.stop();
    }

    /// Loops until stopped. The first cycle runs immediately.
    ///
    /// Cycle errors are logged and never end the loop.
    pub async fn run(&self) {
        let mut iteration: u64 = 0;

        loop {
            if self.shutdown.is_stopped() {
                break;
            }

            iteration += 1;
            self.run_cycle(iteration).await;

            if self.shutdown.is_stopped() {
                break;
            }

            tokio::select! {
                _ = self.clock.sleep(self.interval) => {},
                _ = self.shutdown.notify.notified() => {
                    log::debug!("Sleep interrupted by shutdown request");
                },
            }
        }

        log::info!("Watcher stopped after {} cycle(s)", iteration);
    }

    async fn run_cycle(&self, iteration: u64) {
        let span = tracing::info_span!("cycle", iteration);

        async {
            match self.reconciler.reconcile_once().await {
                Ok(CycleOutcome::Applied {
                    version, report, ..
                }) => {
                    log::info!(
                        "Applied version {}: {} succeeded, {} failed",
                        version,
                        report.applied.len(),
                        report.failed.len()
                    );
                }
                Ok(_) => {}
                Err(e) => log::error!("Cycle failed: {}", e),
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{ApplyReport, Applier};
    use crate::error::{Result, WatcherError};
    use crate::manifest::ManifestAnnotator;
    use crate::registry::{PullReport, Puller, VersionResolver};
    use crate::state::StateStore;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Yields the scripted results in order, then keeps returning the last one.
    struct ScriptedResolver {
        script: Mutex<Vec<std::result::Result<Option<String>, String>>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VersionResolver for ScriptedResolver {
        async fn resolve(&self) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            next.map_err(WatcherError::Protocol)
        }
    }

    struct NoopPuller;

    #[async_trait]
    impl Puller for NoopPuller {
        async fn pull(&self, _version: &str, _dest: &Path) -> Result<PullReport> {
            Ok(PullReport::default())
        }
    }

    struct NoopApplier;

    #[async_trait]
    impl Applier for NoopApplier {
        async fn apply(&self, _dir: &Path) -> Result<ApplyReport> {
            Ok(ApplyReport::default())
        }
    }

    #[derive(Default)]
    struct RecordingState {
        value: Mutex<String>,
    }

    impl StateStore for RecordingState {
        fn read(&self) -> String {
            self.value.lock().unwrap().clone()
        }

        fn write(&self, version: &str) -> Result<()> {
            *self.value.lock().unwrap() = version.to_string();
            Ok(())
        }
    }

    impl StateStore for Arc<RecordingState> {
        fn read(&self) -> String {
            self.as_ref().read()
        }

        fn write(&self, version: &str) -> Result<()> {
            self.as_ref().write(version)
        }
    }

    /// Returns immediately and stops the scheduler after `limit` sleeps.
    struct CountingClock {
        sleeps: Arc<AtomicUsize>,
        limit: usize,
        shutdown: Mutex<Option<ShutdownHandle>>,
    }

    #[async_trait]
    impl Clock for CountingClock {
        async fn sleep(&self, _duration: Duration) {
            let n = self.sleeps.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.limit {
                if let Some(handle) = self.shutdown.lock().unwrap().as_ref() {
                    handle.stop();
                }
            }
            tokio::task::yield_now().await;
        }
    }

    fn reconciler(
        script: Vec<std::result::Result<Option<String>, String>>,
        calls: Arc<AtomicUsize>,
        state: Arc<RecordingState>,
        work_dir: &Path,
    ) -> Reconciler {
        Reconciler::new(
            Box::new(ScriptedResolver {
                script: Mutex::new(script),
                calls,
            }),
            Box::new(NoopPuller),
            Box::new(ManifestAnnotator),
            Box::new(NoopApplier),
            Box::new(state),
            work_dir,
        )
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_the_loop() {
        let dir = TempDir::new().unwrap();
        let resolves = Arc::new(AtomicUsize::new(0));
        let sleeps = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(RecordingState::default());

        let reconciler = reconciler(
            vec![
                Err("network unreachable".to_string()),
                Ok(None),
                Ok(Some("v1".to_string())),
            ],
            resolves.clone(),
            state.clone(),
            dir.path(),
        );
        let clock = Arc::new(CountingClock {
            sleeps: sleeps.clone(),
            limit: 4,
            shutdown: Mutex::new(None),
        });

        let scheduler = Scheduler::new(
            reconciler,
            Duration::from_secs(30),
            Box::new(ClockRef(clock.clone())),
        );
        *clock.shutdown.lock().unwrap() = Some(scheduler.shutdown_handle());

        tokio::time::timeout(Duration::from_secs(5), scheduler.run())
            .await
            .expect("scheduler did not stop");

        assert_eq!(resolves.load(Ordering::SeqCst), 4);
        assert_eq!(sleeps.load(Ordering::SeqCst), 4);
        assert_eq!(state.read(), "v1");
    }

    #[tokio::test]
    async fn test_stop_before_run_skips_all_cycles() {
        let dir = TempDir::new().unwrap();
        let resolves = Arc::new(AtomicUsize::new(0));
        let reconciler = reconciler(
            vec![Ok(None)],
            resolves.clone(),
            Arc::new(RecordingState::default()),
            dir.path(),
        );

        let scheduler = Scheduler::new(reconciler, Duration::from_secs(30), Box::new(TokioClock));
        scheduler.stop();
        scheduler.run().await;

        assert_eq!(resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let dir = TempDir::new().unwrap();
        let resolves = Arc::new(AtomicUsize::new(0));
        let reconciler = reconciler(
            vec![Ok(None)],
            resolves.clone(),
            Arc::new(RecordingState::default()),
            dir.path(),
        );

        let scheduler =
            Scheduler::new(reconciler, Duration::from_secs(3600), Box::new(TokioClock));
        let handle = scheduler.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.stop();
        });

        tokio::time::timeout(Duration::from_secs(5), scheduler.run())
            .await
            .expect("stop did not interrupt the sleep");
        assert_eq!(resolves.load(Ordering::SeqCst), 1);
    }

    struct ClockRef(Arc<CountingClock>);

    #[async_trait]
    impl Clock for ClockRef {
        async fn sleep(&self, duration: Duration) {
            self.0.sleep(duration).await;
        }
    }
}
