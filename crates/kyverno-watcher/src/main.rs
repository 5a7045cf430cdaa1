use kyverno_watcher::logging::init_logging;
use kyverno_watcher::{FileStateStore, Reconciler, Scheduler, TokioClock, WatchConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    log::info!("Kyverno Artifact Watcher version {}", VERSION);

    let config = match WatchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = FileStateStore::new(config.last_seen_path()).ensure_directory() {
        log::error!("Failed to create state directory: {}", e);
        std::process::exit(1);
    }

    config.trace_loaded();

    let reconciler = match Reconciler::from_config(&config) {
        Ok(reconciler) => reconciler,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let scheduler = Scheduler::new(reconciler, config.poll_interval, Box::new(TokioClock));

    let shutdown = scheduler.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, stopping after the current cycle");
        shutdown.stop();
    }) {
        log::warn!("Failed to install signal handler: {}", e);
    }

    scheduler.run().await;
}
