//! Process-wide log setup.
//!
//! Components log through the `log` facade; [`init_logging`] routes those
//! records into a `tracing` subscriber so they share output with cycle spans.

use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::error::{Result, WatcherError};

/// Environment variable selecting the output format.
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

const DEFAULT_FILTER: &str = "info";

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `json` (any case) selects JSON; anything else is text.
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Installs the global subscriber. Filtering follows `RUST_LOG`, defaulting to `info`.
///
/// Must be called once, before any log record is emitted.
pub fn init_logging() -> Result<()> {
    let format = LogFormat::from_value(std::env::var(ENV_LOG_FORMAT).ok().as_deref());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let output: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
        LogFormat::Text => fmt::layer().with_target(false).boxed(),
    };

    LogTracer::init()
        .map_err(|e| WatcherError::Config(format!("Failed to install log bridge: {}", e)))?;

    let subscriber = Registry::default().with(output).with(filter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| WatcherError::Config(format!("Failed to install log subscriber: {}", e)))
}
