//! Tracing subscriber set-up for the binary

use std::{env, path::PathBuf};

use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::result::{HubbyError, Result};

const DEFAULT_FILTER: &str = "info,hubby=info";

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `debug` or `hubby=trace`
    pub filter: Option<String>,
    /// Write a daily rolling log file here in addition to stderr
    pub log_dir: Option<PathBuf>,
    pub json: bool,
}

impl LoggingConfig {
    /// Precedence: `RUST_LOG`, then `HUBBY_LOG`, then whatever the caller sets
    pub fn from_env() -> Self {
        let filter = env::var("RUST_LOG")
            .ok()
            .or_else(|| env::var("HUBBY_LOG").ok())
            .filter(|v| !v.trim().is_empty());

        Self {
            filter,
            log_dir: env::var_os("HUBBY_LOG_DIR").map(PathBuf::from),
            json: env::var("HUBBY_LOG_JSON").is_ok_and(|v| v == "1"),
        }
    }

    pub fn with_default_filter(mut self, filter: Option<&str>) -> Self {
        if self.filter.is_none() {
            self.filter = filter.map(str::to_owned);
        }
        self
    }

    pub fn with_log_dir(mut self, log_dir: Option<PathBuf>) -> Self {
        if self.log_dir.is_none() {
            self.log_dir = log_dir;
        }
        self
    }

    fn env_filter(&self) -> EnvFilter {
        self.filter
            .as_deref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer and must live until exit.
pub fn init_logging(config: LoggingConfig) -> Result<Option<WorkerGuard>> {
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                HubbyError::logging(format_args!("cannot create {}: {e}", dir.display()))
            })?;
            let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, "hubby.log"));
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            let layer = if config.json { layer.json().boxed() } else { layer.boxed() };
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(HubbyError::logging)?;

    Ok(guard)
}
