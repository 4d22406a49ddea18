//! Logging initialisation
//!
//! Console output plus a daily-rotating log at a fixed per-user location.
//! The CLI may attach one extra per-run log file.

use crate::config::resolve_log_dir;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Environment variable holding an `EnvFilter` directive
pub const LOG_FILTER_ENV: &str = "SIMURAN_LOG";

/// Rotating log file name prefix
pub const LOG_FILE_NAME: &str = "simuran.log";

/// Set once a subscriber is installed; held while installing
static LOGGING_INIT: Mutex<bool> = Mutex::new(false);

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `SIMURAN_LOG` is unset
    pub level: String,
    /// Directory of the rotating log; `None` resolves the per-user default
    pub log_dir: Option<PathBuf>,
    /// Write the rotating per-user log at all
    pub rotating_file: bool,
    /// Extra per-run log file
    pub run_log: Option<PathBuf>,
    /// Echo to stderr
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            rotating_file: true,
            run_log: None,
            console: true,
        }
    }
}

/// Keeps the non-blocking file writers alive; flushes on drop
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

/// Initialize the global tracing subscriber
///
/// Subsequent calls are no-ops and return an empty guard, as is a call made
/// after some other global subscriber was installed.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let mut initialized = LOGGING_INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if *initialized {
        return Ok(LogGuard { _guards: Vec::new() });
    }

    let directive = std::env::var(LOG_FILTER_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.level.clone());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let mut guards = Vec::new();
    let mut layers: Vec<Box<dyn Layer<_> + Send + Sync>> = Vec::new();

    if config.console {
        layers.push(fmt::layer().with_writer(std::io::stderr).boxed());
    }

    let rotating_dir = if config.rotating_file {
        let dir = resolve_log_dir(config.log_dir.as_deref());
        std::fs::create_dir_all(&dir)?;
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
        Some(dir)
    } else {
        None
    };

    if let Some(run_log) = &config.run_log {
        let file = open_append(run_log)?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        guards.push(guard);
        layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
    }

    let installed = tracing_subscriber::registry().with(filter).with(layers).try_init();
    *initialized = true;
    if let Err(err) = installed {
        debug!("Keeping the existing global subscriber: {}", err);
        return Ok(LogGuard { _guards: Vec::new() });
    }

    info!(
        filter = directive.as_str(),
        log_dir = ?rotating_dir,
        run_log = ?config.run_log,
        "logging initialized"
    );

    Ok(LogGuard { _guards: guards })
}

fn open_append(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?)
}
