//! Structured logging.
//!
//! One global `tracing` subscriber per process, configured from the
//! `[logging]` section: a stdout layer, plus a rotated file layer unless
//! `logging.file` is off.

use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogRotation, LoggingConfig};

const LOG_FILE_PREFIX: &str = "edgewatch.log";

/// Keeps the non-blocking file writer flushing until the process exits.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static INSTALLED: OnceLock<Option<PathBuf>> = OnceLock::new();

fn log_dir(cfg: &LoggingConfig) -> PathBuf {
    cfg.dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("edgewatch")
            .join("logs")
    })
}

fn rotation(r: LogRotation) -> Rotation {
    match r {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// `Ok(None)` when file logging is switched off.
fn file_appender(cfg: &LoggingConfig) -> io::Result<Option<(RollingFileAppender, PathBuf)>> {
    if !cfg.file {
        return Ok(None);
    }
    let dir = log_dir(cfg);
    std::fs::create_dir_all(&dir)?;
    let appender = RollingFileAppender::new(rotation(cfg.rotation), &dir, LOG_FILE_PREFIX);
    Ok(Some((appender, dir)))
}

/// `RUST_LOG` wins over the configured level. An unparsable level falls
/// back to `info` and is reported once the subscriber is up.
fn env_filter(level: &str) -> (EnvFilter, Option<String>) {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return (filter, None);
    }
    match EnvFilter::try_new(level) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new("info"), Some(format!("{:?}: {}", level, e))),
    }
}

/// Install the global subscriber. Only the first call has any effect; it
/// returns the directory log files are written to, if any.
pub fn init_logging(cfg: &LoggingConfig) -> Option<PathBuf> {
    INSTALLED
        .get_or_init(|| {
            let (filter, bad_level) = env_filter(&cfg.level);
            let stdout_layer = fmt::layer()
                .with_target(true)
                .with_timer(UtcTime::rfc_3339());

            let (file_layer, dir, file_err) = match file_appender(cfg) {
                Ok(Some((appender, dir))) => {
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    FILE_GUARD.set(guard).ok();
                    let layer = fmt::layer()
                        .with_ansi(false)
                        .with_target(true)
                        .with_timer(UtcTime::rfc_3339())
                        .with_writer(writer);
                    (Some(layer), Some(dir), None)
                }
                Ok(None) => (None, None, None),
                Err(e) => (None, None, Some((log_dir(cfg), e))),
            };

            // `Option<Layer>` is itself a layer, so one chain covers both cases.
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();

            if let Some(msg) = bad_level {
                warn!("Invalid logging.level {}, using info", msg);
            }
            match (&dir, file_err) {
                (Some(dir), _) => info!("Logging to {} ({:?} rotation)", dir.display(), cfg.rotation),
                (None, Some((dir, e))) => {
                    warn!("Cannot create log directory {}: {}, logging to stdout only", dir.display(), e)
                }
                (None, None) => info!("File logging disabled"),
            }
            dir
        })
        .clone()
}
