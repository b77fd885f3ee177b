//! Logging setup for the command line tool
//!
//! Logs always go to stderr so stdout stays free for artifacts. A log file is
//! written in JSON through a non-blocking appender whose guard must live as
//! long as the process.

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogRotation, LoggingConfig};

/// Filter used when `RUST_LOG` is not set
pub fn default_directives(level: &str) -> String {
    let level = level.to_lowercase();
    format!("reconcile={level},reconcile_cli={level}")
}

pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.level)))
        .context("Invalid log filter")?;

    let console_layer = if config.json {
        fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = match &config.file {
        Some(log_path) => {
            let directory = log_path.parent().unwrap_or_else(|| Path::new("."));
            if !directory.as_os_str().is_empty() {
                std::fs::create_dir_all(directory).with_context(|| {
                    format!("Failed to create log directory {}", directory.display())
                })?;
            }
            let file_name = log_path
                .file_name()
                .unwrap_or_else(|| OsStr::new("reconcile.log"));

            let appender = match config.rotation {
                LogRotation::Daily => rolling::daily(directory, file_name),
                LogRotation::Never => rolling::never(directory, file_name),
            };
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .json()
                .with_current_span(true)
                .with_span_list(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives("DEBUG"), "reconcile=debug,reconcile_cli=debug");
        assert!(EnvFilter::try_new(default_directives("info")).is_ok());
    }
}
