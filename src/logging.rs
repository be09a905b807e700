/*!
 * Logging and tracing initialization
 *
 * Compact human-readable lines on stdout by default; JSON lines with thread
 * names when a log file is configured, since the watcher and sweeper run on
 * their own named threads.
 */

use std::fs::OpenOptions;
use std::path::Path;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::RouterConfig;
use crate::error::{Result, RouterError};

/// Level used for this crate's targets; `verbose` forces DEBUG
pub fn effective_level(config: &RouterConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

/// Filter directive applied when `RUST_LOG` is not set
pub fn default_directive(level: Level) -> String {
    format!("limbus_router={}", level)
}

/// Initialize structured logging based on configuration
pub fn init_logging(config: &RouterConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(effective_level(config))))
        .map_err(|e| RouterError::Config(format!("Failed to create log filter: {}", e)))?;

    match config.log_file {
        Some(ref log_path) => init_file_logging(log_path, env_filter),
        None => init_stdout_logging(env_filter),
    }
}

fn init_stdout_logging(env_filter: EnvFilter) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| RouterError::Config(format!("Failed to install logger: {}", e)))
}

/// Append JSON lines to `log_path`; a restarted service keeps its history
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| RouterError::Config(format!("Failed to open log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| RouterError::Config(format!("Failed to install logger: {}", e)))
}

/// Route test output through the test writer
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("limbus_router=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    });
}
