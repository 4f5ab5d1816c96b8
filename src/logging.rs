//! Logging setup
//!
//! Console output on stderr filtered by `RUST_LOG` (default `info`), plus a
//! DEBUG-level plain-text file `<log_dir>/<component>-YYYY-MM-DD.log`.

use crate::error::{Result, RoamingError};
use chrono::Local;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Path of today's log file for `component`.
pub fn log_file_path(log_dir: &Path, component: &str) -> PathBuf {
    log_dir.join(format!("{}-{}.log", component, Local::now().format("%Y-%m-%d")))
}

/// Install the global subscriber. Returns the log file path.
pub fn init_logging(log_dir: &Path, component: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir, component);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_filter(console_filter);
    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| RoamingError::Config(format!("failed to initialise logging: {}", e)))?;
    Ok(path)
}
