//! Tracing setup: one subscriber writing to stderr and to the log file.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{SyncError, SyncResult};

/// Opens `path` for appending, creating the file if needed. The parent
/// directory must already exist.
pub fn open_log_file(path: &Path) -> SyncResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            SyncError::InvalidArgument(format!(
                "cannot open log file {}: {}",
                path.display(),
                e
            ))
        })
}

/// Installs the global subscriber. `RUST_LOG` overrides the default level,
/// which is `debug` when `verbose` is set and `info` otherwise.
pub fn init(log_file: &Path, verbose: bool) -> SyncResult<()> {
    let file = open_log_file(log_file)?;
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        )
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| SyncError::Internal(format!("failed to install logger: {}", e)))
}
