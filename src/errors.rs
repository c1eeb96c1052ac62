//! Error types for the sync engine.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error(
        "Source {} and destination {} overlap",
        source_root.display(),
        destination_root.display()
    )]
    OverlappingRoots {
        source_root: PathBuf,
        destination_root: PathBuf,
    },

    #[error("IO error during {op} at {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Self::NotADirectory { path: path.into() }
    }
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
