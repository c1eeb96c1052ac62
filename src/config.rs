//! Runtime configuration for a mirroring service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{SyncError, SyncResult};
use crate::file_ops::{CopyOptions, OsFileSystem};
use crate::fingerprint::HashAlgorithm;
use crate::scheduler::SyncService;
use crate::sync_engine::{SyncEngine, SyncOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub interval: Duration,
    pub log_file: PathBuf,
    pub hash: HashAlgorithm,
    pub dry_run: bool,
    pub preserve_mtime: bool,
    pub run_once: bool,
    pub verbose: bool,
}

impl SyncConfig {
    /// Builds a validated configuration with default options.
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        interval_secs: u64,
        log_file: impl Into<PathBuf>,
    ) -> SyncResult<Self> {
        let config = Self {
            source: source.into(),
            destination: destination.into(),
            interval: Duration::from_secs(interval_secs),
            log_file: log_file.into(),
            hash: HashAlgorithm::default(),
            dry_run: false,
            preserve_mtime: false,
            run_once: false,
            verbose: false,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the values only; paths are resolved again on every run.
    pub fn validate(&self) -> SyncResult<()> {
        if self.source.as_os_str().is_empty() {
            return Err(SyncError::InvalidArgument("source path is empty".into()));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(SyncError::InvalidArgument("destination path is empty".into()));
        }
        if self.log_file.as_os_str().is_empty() {
            return Err(SyncError::InvalidArgument("log file path is empty".into()));
        }
        if self.interval < Duration::from_secs(1) {
            return Err(SyncError::InvalidArgument(
                "synchronization interval must be at least 1 second".into(),
            ));
        }
        Ok(())
    }

    /// Engine over the real filesystem with the configured options.
    pub fn engine(&self) -> SyncEngine {
        let fs = OsFileSystem::with_copy_options(CopyOptions {
            preserve_mtime: self.preserve_mtime,
            ..CopyOptions::default()
        });
        SyncEngine::with_options(
            Arc::new(fs),
            Arc::from(self.hash.hasher()),
            SyncOptions {
                dry_run: self.dry_run,
            },
        )
    }

    pub fn service(&self) -> SyncService {
        SyncService::new(self.engine(), &self.source, &self.destination)
    }
}
