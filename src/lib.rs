//! One-way directory mirroring.
//!
//! A run resolves the source and destination roots, scans both trees, compares
//! them by relative path and content fingerprint, then reconciles the
//! destination. [`scheduler::Scheduler`] repeats runs on a fixed period and
//! never lets two of them overlap.

pub mod config;
pub mod errors;
pub mod file_ops;
pub mod fingerprint;
pub mod logging;
pub mod memory_fs;
pub mod plan;
pub mod scheduler;
pub mod sync_engine;
pub mod tree;

pub use config::SyncConfig;
pub use errors::{SyncError, SyncResult};
pub use file_ops::{FileSystem, OsFileSystem};
pub use fingerprint::{ContentHasher, Fingerprint, HashAlgorithm, Sha256Hasher, Xxh3Hasher};
pub use memory_fs::MemoryFileSystem;
pub use plan::{DeltaStatus, SyncPlan};
pub use scheduler::{RunOutcome, RunStats, Scheduler, SyncService};
pub use sync_engine::{SyncEngine, SyncOptions, SyncReport};
pub use tree::DirectoryTree;
