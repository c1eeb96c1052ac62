//! Core sync engine: resolve both roots, scan, detect changes, reconcile.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::errors::{SyncError, SyncResult};
use crate::file_ops::FileSystem;
use crate::fingerprint::ContentHasher;
use crate::plan::{detect_changes, DeltaStatus, SyncPlan};
use crate::tree::{resolve_root, DirectoryTree};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Compute and log the plan without touching the destination.
    pub dry_run: bool,
}

/// What one successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub run_started: DateTime<Utc>,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub links_removed: usize,
    pub obstructions_removed: usize,
    pub dirs_created: usize,
    pub files_new: usize,
    pub files_updated: usize,
    pub files_unchanged: usize,
    pub files_deleted: usize,
    pub dirs_deleted: usize,
    pub bytes_copied: u64,
    pub duration: Duration,
    pub dry_run: bool,
}

impl SyncReport {
    fn new(source: PathBuf, destination: PathBuf, dry_run: bool) -> Self {
        Self {
            run_started: Utc::now(),
            source,
            destination,
            links_removed: 0,
            obstructions_removed: 0,
            dirs_created: 0,
            files_new: 0,
            files_updated: 0,
            files_unchanged: 0,
            files_deleted: 0,
            dirs_deleted: 0,
            bytes_copied: 0,
            duration: Duration::ZERO,
            dry_run,
        }
    }

    /// True when the run did not have to change anything.
    pub fn is_noop(&self) -> bool {
        self.links_removed == 0
            && self.obstructions_removed == 0
            && self.dirs_created == 0
            && self.files_new == 0
            && self.files_updated == 0
            && self.files_deleted == 0
            && self.dirs_deleted == 0
    }
}

pub struct SyncEngine {
    fs: Arc<dyn FileSystem>,
    hasher: Arc<dyn ContentHasher>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(fs: Arc<dyn FileSystem>, hasher: Arc<dyn ContentHasher>) -> Self {
        Self::with_options(fs, hasher, SyncOptions::default())
    }

    pub fn with_options(
        fs: Arc<dyn FileSystem>,
        hasher: Arc<dyn ContentHasher>,
        options: SyncOptions,
    ) -> Self {
        Self {
            fs,
            hasher,
            options,
        }
    }

    /// Resolves both roots and rejects them if either contains the other.
    /// Nothing is mutated when this fails.
    pub fn resolve_roots(&self, source: &Path, destination: &Path) -> SyncResult<(PathBuf, PathBuf)> {
        let source_root = resolve_root(self.fs.as_ref(), source)?;
        let dest_root = resolve_root(self.fs.as_ref(), destination)?;

        if source_root.starts_with(&dest_root) || dest_root.starts_with(&source_root) {
            return Err(SyncError::OverlappingRoots {
                source_root,
                destination_root: dest_root,
            });
        }
        Ok((source_root, dest_root))
    }

    /// Scans both canonical roots and computes the plan.
    pub fn plan(&self, source_root: &Path, dest_root: &Path) -> SyncResult<SyncPlan> {
        let source_tree = DirectoryTree::scan(self.fs.as_ref(), source_root)?;
        let dest_tree = DirectoryTree::scan(self.fs.as_ref(), dest_root)?;
        detect_changes(
            self.fs.as_ref(),
            self.hasher.as_ref(),
            &source_tree,
            &dest_tree,
        )
    }

    /// One complete run. The first failure aborts the rest of the run and the
    /// destination may be left partially reconciled.
    pub fn sync(&self, source: &Path, destination: &Path) -> SyncResult<SyncReport> {
        let started = Instant::now();
        let (source_root, dest_root) = self.resolve_roots(source, destination)?;
        info!(
            source = %source_root.display(),
            destination = %dest_root.display(),
            hash = %self.hasher.algorithm(),
            dry_run = self.options.dry_run,
            "Synchronizing folders"
        );

        let plan = self.plan(&source_root, &dest_root)?;
        let mut report = SyncReport::new(
            source_root.clone(),
            dest_root.clone(),
            self.options.dry_run,
        );
        report.files_unchanged = plan.unchanged;

        if self.options.dry_run {
            log_plan(&plan);
            report.links_removed = plan.links_to_remove.len();
            report.obstructions_removed = plan.obstructions.len();
            report.dirs_created = plan.dirs_to_create.len();
            report.files_new = plan.count(DeltaStatus::New);
            report.files_updated = plan.count(DeltaStatus::Modified);
            report.files_deleted = plan.files_to_delete.len();
            report.dirs_deleted = top_level(&plan.dirs_to_delete).len();
        } else {
            apply_plan(self.fs.as_ref(), &plan, &source_root, &dest_root, &mut report)?;
        }

        report.duration = started.elapsed();
        info!(
            links_removed = report.links_removed,
            obstructions_removed = report.obstructions_removed,
            dirs_created = report.dirs_created,
            files_new = report.files_new,
            files_updated = report.files_updated,
            files_unchanged = report.files_unchanged,
            files_deleted = report.files_deleted,
            dirs_deleted = report.dirs_deleted,
            bytes_copied = report.bytes_copied,
            duration_ms = report.duration.as_millis() as u64,
            "Synchronization finished"
        );
        Ok(report)
    }
}

fn log_plan(plan: &SyncPlan) {
    for path in &plan.links_to_remove {
        info!(path = %path.display(), "[dry run] would remove symlink");
    }
    for path in &plan.obstructions {
        info!(path = %path.display(), "[dry run] would remove obstruction");
    }
    for path in &plan.dirs_to_create {
        info!(path = %path.display(), "[dry run] would create directory");
    }
    for (path, status) in &plan.files_to_copy {
        info!(path = %path.display(), status = ?status, "[dry run] would copy file");
    }
    for path in &plan.files_to_delete {
        info!(path = %path.display(), "[dry run] would delete file");
    }
    for path in top_level(&plan.dirs_to_delete) {
        info!(path = %path.display(), "[dry run] would delete directory");
    }
}

/// Directories whose ancestors are not in the set themselves. Removing these
/// recursively removes the rest.
fn top_level<'a>(dirs: impl IntoIterator<Item = &'a PathBuf>) -> Vec<&'a PathBuf> {
    let mut kept: Vec<&PathBuf> = Vec::new();
    // Sorted input puts every parent before its children.
    for dir in dirs {
        if !kept.iter().any(|parent| dir.starts_with(parent)) {
            kept.push(dir);
        }
    }
    kept
}

/// Applies `plan` to the destination in a fixed order: symlinks, obstructions,
/// directory creation, file copies, file deletions, directory deletions. Each step
/// completes before the next begins and the first I/O failure is returned
/// immediately. No rollback is attempted.
pub fn apply_plan(
    fs: &dyn FileSystem,
    plan: &SyncPlan,
    source_root: &Path,
    dest_root: &Path,
    report: &mut SyncReport,
) -> SyncResult<()> {
    for relative in &plan.links_to_remove {
        let target = dest_root.join(relative);
        fs.remove_file(&target)
            .map_err(|e| SyncError::io("remove symlink", &target, e))?;
        debug!(path = %relative.display(), "Removed symlink");
        report.links_removed += 1;
    }

    for relative in &plan.obstructions {
        let target = dest_root.join(relative);
        let result = if fs.is_dir(&target) {
            fs.remove_dir_all(&target)
        } else {
            fs.remove_file(&target)
        };
        result.map_err(|e| SyncError::io("remove obstruction", &target, e))?;
        debug!(path = %relative.display(), "Removed obstruction");
        report.obstructions_removed += 1;
    }

    for relative in &plan.dirs_to_create {
        let target = dest_root.join(relative);
        fs.create_dir_all(&target)
            .map_err(|e| SyncError::io("create directory", &target, e))?;
        debug!(path = %relative.display(), "Created directory");
        report.dirs_created += 1;
    }

    for (relative, status) in &plan.files_to_copy {
        let from = source_root.join(relative);
        let to = dest_root.join(relative);
        let bytes = fs
            .copy_file(&from, &to)
            .map_err(|e| SyncError::io("copy", &to, e))?;
        debug!(path = %relative.display(), status = ?status, bytes, "Copied file");
        report.bytes_copied += bytes;
        match status {
            DeltaStatus::Modified => report.files_updated += 1,
            _ => report.files_new += 1,
        }
    }

    for relative in &plan.files_to_delete {
        let target = dest_root.join(relative);
        fs.remove_file(&target)
            .map_err(|e| SyncError::io("delete file", &target, e))?;
        debug!(path = %relative.display(), "Deleted file");
        report.files_deleted += 1;
    }

    for relative in top_level(&plan.dirs_to_delete) {
        let target = dest_root.join(relative);
        fs.remove_dir_all(&target)
            .map_err(|e| SyncError::io("delete directory", &target, e))?;
        debug!(path = %relative.display(), "Deleted directory");
        report.dirs_deleted += 1;
    }

    Ok(())
}
