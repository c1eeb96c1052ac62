//! Change detection between a source and a destination tree.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::SyncResult;
use crate::file_ops::FileSystem;
use crate::fingerprint::{fingerprint_file, ContentHasher};
use crate::tree::DirectoryTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaStatus {
    /// Only present in the source.
    New,
    /// Present on both sides with different content.
    Modified,
    /// Present on both sides with identical content.
    Unchanged,
}

/// Operations that bring a destination tree in line with its source.
///
/// All paths are relative to the respective roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Symbolic links in the destination. They are unlinked first so that no
    /// later step writes through them.
    pub links_to_remove: BTreeSet<PathBuf>,
    /// Destination entries whose type differs from the source entry at the
    /// same path (a file where the source has a directory or vice versa), or
    /// whose name matches a source entry only when case is ignored. They are
    /// removed before anything is created.
    pub obstructions: BTreeSet<PathBuf>,
    pub dirs_to_create: BTreeSet<PathBuf>,
    pub files_to_copy: BTreeMap<PathBuf, DeltaStatus>,
    pub files_to_delete: BTreeSet<PathBuf>,
    pub dirs_to_delete: BTreeSet<PathBuf>,
    /// Common files whose fingerprints matched.
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.links_to_remove.is_empty()
            && self.obstructions.is_empty()
            && self.dirs_to_create.is_empty()
            && self.files_to_copy.is_empty()
            && self.files_to_delete.is_empty()
            && self.dirs_to_delete.is_empty()
    }

    pub fn count(&self, status: DeltaStatus) -> usize {
        match status {
            DeltaStatus::Unchanged => self.unchanged,
            _ => self.files_to_copy.values().filter(|s| **s == status).count(),
        }
    }
}

/// Compares one file present in both trees by fingerprint.
pub fn compare_common_file(
    fs: &dyn FileSystem,
    hasher: &dyn ContentHasher,
    source_root: &Path,
    dest_root: &Path,
    relative: &Path,
) -> SyncResult<DeltaStatus> {
    let source = fingerprint_file(fs, hasher, source_root, relative)?;
    let dest = fingerprint_file(fs, hasher, dest_root, relative)?;

    if source.fingerprint == dest.fingerprint {
        Ok(DeltaStatus::Unchanged)
    } else {
        debug!(
            path = %relative.display(),
            source = %source.fingerprint,
            destination = %dest.fingerprint,
            "Content differs"
        );
        Ok(DeltaStatus::Modified)
    }
}

fn fold_case(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Classifies both trees by relative path and fingerprints common files.
///
/// Source links are ignored. Destination links are never followed; every one
/// of them is scheduled for removal, so a source entry at the same path is
/// then created fresh.
pub fn detect_changes(
    fs: &dyn FileSystem,
    hasher: &dyn ContentHasher,
    source: &DirectoryTree,
    dest: &DirectoryTree,
) -> SyncResult<SyncPlan> {
    let mut plan = SyncPlan {
        dirs_to_create: source.dirs.difference(&dest.dirs).cloned().collect(),
        files_to_delete: dest.files.difference(&source.files).cloned().collect(),
        dirs_to_delete: dest.dirs.difference(&source.dirs).cloned().collect(),
        links_to_remove: dest.links.clone(),
        ..SyncPlan::default()
    };

    for relative in &source.links {
        debug!(path = %relative.display(), "Ignoring source symlink");
    }

    for relative in source.files.difference(&dest.files) {
        debug!(path = %relative.display(), "Source file detected");
        plan.files_to_copy.insert(relative.clone(), DeltaStatus::New);
    }

    for relative in source.files.intersection(&dest.files) {
        match compare_common_file(fs, hasher, &source.root, &dest.root, relative)? {
            DeltaStatus::Unchanged => plan.unchanged += 1,
            status => {
                plan.files_to_copy.insert(relative.clone(), status);
            }
        }
    }

    // Destination file where the source has a directory.
    for relative in &plan.dirs_to_create {
        if plan.files_to_delete.remove(relative) {
            plan.obstructions.insert(relative.clone());
        }
    }

    // Destination directory where the source has a file. Its contents go
    // with it, so nothing beneath it is deleted separately.
    for relative in plan.files_to_copy.keys() {
        if plan.dirs_to_delete.remove(relative) {
            plan.files_to_delete.retain(|p| !p.starts_with(relative));
            plan.dirs_to_delete.retain(|p| !p.starts_with(relative));
            plan.obstructions.insert(relative.clone());
        }
    }

    // A stale entry differing from a source entry only in case is the same
    // node on a case-insensitive destination. Deleting it after the copy
    // would delete the copy, so it goes first.
    let incoming: HashSet<String> = source
        .files
        .iter()
        .chain(&source.dirs)
        .map(|p| fold_case(p))
        .collect();
    let colliding: BTreeSet<PathBuf> = plan
        .files_to_delete
        .iter()
        .chain(&plan.dirs_to_delete)
        .filter(|p| incoming.contains(&fold_case(p)))
        .cloned()
        .collect();
    // Sorted, so a colliding directory is seen before anything inside it.
    for relative in colliding {
        if plan.obstructions.iter().any(|o| relative.starts_with(o)) {
            continue;
        }
        plan.files_to_delete.remove(&relative);
        if plan.dirs_to_delete.remove(&relative) {
            plan.files_to_delete.retain(|p| !p.starts_with(&relative));
            plan.dirs_to_delete.retain(|p| !p.starts_with(&relative));
        }
        debug!(path = %relative.display(), "Case-only name collision");
        plan.obstructions.insert(relative);
    }

    debug!(
        links = plan.links_to_remove.len(),
        obstructions = plan.obstructions.len(),
        dirs_to_create = plan.dirs_to_create.len(),
        files_to_copy = plan.files_to_copy.len(),
        files_to_delete = plan.files_to_delete.len(),
        dirs_to_delete = plan.dirs_to_delete.len(),
        unchanged = plan.unchanged,
        "Computed sync plan"
    );
    Ok(plan)
}
