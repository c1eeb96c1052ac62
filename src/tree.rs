//! Root resolution and directory scanning.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{SyncError, SyncResult};
use crate::file_ops::FileSystem;

/// Canonicalizes `path` and checks that it names an existing directory.
///
/// A missing path and a plain file are both reported as
/// [`SyncError::NotADirectory`]; other canonicalization failures keep their
/// I/O cause.
pub fn resolve_root(fs: &dyn FileSystem, path: &Path) -> SyncResult<PathBuf> {
    let canonical = match fs.canonicalize(path) {
        Ok(canonical) => canonical,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SyncError::not_a_directory(path));
        }
        Err(e) => return Err(SyncError::io("resolve", path, e)),
    };

    if !fs.is_dir(&canonical) {
        return Err(SyncError::not_a_directory(path));
    }

    debug!(
        path = %path.display(),
        full_path = %canonical.display(),
        "Folder exists"
    );
    Ok(canonical)
}

/// Files and directories found beneath a root, keyed by path relative to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryTree {
    pub root: PathBuf,
    pub files: BTreeSet<PathBuf>,
    pub dirs: BTreeSet<PathBuf>,
    /// Symbolic links. Nothing beneath a link is scanned.
    pub links: BTreeSet<PathBuf>,
}

impl DirectoryTree {
    /// Recursively enumerates everything beneath `root`, which should already
    /// be canonical. Any enumeration error aborts the scan.
    pub fn scan(fs: &dyn FileSystem, root: &Path) -> SyncResult<Self> {
        let entries = fs.walk(root).map_err(|e| SyncError::io("scan", root, e))?;

        let mut tree = Self {
            root: root.to_path_buf(),
            ..Self::default()
        };

        for entry in entries {
            let relative = entry
                .path
                .strip_prefix(root)
                .map_err(|_| {
                    SyncError::Internal(format!(
                        "Cannot strip prefix {} from {}",
                        root.display(),
                        entry.path.display()
                    ))
                })?
                .to_path_buf();

            if entry.is_symlink {
                tree.links.insert(relative);
            } else if entry.is_dir {
                tree.dirs.insert(relative);
            } else {
                tree.files.insert(relative);
            }
        }

        debug!(
            root = %root.display(),
            files = tree.files.len(),
            dirs = tree.dirs.len(),
            links = tree.links.len(),
            "Scanned directory tree"
        );
        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty() && self.links.is_empty()
    }
}
