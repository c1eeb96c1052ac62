//! File operations for the sync engine.
//!
//! The engine never touches `std::fs` directly; it goes through the
//! [`FileSystem`] capability so the same pipeline runs against the real disk
//! ([`OsFileSystem`]) or an in-memory tree ([`crate::memory_fs::MemoryFileSystem`]).

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub const COPY_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// One entry found beneath a walked root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Absolute path of the entry.
    pub path: PathBuf,
    pub is_dir: bool,
    /// The entry is a symbolic link. Links are reported, never followed.
    pub is_symlink: bool,
}

/// Filesystem primitives the sync engine depends on.
pub trait FileSystem: Send + Sync {
    /// Resolves `path` to an absolute, normalized path. Fails if it does not exist.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    fn is_dir(&self, path: &Path) -> bool;

    /// Every entry beneath `root`, at any depth. The root itself is not
    /// included. Symbolic links are listed as links and not descended into.
    fn walk(&self, root: &Path) -> io::Result<Vec<WalkEntry>>;

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Copies `from` over `to`, replacing any existing file. Returns bytes written.
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Removes a file or a symbolic link. A link is removed itself, never its
    /// target.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub buffer_size: usize,
    pub preserve_mtime: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: COPY_BUFFER_SIZE,
            preserve_mtime: false,
        }
    }
}

/// [`FileSystem`] backed by the host operating system.
#[derive(Debug, Clone, Default)]
pub struct OsFileSystem {
    copy_options: CopyOptions,
}

impl OsFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_copy_options(copy_options: CopyOptions) -> Self {
        Self { copy_options }
    }
}

impl FileSystem for OsFileSystem {
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        path.canonicalize()
    }

    fn is_dir(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    fn walk(&self, root: &Path) -> io::Result<Vec<WalkEntry>> {
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(root).follow_links(false).min_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            let is_symlink = entry.file_type().is_symlink();
            entries.push(WalkEntry {
                path: entry.path().to_path_buf(),
                is_dir: !is_symlink && entry.file_type().is_dir(),
                is_symlink,
            });
        }
        Ok(entries)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        copy_file_streaming(from, to, &self.copy_options)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            // Directory links on Windows only go away with remove_dir.
            Err(_) if cfg!(windows) && is_symlink(path) => fs::remove_dir(path),
            result => result,
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Streams `source` into `dest` through a single bounded buffer, truncating
/// any previous content of `dest`.
pub fn copy_file_streaming(source: &Path, dest: &Path, options: &CopyOptions) -> io::Result<u64> {
    let mut src_file = File::open(source)?;
    let src_metadata = src_file.metadata()?;

    let mut dest_file = File::create(dest)?;
    let mut buffer = vec![0u8; options.buffer_size.max(1)];
    let mut bytes_copied = 0u64;

    loop {
        let bytes_read = src_file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        dest_file.write_all(&buffer[..bytes_read])?;
        bytes_copied += bytes_read as u64;
    }

    dest_file.sync_all()?;

    if options.preserve_mtime {
        filetime::set_file_mtime(
            dest,
            filetime::FileTime::from_system_time(src_metadata.modified()?),
        )?;
    }

    Ok(bytes_copied)
}
