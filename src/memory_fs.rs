//! In-memory [`FileSystem`] used to exercise the engine without touching disk.
//!
//! Paths are normalized lexically against a virtual `/` root. Every write to a
//! file bumps a per-file version counter, which stands in for the
//! modification time when checking that unchanged files are left alone.
//! Symbolic links are stored as plain nodes; copying onto one writes through
//! to its target, as the host filesystem does. A tree built with
//! [`MemoryFileSystem::case_insensitive`] resolves names regardless of case
//! and keeps the spelling an entry was first created with.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::file_ops::{FileSystem, WalkEntry};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { data: Vec<u8>, version: u64 },
    Link { target: PathBuf },
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    next_version: u64,
    failures: HashSet<PathBuf>,
    fold_case: bool,
}

impl State {
    /// Stored spelling of a normalized `path`.
    fn key(&self, path: &Path) -> PathBuf {
        if !self.fold_case {
            return path.to_path_buf();
        }
        let mut resolved = PathBuf::from("/");
        for component in path.components().skip(1) {
            let candidate = resolved.join(component);
            let folded = fold(&candidate);
            resolved = self
                .nodes
                .keys()
                .find(|existing| fold(existing) == folded)
                .cloned()
                .unwrap_or(candidate);
        }
        resolved
    }

    fn check_failure(&self, path: &Path) -> io::Result<()> {
        if self.failures.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("injected failure at {}", path.display()),
            ));
        }
        Ok(())
    }

    fn next_version(&mut self) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        version
    }
}

/// Shared handle to an in-memory tree. Clones see the same tree.
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    state: Arc<RwLock<State>>,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

fn fold(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::with_case_folding(false)
    }

    /// A tree that treats names differing only in case as the same entry.
    pub fn case_insensitive() -> Self {
        Self::with_case_folding(true)
    }

    fn with_case_folding(fold_case: bool) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::Dir);
        Self {
            state: Arc::new(RwLock::new(State {
                nodes,
                next_version: 1,
                failures: HashSet::new(),
                fold_case,
            })),
        }
    }

    /// Creates a directory and any missing parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let _ = self.create_dir_all(path.as_ref());
    }

    /// Writes a file, creating missing parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let path = normalize(path.as_ref());
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        let mut state = self.state.write();
        let key = state.key(&path);
        let version = state.next_version();
        state.nodes.insert(
            key,
            Node::File {
                data: contents.as_ref().to_vec(),
                version,
            },
        );
    }

    /// Creates a symbolic link at `path` pointing to `target`, creating
    /// missing parent directories. The target need not exist.
    pub fn add_link(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let path = normalize(path.as_ref());
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        let mut state = self.state.write();
        let key = state.key(&path);
        state.nodes.insert(
            key,
            Node::Link {
                target: target.as_ref().to_path_buf(),
            },
        );
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let state = self.state.read();
        match state.nodes.get(&state.key(&normalize(path.as_ref()))) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Write counter of a file; changes every time the file is (re)written.
    pub fn version(&self, path: impl AsRef<Path>) -> Option<u64> {
        let state = self.state.read();
        match state.nodes.get(&state.key(&normalize(path.as_ref()))) {
            Some(Node::File { version, .. }) => Some(*version),
            _ => None,
        }
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        let state = self.state.read();
        state.nodes.contains_key(&state.key(&normalize(path.as_ref())))
    }

    pub fn is_link(&self, path: impl AsRef<Path>) -> bool {
        let state = self.state.read();
        matches!(
            state.nodes.get(&state.key(&normalize(path.as_ref()))),
            Some(Node::Link { .. })
        )
    }

    /// Files beneath `root` as relative paths, sorted. Links are not files.
    pub fn files_under(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        self.entries_under(root.as_ref(), |node| matches!(node, Node::File { .. }))
    }

    /// Directories beneath `root` as relative paths, sorted.
    pub fn dirs_under(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        self.entries_under(root.as_ref(), |node| matches!(node, Node::Dir))
    }

    /// Makes every subsequent operation on `path` fail with an I/O error.
    pub fn fail_on(&self, path: impl AsRef<Path>) {
        let mut state = self.state.write();
        let key = state.key(&normalize(path.as_ref()));
        state.failures.insert(key);
    }

    fn entries_under(&self, root: &Path, wanted: fn(&Node) -> bool) -> Vec<PathBuf> {
        let state = self.state.read();
        let root = state.key(&normalize(root));
        state
            .nodes
            .iter()
            .filter(|(path, node)| **path != root && path.starts_with(&root) && wanted(node))
            .filter_map(|(path, _)| path.strip_prefix(&root).ok().map(Path::to_path_buf))
            .collect()
    }
}

impl FileSystem for MemoryFileSystem {
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let state = self.state.read();
        let key = state.key(&normalize(path));
        if state.nodes.contains_key(&key) {
            Ok(key)
        } else {
            Err(not_found(path))
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        let state = self.state.read();
        matches!(state.nodes.get(&state.key(&normalize(path))), Some(Node::Dir))
    }

    fn walk(&self, root: &Path) -> io::Result<Vec<WalkEntry>> {
        let state = self.state.read();
        let root = state.key(&normalize(root));
        state.check_failure(&root)?;
        match state.nodes.get(&root) {
            Some(Node::Dir) => {}
            _ => return Err(not_found(&root)),
        }
        // An unreadable subdirectory aborts enumeration, as walkdir does.
        if let Some(path) = state
            .failures
            .iter()
            .find(|path| path.starts_with(&root) && matches!(state.nodes.get(*path), Some(Node::Dir)))
        {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot read directory {}", path.display()),
            ));
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(path, _)| **path != root && path.starts_with(&root))
            .map(|(path, node)| WalkEntry {
                path: path.clone(),
                is_dir: matches!(node, Node::Dir),
                is_symlink: matches!(node, Node::Link { .. }),
            })
            .collect())
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let state = self.state.read();
        let path = state.key(&normalize(path));
        state.check_failure(&path)?;
        match state.nodes.get(&path) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            _ => Err(not_found(&path)),
        }
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let mut state = self.state.write();
        let from = state.key(&normalize(from));
        let mut to = state.key(&normalize(to));
        state.check_failure(&from)?;
        state.check_failure(&to)?;

        let data = match state.nodes.get(&from) {
            Some(Node::File { data, .. }) => data.clone(),
            _ => return Err(not_found(&from)),
        };
        if let Some(Node::Link { target }) = state.nodes.get(&to) {
            let base = to.parent().unwrap_or(Path::new("/")).join(target);
            to = state.key(&normalize(&base));
        }
        match to.parent().and_then(|parent| state.nodes.get(parent)) {
            Some(Node::Dir) => {}
            _ => return Err(not_found(&to)),
        }
        if matches!(state.nodes.get(&to), Some(Node::Dir)) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a directory", to.display()),
            ));
        }

        let len = data.len() as u64;
        let version = state.next_version();
        state.nodes.insert(to, Node::File { data, version });
        Ok(len)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.write();
        let path = state.key(&normalize(path));
        state.check_failure(&path)?;
        match state.nodes.get(&path) {
            Some(Node::File { .. }) | Some(Node::Link { .. }) => {
                state.nodes.remove(&path);
                Ok(())
            }
            _ => Err(not_found(&path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.write();
        let path = state.key(&normalize(path));
        state.check_failure(&path)?;
        let mut current = PathBuf::from("/");
        for component in path.components().skip(1) {
            current.push(component);
            match state.nodes.get(&current) {
                Some(Node::Dir) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} is not a directory", current.display()),
                    ))
                }
                None => {
                    state.nodes.insert(current.clone(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.write();
        let path = state.key(&normalize(path));
        state.check_failure(&path)?;
        match state.nodes.get(&path) {
            Some(Node::Dir) => {
                state.nodes.retain(|candidate, _| !candidate.starts_with(&path));
                Ok(())
            }
            _ => Err(not_found(&path)),
        }
    }
}
