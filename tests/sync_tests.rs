//! End-to-end mirroring on real temporary directories.

use filetime::FileTime;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use treemirror_lib::file_ops::CopyOptions;
use treemirror_lib::{
    HashAlgorithm, OsFileSystem, SyncEngine, SyncError, SyncOptions, SyncReport,
};

struct Fixture {
    _tmp: TempDir,
    source: PathBuf,
    dest: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        let dest = tmp.path().join("destination");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();
        Self {
            _tmp: tmp,
            source,
            dest,
        }
    }

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn sync_with(&self, hash: HashAlgorithm) -> Result<SyncReport, SyncError> {
        let engine = SyncEngine::new(Arc::new(OsFileSystem::new()), Arc::from(hash.hasher()));
        engine.sync(&self.source, &self.dest)
    }

    fn sync(&self) -> SyncReport {
        self.sync_with(HashAlgorithm::Xxh3).unwrap()
    }
}

/// Every file under `root` with its content, keyed by relative path.
fn snapshot(root: &Path) -> BTreeMap<String, String> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(Result::unwrap)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap();
            (
                relative.to_string_lossy().replace('\\', "/"),
                fs::read_to_string(e.path()).unwrap(),
            )
        })
        .collect()
}

fn mtime(path: &Path) -> FileTime {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap())
}

fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn populates_empty_destination() {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "a.txt", "X");
    Fixture::write(&fx.source, "sub/b.txt", "Y");

    let report = fx.sync();

    assert_eq!(snapshot(&fx.dest), files(&[("a.txt", "X"), ("sub/b.txt", "Y")]));
    assert_eq!(report.files_new, 2);
}

#[test]
fn keeps_matching_file_untouched_and_removes_stale() {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "a.txt", "X");
    Fixture::write(&fx.dest, "a.txt", "X");
    Fixture::write(&fx.dest, "stale.txt", "Z");
    let old = FileTime::from_unix_time(1_000_000_000, 0);
    filetime::set_file_mtime(fx.dest.join("a.txt"), old).unwrap();

    let report = fx.sync();

    assert_eq!(snapshot(&fx.dest), files(&[("a.txt", "X")]));
    assert_eq!(mtime(&fx.dest.join("a.txt")), old);
    assert_eq!(report.files_unchanged, 1);
    assert_eq!(report.files_deleted, 1);
}

#[test]
fn empty_source_clears_destination() {
    let fx = Fixture::new();
    Fixture::write(&fx.dest, "x/y.txt", "Q");

    fx.sync();

    assert!(!fx.dest.join("x").exists());
    assert_eq!(fs::read_dir(&fx.dest).unwrap().count(), 0);
}

#[test]
fn second_run_is_idempotent() {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "a.txt", "X");
    Fixture::write(&fx.source, "deep/er/b.txt", "Y");
    fx.sync();

    let old = FileTime::from_unix_time(1_000_000_000, 0);
    for file in ["a.txt", "deep/er/b.txt"] {
        filetime::set_file_mtime(fx.dest.join(file), old).unwrap();
    }
    let before = snapshot(&fx.dest);

    let report = fx.sync();

    assert!(report.is_noop());
    assert_eq!(report.files_unchanged, 2);
    assert_eq!(snapshot(&fx.dest), before);
    assert_eq!(mtime(&fx.dest.join("a.txt")), old);
    assert_eq!(mtime(&fx.dest.join("deep/er/b.txt")), old);
}

#[test]
fn changed_content_is_copied_even_with_same_size() {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "a.txt", "AAAA");
    Fixture::write(&fx.dest, "a.txt", "BBBB");
    // Give the stale copy the same mtime so only content can tell them apart.
    let t = FileTime::from_unix_time(1_500_000_000, 0);
    filetime::set_file_mtime(fx.source.join("a.txt"), t).unwrap();
    filetime::set_file_mtime(fx.dest.join("a.txt"), t).unwrap();

    let report = fx.sync();

    assert_eq!(report.files_updated, 1);
    assert_eq!(fs::read_to_string(fx.dest.join("a.txt")).unwrap(), "AAAA");
}

#[test]
fn creates_all_intermediate_directories() {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "one/two/three/four/leaf.txt", "L");

    fx.sync();

    for dir in ["one", "one/two", "one/two/three", "one/two/three/four"] {
        assert!(fx.dest.join(dir).is_dir(), "{dir} missing");
    }
    assert_eq!(
        fs::read_to_string(fx.dest.join("one/two/three/four/leaf.txt")).unwrap(),
        "L"
    );
}

#[test]
fn empty_source_directories_are_mirrored() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.source.join("empty/nested")).unwrap();

    let report = fx.sync();

    assert!(fx.dest.join("empty/nested").is_dir());
    assert_eq!(report.dirs_created, 2);
}

#[test]
fn rename_in_source_moves_in_destination() {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "old-name.txt", "content");
    fx.sync();

    fs::rename(fx.source.join("old-name.txt"), fx.source.join("new-name.txt")).unwrap();
    fx.sync();

    assert_eq!(snapshot(&fx.dest), files(&[("new-name.txt", "content")]));
}

#[rstest]
#[case::xxh3(HashAlgorithm::Xxh3)]
#[case::sha256(HashAlgorithm::Sha256)]
fn converges_with_every_hash_algorithm(#[case] hash: HashAlgorithm) {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "keep.txt", "same");
    Fixture::write(&fx.source, "edit.txt", "after");
    Fixture::write(&fx.source, "dir/new.txt", "new");
    Fixture::write(&fx.dest, "keep.txt", "same");
    Fixture::write(&fx.dest, "edit.txt", "before");
    Fixture::write(&fx.dest, "gone/old.txt", "old");

    let report = fx.sync_with(hash).unwrap();

    assert_eq!(snapshot(&fx.dest), snapshot(&fx.source));
    assert!(!fx.dest.join("gone").exists());
    assert_eq!(
        (report.files_new, report.files_updated, report.files_unchanged),
        (1, 1, 1)
    );
}

#[rstest]
#[case::missing_source("missing", "destination")]
#[case::missing_destination("source", "missing")]
#[case::source_is_file("file.txt", "destination")]
fn invalid_roots_abort_without_changes(#[case] source: &str, #[case] dest: &str) {
    let fx = Fixture::new();
    let base = fx.source.parent().unwrap().to_path_buf();
    fs::write(base.join("file.txt"), "not a dir").unwrap();
    Fixture::write(&fx.source, "a.txt", "X");
    Fixture::write(&fx.dest, "stale.txt", "Z");

    let engine = SyncEngine::new(Arc::new(OsFileSystem::new()), Arc::from(HashAlgorithm::Xxh3.hasher()));
    let err = engine.sync(&base.join(source), &base.join(dest)).unwrap_err();

    assert!(matches!(err, SyncError::NotADirectory { .. }), "{err}");
    assert_eq!(snapshot(&fx.dest), files(&[("stale.txt", "Z")]));
}

#[test]
fn relative_roots_are_resolved() {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "a.txt", "X");
    let dotted = fx.source.join("..").join("source");

    let engine = SyncEngine::new(Arc::new(OsFileSystem::new()), Arc::from(HashAlgorithm::Xxh3.hasher()));
    let report = engine.sync(&dotted, &fx.dest).unwrap();

    assert_eq!(report.source, fx.source.canonicalize().unwrap());
    assert_eq!(snapshot(&fx.dest), files(&[("a.txt", "X")]));
}

#[test]
fn destination_inside_source_is_rejected() {
    let fx = Fixture::new();
    let inner = fx.source.join("mirror");
    fs::create_dir_all(&inner).unwrap();

    let engine = SyncEngine::new(Arc::new(OsFileSystem::new()), Arc::from(HashAlgorithm::Xxh3.hasher()));
    let err = engine.sync(&fx.source, &inner).unwrap_err();

    assert!(matches!(err, SyncError::OverlappingRoots { .. }));
}

#[test]
fn dry_run_leaves_destination_alone() {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "a.txt", "X");
    Fixture::write(&fx.dest, "stale.txt", "Z");

    let engine = SyncEngine::with_options(
        Arc::new(OsFileSystem::new()),
        Arc::from(HashAlgorithm::Xxh3.hasher()),
        SyncOptions { dry_run: true },
    );
    let report = engine.sync(&fx.source, &fx.dest).unwrap();

    assert!(report.dry_run);
    assert_eq!(report.files_new, 1);
    assert_eq!(report.files_deleted, 1);
    assert_eq!(snapshot(&fx.dest), files(&[("stale.txt", "Z")]));
}

#[test]
fn preserve_mtime_copies_source_timestamp() {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "a.txt", "X");
    let t = FileTime::from_unix_time(1_234_567_890, 0);
    filetime::set_file_mtime(fx.source.join("a.txt"), t).unwrap();

    let fs_impl = OsFileSystem::with_copy_options(CopyOptions {
        preserve_mtime: true,
        ..CopyOptions::default()
    });
    let engine = SyncEngine::new(Arc::new(fs_impl), Arc::from(HashAlgorithm::Xxh3.hasher()));
    engine.sync(&fx.source, &fx.dest).unwrap();

    assert_eq!(mtime(&fx.dest.join("a.txt")), t);
}

#[test]
fn file_and_directory_swaps_converge() {
    let fx = Fixture::new();
    Fixture::write(&fx.source, "node/child.txt", "C");
    Fixture::write(&fx.source, "leaf", "L");
    Fixture::write(&fx.dest, "node", "was a file");
    Fixture::write(&fx.dest, "leaf/old/inner.txt", "was a dir");

    let report = fx.sync();

    assert_eq!(report.obstructions_removed, 2);
    assert_eq!(snapshot(&fx.dest), files(&[("leaf", "L"), ("node/child.txt", "C")]));
}

#[cfg(unix)]
#[test]
fn destination_symlinks_are_replaced_without_touching_their_targets() {
    use std::os::unix::fs::symlink;

    let fx = Fixture::new();
    let base = fx.source.parent().unwrap().to_path_buf();
    fs::write(base.join("outside.txt"), "PRECIOUS").unwrap();
    Fixture::write(&base, "outside_dir/keep.txt", "KEEP");
    Fixture::write(&fx.source, "a.txt", "FROM_SOURCE");
    Fixture::write(&fx.source, "sub/b.txt", "B");
    symlink(base.join("outside.txt"), fx.source.join("source_link")).unwrap();
    symlink("../outside.txt", fx.dest.join("a.txt")).unwrap();
    symlink("../outside.txt", fx.dest.join("orphan_link")).unwrap();
    symlink(base.join("outside_dir"), fx.dest.join("sub")).unwrap();

    let report = fx.sync();

    assert_eq!(report.links_removed, 3);
    assert_eq!(fs::read_to_string(base.join("outside.txt")).unwrap(), "PRECIOUS");
    assert_eq!(snapshot(&base.join("outside_dir")), files(&[("keep.txt", "KEEP")]));
    assert!(!fs::symlink_metadata(fx.dest.join("a.txt")).unwrap().file_type().is_symlink());
    assert!(fs::symlink_metadata(fx.dest.join("orphan_link")).is_err());
    assert!(!fs::symlink_metadata(fx.dest.join("sub")).unwrap().file_type().is_symlink());
    assert!(!fx.dest.join("source_link").exists());
    assert_eq!(snapshot(&fx.dest), files(&[("a.txt", "FROM_SOURCE"), ("sub/b.txt", "B")]));
}
