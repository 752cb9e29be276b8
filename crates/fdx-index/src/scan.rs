//! Filesystem walking.
//!
//! The [`EntryScanner`] turns a directory tree into [`Entry`] values: pre-order,
//! directories before files among siblings, each group sorted by name. Excluded
//! directories are pruned, symlinks are followed at most once per target, and any
//! failure below the root produces a degraded entry instead of an error.

use std::{
    cmp::Ordering,
    collections::HashSet,
    fs::{self, Metadata},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
    time::Duration,
};

use chrono::DateTime;
use fdx_config::{Config, ConfigError, IgnoreMatcher, IndexingSettings};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{
    ScanError,
    entry::{Entry, EntryKind, content_digest, extension_of, to_utc_micros},
};

/// Extensions whose content is never read.
pub const BINARY_EXTENSIONS: &[&str] = &[
    // Compiled/executable
    "exe", "dll", "so", "dylib", "o", "a", "lib", "obj", "class", "pyc", "pyo", "wasm",
    // Archives
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "jar", "war", "ear",
    // Images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd",
    // Audio/Video
    "mp3", "mp4", "wav", "flac", "ogg", "avi", "mkv", "mov", "wmv", "webm",
    // Documents (binary)
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt",
    // Databases
    "db", "sqlite", "mdb",
    // Fonts
    "ttf", "otf", "woff", "woff2", "eot",
    // Other binary formats
    "bin", "dat", "pak", "bundle",
];

/// Number of leading bytes inspected for NUL when classifying content as binary.
const BINARY_SNIFF_LEN: usize = 8192;

/// Default content read timeout.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Options controlling what a scan reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Whether file content is read and indexed.
    pub index_content: bool,
    /// Largest file whose content is read, in bytes.
    pub max_file_size: u64,
    /// Whether symbolic links are followed.
    pub follow_symlinks: bool,
    /// Upper bound on the time spent reading one file.
    pub read_timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_settings(&IndexingSettings::default(), DEFAULT_READ_TIMEOUT)
    }
}

impl ScanOptions {
    /// Builds scan options from indexing settings.
    pub fn from_settings(settings: &IndexingSettings, read_timeout: Duration) -> Self {
        Self {
            index_content: settings.content,
            max_file_size: settings.max_file_size_bytes(),
            follow_symlinks: settings.follow_symlinks,
            read_timeout,
        }
    }
}

/// Identity of a symlink target, used to follow each target at most once.
#[cfg(unix)]
type TargetId = (u64, u64);

/// Identity of a symlink target, used to follow each target at most once.
#[cfg(not(unix))]
type TargetId = PathBuf;

/// Resolves the identity of the object a path points at.
#[cfg(unix)]
fn target_id(path: &Path) -> Option<TargetId> {
    use std::os::unix::fs::MetadataExt;

    let metadata = fs::metadata(path).ok()?;
    Some((metadata.dev(), metadata.ino()))
}

/// Resolves the identity of the object a path points at.
#[cfg(not(unix))]
fn target_id(path: &Path) -> Option<TargetId> {
    fs::canonicalize(path).ok()
}

/// Sibling order: directories first, then by file name.
fn compare_entries(a: &DirEntry, b: &DirEntry) -> Ordering {
    b.file_type()
        .is_dir()
        .cmp(&a.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// Returns true if the extension marks a file whose content is never read.
pub fn is_binary_extension(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str()))
}

/// Walks directory trees and builds entries.
#[derive(Debug, Clone)]
pub struct EntryScanner {
    /// Compiled ignore rules.
    matcher: IgnoreMatcher,
    /// Read options.
    options: ScanOptions,
}

impl EntryScanner {
    /// Creates a scanner from compiled ignore rules and options.
    pub fn new(matcher: IgnoreMatcher, options: ScanOptions) -> Self {
        Self { matcher, options }
    }

    /// Creates a scanner from a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let matcher = config.compile_matcher()?;
        let options = ScanOptions::from_settings(
            &config.indexing,
            Duration::from_millis(config.watch.read_timeout_ms),
        );
        Ok(Self::new(matcher, options))
    }

    /// Returns the ignore rules.
    pub fn matcher(&self) -> &IgnoreMatcher {
        &self.matcher
    }

    /// Returns the read options.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Canonicalizes a root and checks that it is a directory.
    pub fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
        let canonical = fs::canonicalize(root).map_err(|source| ScanError::RootInaccessible {
            path: root.to_path_buf(),
            source,
        })?;
        if !canonical.is_dir() {
            return Err(ScanError::NotADirectory {
                path: root.to_path_buf(),
            });
        }
        Ok(canonical)
    }

    /// Starts a walk of everything below `root`.
    ///
    /// The root itself is not emitted. Each call restarts the walk from scratch.
    pub fn scan(&self, root: &Path) -> Result<Scan<'_>, ScanError> {
        let root = Self::resolve_root(root)?;
        Ok(self.walk(root.clone(), root))
    }

    /// Walks everything below `dir`, a directory inside the canonical `root`.
    ///
    /// Entries carry paths relative to `root`, and ignore rules see those paths.
    pub fn scan_subtree(&self, root: &Path, dir: &Path) -> Scan<'_> {
        self.walk(root.to_path_buf(), dir.to_path_buf())
    }

    /// Returns true if `path` is outside `root` or excluded by the ignore rules.
    pub fn is_excluded(&self, root: &Path, path: &Path, is_dir: bool) -> bool {
        match path.strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => self.matcher.is_excluded(rel, is_dir),
            _ => true,
        }
    }

    /// Builds the entry for one path under the canonical `root`.
    ///
    /// Returns `None` if the path no longer exists, is the root itself, lies
    /// outside the root, or is excluded. Applies the same gating as a full scan.
    pub fn entry_for(&self, root: &Path, path: &Path) -> Option<Entry> {
        let rel = path.strip_prefix(root).ok()?;
        if rel.as_os_str().is_empty() {
            return None;
        }

        let metadata = match fs::symlink_metadata(path) {
            Ok(m) if m.file_type().is_symlink() && self.options.follow_symlinks => {
                fs::metadata(path).ok()
            }
            Ok(m) => Some(m),
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat entry");
                None
            }
        };

        let is_dir = metadata.as_ref().is_some_and(Metadata::is_dir);
        if self.matcher.is_excluded(rel, is_dir) {
            return None;
        }

        Some(self.build_entry(root, path, is_dir, metadata))
    }

    /// Sets up the walker shared by full and subtree scans.
    fn walk(&self, root: PathBuf, start: PathBuf) -> Scan<'_> {
        let matcher = &self.matcher;
        let filter_root = root.clone();
        let mut seen_targets: HashSet<TargetId> = target_id(&root).into_iter().collect();

        let walker = WalkDir::new(start)
            .min_depth(1)
            .follow_links(self.options.follow_symlinks)
            .sort_by(compare_entries)
            .into_iter()
            .filter_entry(move |dent| {
                let Ok(rel) = dent.path().strip_prefix(&filter_root) else {
                    return false;
                };
                if matcher.is_excluded(rel, dent.file_type().is_dir()) {
                    return false;
                }
                if dent.path_is_symlink()
                    && let Some(id) = target_id(dent.path())
                    && !seen_targets.insert(id)
                {
                    debug!(path = %dent.path().display(), "symlink target already visited");
                    return false;
                }
                true
            });

        Scan {
            scanner: self,
            root,
            walker: Box::new(walker),
        }
    }

    /// Builds an entry from whatever metadata is available.
    ///
    /// Missing metadata, an unreadable directory, or a failed content read
    /// marks the entry degraded.
    fn build_entry(
        &self,
        root: &Path,
        path: &Path,
        is_dir: bool,
        metadata: Option<Metadata>,
    ) -> Entry {
        let rel_path = path
            .strip_prefix(root)
            .map_or_else(|_| path.to_path_buf(), Path::to_path_buf);
        let kind = if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        let mut degraded = metadata.is_none();
        let mut size = 0;
        let mut modified = DateTime::default();
        let mut created = None;
        let mut digest = None;
        let mut content = None;

        if let Some(meta) = &metadata {
            match meta.modified() {
                Ok(time) => modified = to_utc_micros(time),
                Err(_) => degraded = true,
            }
            created = meta.created().ok().map(to_utc_micros);

            if is_dir {
                if let Err(e) = fs::read_dir(path) {
                    warn!(path = %path.display(), error = %e, "cannot list directory");
                    degraded = true;
                }
            } else {
                size = meta.len();
                if meta.is_file() && self.should_read(path, size) {
                    match read_with_timeout(path, self.options.read_timeout) {
                        Ok(bytes) => {
                            digest = Some(content_digest(&bytes));
                            content = decode_text(&bytes);
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "cannot read content");
                            degraded = true;
                        }
                    }
                }
            }
        }

        Entry {
            path: path.to_path_buf(),
            extension: if is_dir { None } else { extension_of(path) },
            parent: path.parent().map(Path::to_path_buf),
            rel_path,
            kind,
            size,
            modified,
            created,
            content_digest: digest,
            content,
            degraded,
        }
    }

    /// Decides whether a file's content is read.
    fn should_read(&self, path: &Path, size: u64) -> bool {
        self.options.index_content
            && size <= self.options.max_file_size
            && !is_binary_extension(path)
    }

    /// Turns a walk error into a degraded entry, if it names an entry not yet emitted.
    fn entry_for_walk_error(&self, root: &Path, err: &walkdir::Error) -> Option<Entry> {
        if err.loop_ancestor().is_some() {
            debug!(path = ?err.path(), "skipping symlink loop");
            return None;
        }

        let path = err.path()?;
        let rel = path.strip_prefix(root).ok()?;
        if rel.as_os_str().is_empty() {
            return None;
        }

        // Directories that fail to list were already emitted and flagged by their own read check.
        if fs::metadata(path).is_ok_and(|m| m.is_dir()) {
            return None;
        }
        if self.matcher.is_excluded(rel, false) {
            return None;
        }

        warn!(path = %path.display(), error = %err, "cannot stat entry");
        Some(self.build_entry(root, path, false, None))
    }
}

/// A lazy walk over a tree, yielding entries in deterministic order.
pub struct Scan<'a> {
    /// Scanner supplying rules and options.
    scanner: &'a EntryScanner,
    /// Canonical root the relative paths are computed against.
    root: PathBuf,
    /// Filtered directory walker.
    walker: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + 'a>,
}

impl Scan<'_> {
    /// Returns the canonical root of this walk.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Iterator for Scan<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            match self.walker.next()? {
                Ok(dent) => {
                    let is_dir = dent.file_type().is_dir();
                    let metadata = dent.metadata().ok();
                    return Some(
                        self.scanner
                            .build_entry(&self.root, dent.path(), is_dir, metadata),
                    );
                }
                Err(err) => {
                    if let Some(entry) = self.scanner.entry_for_walk_error(&self.root, &err) {
                        return Some(entry);
                    }
                }
            }
        }
    }
}

/// Reads a whole file on a helper thread, giving up after `timeout`.
///
/// A read that times out keeps running in the background; its result is dropped.
fn read_with_timeout(path: &Path, timeout: Duration) -> io::Result<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    let owned = path.to_path_buf();
    thread::Builder::new()
        .name("fdx-read".to_string())
        .spawn(move || {
            tx.send(fs::read(&owned)).ok();
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(ErrorKind::TimedOut, "content read timed out")),
    }
}

/// Decodes content as text, or returns `None` if it looks binary.
fn decode_text(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if head.contains(&0) {
        return None;
    }
    Some(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod test {
    use std::fs::File;

    use tempfile::TempDir;

    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn scanner(patterns: &[&str]) -> EntryScanner {
        EntryScanner::new(
            IgnoreMatcher::compile(patterns, false).unwrap(),
            ScanOptions::default(),
        )
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn rel_paths(entries: &[Entry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.rel_path.to_string_lossy().into_owned())
            .collect()
    }

    fn sample_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b.txt", "bravo");
        write(temp.path(), "a.txt", "alpha");
        write(temp.path(), "src/main.rs", "fn main() {}");
        write(temp.path(), "docs/guide.md", "# Guide");
        write(temp.path(), "build/out.o", "obj");
        write(temp.path(), ".git/config", "[core]");
        temp
    }

    #[test]
    fn emits_directories_before_files_in_name_order() {
        let temp = sample_tree();
        let entries: Vec<_> = scanner(&["build/"]).scan(temp.path()).unwrap().collect();

        assert_eq!(
            rel_paths(&entries),
            vec!["docs", "docs/guide.md", "src", "src/main.rs", "a.txt", "b.txt"]
        );
    }

    #[test]
    fn scanning_twice_yields_identical_entries() {
        let temp = sample_tree();
        let scanner = scanner(&[]);

        let first: Vec<_> = scanner.scan(temp.path()).unwrap().collect();
        let second: Vec<_> = scanner.scan(temp.path()).unwrap().collect();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn excluded_directories_are_pruned() {
        let temp = sample_tree();
        write(temp.path(), "web/node_modules/react/index.js", "x");

        let entries: Vec<_> = scanner(&["node_modules/", "build/"])
            .scan(temp.path())
            .unwrap()
            .collect();

        assert!(
            entries
                .iter()
                .all(|e| !e.rel_path.starts_with("web/node_modules")
                    && !e.rel_path.starts_with("build")
                    && !e.rel_path.starts_with(".git"))
        );
        assert!(entries.iter().any(|e| e.rel_path == Path::new("web")));
    }

    #[test]
    fn entries_carry_metadata_and_content() {
        let temp = sample_tree();
        let root = fs::canonicalize(temp.path()).unwrap();
        let entries: Vec<_> = scanner(&[]).scan(temp.path()).unwrap().collect();

        let main = entries
            .iter()
            .find(|e| e.rel_path == Path::new("src/main.rs"))
            .unwrap();
        assert_eq!(main.path, root.join("src/main.rs"));
        assert_eq!(main.kind, EntryKind::File);
        assert_eq!(main.size, 12);
        assert_eq!(main.extension.as_deref(), Some("rs"));
        assert_eq!(main.parent.as_deref(), Some(root.join("src").as_path()));
        assert_eq!(main.content.as_deref(), Some("fn main() {}"));
        assert_eq!(main.content_digest, Some(content_digest(b"fn main() {}")));
        assert!(!main.degraded);

        let src = entries
            .iter()
            .find(|e| e.rel_path == Path::new("src"))
            .unwrap();
        assert_eq!(src.kind, EntryKind::Directory);
        assert_eq!(src.size, 0);
        assert!(src.content_digest.is_none());
    }

    #[test]
    fn content_is_gated_by_size() {
        let temp = TempDir::new().unwrap();
        let prefix = "needle ".repeat(2000);

        for (name, len) in [("large.txt", 11 * MIB), ("small.txt", 9 * MIB)] {
            let path = temp.path().join(name);
            fs::write(&path, &prefix).unwrap();
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_len(len)
                .unwrap();
        }

        let entries: Vec<_> = scanner(&[]).scan(temp.path()).unwrap().collect();
        let large = entries.iter().find(|e| e.name() == "large.txt").unwrap();
        let small = entries.iter().find(|e| e.name() == "small.txt").unwrap();

        assert_eq!(large.size, 11 * MIB);
        assert!(large.content_digest.is_none());
        assert!(large.content.is_none());
        assert!(!large.degraded);

        assert_eq!(small.size, 9 * MIB);
        assert!(small.content_digest.is_some());
        assert!(small.content.as_deref().unwrap().starts_with("needle needle"));
    }

    #[test]
    fn nul_bytes_mark_content_binary() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("blob.txt"), b"text\0more").unwrap();

        let entries: Vec<_> = scanner(&[]).scan(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].content_digest.is_some());
        assert!(entries[0].content.is_none());
    }

    #[test]
    fn binary_extensions_are_not_read() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "image.PNG", "not really a png");

        let entries: Vec<_> = scanner(&[]).scan(temp.path()).unwrap().collect();
        assert!(entries[0].content_digest.is_none());
        assert!(entries[0].content.is_none());
    }

    #[test]
    fn content_can_be_disabled() {
        let temp = sample_tree();
        let options = ScanOptions {
            index_content: false,
            ..ScanOptions::default()
        };
        let scanner = EntryScanner::new(IgnoreMatcher::default(), options);

        assert!(
            scanner
                .scan(temp.path())
                .unwrap()
                .all(|e| e.content.is_none() && e.content_digest.is_none())
        );
    }

    #[test]
    fn root_errors() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "file.txt", "x");
        let scanner = scanner(&[]);

        assert!(matches!(
            scanner.scan(&temp.path().join("missing")),
            Err(ScanError::RootInaccessible { .. })
        ));
        assert!(matches!(
            scanner.scan(&temp.path().join("file.txt")),
            Err(ScanError::NotADirectory { .. })
        ));
    }

    #[test]
    fn entry_for_matches_scan() {
        let temp = sample_tree();
        let root = fs::canonicalize(temp.path()).unwrap();
        let scanner = scanner(&["build/"]);

        for entry in scanner.scan(&root).unwrap() {
            assert_eq!(scanner.entry_for(&root, &entry.path), Some(entry));
        }

        assert!(scanner.entry_for(&root, &root.join("gone.txt")).is_none());
        assert!(scanner.entry_for(&root, &root.join("build/out.o")).is_none());
        assert!(scanner.entry_for(&root, &root).is_none());
        assert!(scanner.entry_for(&root, Path::new("/elsewhere/x")).is_none());
    }

    #[test]
    fn subtree_scan_keeps_root_relative_paths() {
        let temp = sample_tree();
        write(temp.path(), "src/cli/args.rs", "");
        let root = fs::canonicalize(temp.path()).unwrap();

        let entries: Vec<_> = scanner(&[])
            .scan_subtree(&root, &root.join("src"))
            .collect();
        assert_eq!(
            rel_paths(&entries),
            vec!["src/cli", "src/cli/args.rs", "src/main.rs"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_followed_once_per_target() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        write(temp.path(), "real/data.txt", "payload");
        symlink(temp.path().join("real"), temp.path().join("link_a")).unwrap();
        symlink(temp.path().join("real"), temp.path().join("link_b")).unwrap();
        symlink(temp.path(), temp.path().join("loop")).unwrap();

        let entries: Vec<_> = scanner(&[]).scan(temp.path()).unwrap().collect();
        let paths = rel_paths(&entries);

        assert!(paths.contains(&"link_a/data.txt".to_string()));
        assert!(!paths.contains(&"link_b".to_string()));
        assert!(!paths.iter().any(|p| p.starts_with("loop")));
        assert!(paths.contains(&"real/data.txt".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_entries_are_degraded() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        write(temp.path(), "secret.txt", "hidden");
        write(temp.path(), "locked/inner.txt", "hidden");
        write(temp.path(), "open.txt", "visible");
        let secret = temp.path().join("secret.txt");
        let locked = temp.path().join("locked");
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind a privileged user.
        let privileged = fs::read(&secret).is_ok();
        let entries: Vec<_> = scanner(&[]).scan(temp.path()).unwrap().collect();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        if privileged {
            return;
        }

        let find = |name: &str| entries.iter().find(|e| e.rel_path == Path::new(name));
        let secret = find("secret.txt").unwrap();
        assert!(secret.degraded);
        assert!(secret.content.is_none());
        assert!(secret.content_digest.is_none());
        assert!(find("locked").unwrap().degraded);
        assert!(find("locked/inner.txt").is_none());
        assert!(!find("open.txt").unwrap().degraded);
    }

    #[cfg(unix)]
    #[test]
    fn content_read_timeout_is_degraded() {
        use std::process::Command;

        let temp = TempDir::new().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        write(&root, "plain.txt", "x");
        let fifo = root.join("stalled.txt");
        let status = Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(status.success());

        let options = ScanOptions {
            read_timeout: Duration::from_millis(50),
            ..ScanOptions::default()
        };
        let scanner = EntryScanner::new(IgnoreMatcher::default(), options);

        // A reader of the pipe blocks until a writer shows up.
        let err = read_with_timeout(&fifo, Duration::from_millis(50)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);

        let regular = fs::metadata(root.join("plain.txt")).unwrap();
        let entry = scanner.build_entry(&root, &fifo, false, Some(regular));
        assert!(entry.degraded);
        assert!(entry.content.is_none());
        assert!(entry.content_digest.is_none());

        // Release the blocked readers.
        drop(File::options().write(true).open(&fifo).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn broken_symlink_is_degraded() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        symlink(temp.path().join("nowhere"), temp.path().join("dangling")).unwrap();

        let entries: Vec<_> = scanner(&[]).scan(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].degraded);
        assert_eq!(entries[0].name(), "dangling");
    }
}
