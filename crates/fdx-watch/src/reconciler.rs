//! Incremental reconciliation of an index with change notifications.
//!
//! The [`Reconciler`] coalesces [`ChangeEvent`]s into at most one
//! [`PendingMutation`] per path and applies each batch to the index in a single
//! commit. Every mutation re-stats its path, so applying a batch twice is
//! harmless and a failed batch can simply be put back. When the event stream
//! cannot be trusted (overflow, too many pending paths, a directory whose
//! indexed children disagree with disk) the next cycle rebuilds from a full scan.
//! So does any change that brings in a followed symlink, since a full scan visits
//! each link target only once across the whole tree.
//!
//! States: `Idle -> Batching -> Applying -> Idle`, and
//! `Batching -> FullRescan -> Idle`.

use std::{
    collections::{BTreeSet, HashMap, hash_map},
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use fdx_index::{Entry, EntryScanner, IndexStore, ScanError, Snapshot, StoreError};
use tracing::{debug, info, warn};

use crate::{
    WatchError,
    event::{ChangeEvent, ChangeKind, MutationKind, PendingMutation},
};

/// Pending paths tolerated before a batch escalates to a full rescan.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Observable reconciler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// Nothing pending.
    Idle,
    /// Mutations are accumulating.
    Batching,
    /// A batch is being written.
    Applying,
    /// The index is being rebuilt from a full scan.
    FullRescan,
}

/// Counters over the reconciler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Batches committed.
    pub batches: u64,
    /// Mutations applied across committed batches.
    pub mutations: u64,
    /// Full rescans completed.
    pub full_rescans: u64,
    /// When the last completed full rescan started.
    pub last_rescan: Option<DateTime<Utc>>,
    /// Entries written by the last completed full rescan.
    pub last_rescan_entries: u64,
    /// Batches or rescans that failed and were retained for retry.
    pub failures: u64,
    /// Events ignored because they fell outside the root.
    pub ignored_events: u64,
}

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing was pending.
    Empty,
    /// A batch of mutations was committed.
    Applied {
        /// Mutations in the batch.
        mutations: usize,
    },
    /// The index was rebuilt from a full scan.
    Rescanned {
        /// Entries written by the scan.
        entries: usize,
    },
}

/// What a staged batch leaves to verify after it commits.
#[derive(Debug, Default)]
struct Staged {
    /// Directories that received a modify intent.
    modified_dirs: Vec<PathBuf>,
    /// Whether the batch indexed a followed symlink.
    relinked: bool,
}

/// Keeps one root's index consistent with notified changes.
pub struct Reconciler {
    /// Canonical root.
    root: PathBuf,
    /// Scanner applying the root's ignore rules and gating.
    scanner: EntryScanner,
    /// The root's single writer.
    store: IndexStore,
    /// Coalesced intents by path.
    pending: HashMap<PathBuf, PendingMutation>,
    /// Arrival counter.
    next_seq: u64,
    /// Whether the next cycle must rescan.
    escalated: bool,
    /// Pending-set bound.
    max_pending: usize,
    /// Current state.
    state: ReconcilerState,
    /// Lifetime counters.
    stats: ReconcileStats,
}

impl Reconciler {
    /// Creates a reconciler for `root`, which must be an accessible directory.
    pub fn new(root: &Path, scanner: EntryScanner, store: IndexStore) -> Result<Self, ScanError> {
        Ok(Self {
            root: EntryScanner::resolve_root(root)?,
            scanner,
            store,
            pending: HashMap::new(),
            next_seq: 0,
            escalated: false,
            max_pending: DEFAULT_MAX_PENDING,
            state: ReconcilerState::Idle,
            stats: ReconcileStats::default(),
        })
    }

    /// Sets the pending-set bound.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    /// Returns the canonical root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the current state.
    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    /// Returns the lifetime counters.
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Returns the number of pending paths.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if the next cycle has anything to do.
    pub fn has_work(&self) -> bool {
        self.escalated || !self.pending.is_empty()
    }

    /// Returns a snapshot of the last committed state.
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Returns the writer's store.
    pub fn into_store(self) -> IndexStore {
        self.store
    }

    /// Forces the next cycle to rebuild from a full scan.
    pub fn request_full_rescan(&mut self) {
        self.escalate("requested");
    }

    /// Coalesces one event into the pending set.
    pub fn observe(&mut self, event: ChangeEvent) {
        let ChangeEvent {
            path,
            kind,
            observed,
        } = event;
        match kind {
            ChangeKind::Overflow => self.escalate("event overflow"),
            ChangeKind::Created => self.record(path, MutationKind::Create, observed),
            ChangeKind::Modified => self.record(path, MutationKind::Modify, observed),
            ChangeKind::Deleted => self.record(path, MutationKind::Delete, observed),
            ChangeKind::Renamed { from } => {
                self.record(from, MutationKind::Delete, observed);
                self.record(path, MutationKind::Create, observed);
            }
        }
    }

    /// Runs one cycle: a full rescan if escalated, otherwise the pending batch.
    ///
    /// On failure nothing is committed and the work is retained, so calling
    /// again retries it.
    pub fn reconcile(&mut self) -> Result<BatchOutcome, WatchError> {
        if self.escalated {
            return self.full_rescan();
        }
        if self.pending.is_empty() {
            self.state = ReconcilerState::Idle;
            return Ok(BatchOutcome::Empty);
        }

        self.state = ReconcilerState::Applying;
        let mut batch: Vec<PendingMutation> = self.pending.drain().map(|(_, m)| m).collect();
        batch.sort_by(|a, b| (a.observed, a.seq).cmp(&(b.observed, b.seq)));

        let staged = match self.apply_batch(&batch) {
            Ok(staged) => staged,
            Err(e) => {
                if let Err(rollback) = self.store.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                self.requeue(batch);
                return Err(e.into());
            }
        };

        let mutations = batch.len();
        self.stats.batches += 1;
        self.stats.mutations += mutations as u64;
        info!(root = %self.root.display(), mutations, "applied batch");

        if staged.relinked {
            self.escalate("symlink changed");
            return self.full_rescan();
        }
        if let Some(dir) = self.first_child_mismatch(&staged.modified_dirs) {
            info!(dir = %dir.display(), "indexed children differ from disk");
            self.escalate("missed events");
            return self.full_rescan();
        }

        self.state = ReconcilerState::Idle;
        Ok(BatchOutcome::Applied { mutations })
    }

    /// Records an intent, last writer wins.
    fn record(&mut self, path: PathBuf, kind: MutationKind, observed: DateTime<Utc>) {
        if self.escalated {
            return;
        }
        if !path.starts_with(&self.root) || path == self.root {
            debug!(path = %path.display(), "ignoring event outside root");
            self.stats.ignored_events += 1;
            return;
        }

        let mutation = PendingMutation {
            path,
            kind,
            observed,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.insert(mutation);
        self.state = ReconcilerState::Batching;

        if self.pending.len() > self.max_pending {
            self.escalate("too many pending paths");
        }
    }

    /// Inserts unless a newer intent for the same path is already pending.
    fn insert(&mut self, mutation: PendingMutation) {
        match self.pending.entry(mutation.path.clone()) {
            hash_map::Entry::Occupied(mut existing) => {
                if mutation.supersedes(existing.get()) {
                    existing.insert(mutation);
                }
            }
            hash_map::Entry::Vacant(slot) => {
                slot.insert(mutation);
            }
        }
    }

    /// Puts a failed batch back behind anything observed since.
    fn requeue(&mut self, batch: Vec<PendingMutation>) {
        for mutation in batch {
            self.insert(mutation);
        }
        self.stats.failures += 1;
        self.state = ReconcilerState::Batching;
    }

    /// Marks the next cycle as a full rescan and drops pending intents.
    fn escalate(&mut self, reason: &str) {
        if !self.escalated {
            info!(root = %self.root.display(), reason, "escalating to full rescan");
        }
        self.escalated = true;
        self.pending.clear();
        self.state = ReconcilerState::Batching;
    }

    /// Rebuilds the index from a full scan.
    fn full_rescan(&mut self) -> Result<BatchOutcome, WatchError> {
        self.state = ReconcilerState::FullRescan;
        let started = Utc::now();
        match self.store.rebuild(&self.scanner, &self.root) {
            Ok(stats) => {
                self.escalated = false;
                self.stats.full_rescans += 1;
                self.stats.last_rescan = Some(started);
                self.stats.last_rescan_entries = stats.entries as u64;
                self.state = ReconcilerState::Idle;
                Ok(BatchOutcome::Rescanned {
                    entries: stats.entries,
                })
            }
            Err(e) => {
                self.stats.failures += 1;
                self.state = ReconcilerState::Batching;
                Err(e.into())
            }
        }
    }

    /// Stages every mutation and its parent refreshes, then commits once.
    fn apply_batch(&mut self, batch: &[PendingMutation]) -> Result<Staged, StoreError> {
        let before = self.store.snapshot();
        let mut parents = BTreeSet::new();
        let mut staged = Staged::default();

        for mutation in batch {
            let is_dir = self.apply(mutation, &before, &mut staged)?;
            if mutation.kind == MutationKind::Modify && is_dir {
                staged.modified_dirs.push(mutation.path.clone());
            }
            if mutation.kind != MutationKind::Modify
                && let Some(parent) = mutation.path.parent()
                && parent != self.root.as_path()
            {
                parents.insert(parent.to_path_buf());
            }
        }

        let touched: BTreeSet<&PathBuf> = batch.iter().map(|m| &m.path).collect();
        for parent in parents.iter().filter(|p| !touched.contains(p)) {
            match self.scanner.entry_for(&self.root, parent) {
                Some(entry) => self.store.upsert(&entry)?,
                None => self.store.delete_tree(parent),
            }
        }

        self.store.commit()?;
        Ok(staged)
    }

    /// Stages one mutation by re-stating its path. Returns true if the path is
    /// now an indexed directory.
    fn apply(
        &mut self,
        mutation: &PendingMutation,
        before: &Snapshot,
        staged: &mut Staged,
    ) -> Result<bool, StoreError> {
        let path = &mutation.path;
        let Some(entry) = self.scanner.entry_for(&self.root, path) else {
            debug!(path = %path.display(), "removing");
            self.store.delete_tree(path);
            return Ok(false);
        };
        if self.is_followed_link(path) {
            staged.relinked = true;
        }

        let known = before.get(path)?;
        if !entry.is_dir() {
            if known.as_ref().is_some_and(Entry::is_dir) {
                debug!(path = %path.display(), "directory replaced by file");
                self.store.delete_tree(path);
            }
            debug!(path = %path.display(), "upserting file");
            self.store.upsert(&entry)?;
            return Ok(false);
        }

        if mutation.kind == MutationKind::Create || !known.as_ref().is_some_and(Entry::is_dir) {
            debug!(path = %path.display(), "indexing directory subtree");
            staged.relinked |= self.replace_subtree(&entry)?;
        } else {
            debug!(path = %path.display(), "upserting directory");
            self.store.upsert(&entry)?;
        }
        Ok(true)
    }

    /// Replaces whatever is indexed at and below a directory with a fresh walk.
    ///
    /// Returns true if the walk went through a followed symlink.
    fn replace_subtree(&mut self, dir: &Entry) -> Result<bool, StoreError> {
        self.store.delete_tree(&dir.path);
        self.store.upsert(dir)?;
        let mut relinked = false;
        for entry in self.scanner.scan_subtree(&self.root, &dir.path) {
            relinked |= self.is_followed_link(&entry.path);
            self.store.upsert(&entry)?;
        }
        Ok(relinked)
    }

    /// Returns true if `path` is a symlink the scanner follows.
    fn is_followed_link(&self, path: &Path) -> bool {
        self.scanner.options().follow_symlinks
            && fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
    }

    /// Finds a directory whose indexed child count differs from disk.
    fn first_child_mismatch(&self, dirs: &[PathBuf]) -> Option<PathBuf> {
        if dirs.is_empty() {
            return None;
        }
        let snapshot = self.store.snapshot();
        dirs.iter()
            .find(|dir| {
                let on_disk = self.count_disk_children(dir);
                match snapshot.count_children(dir) {
                    Ok(indexed) => indexed != on_disk,
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "cannot count indexed children");
                        false
                    }
                }
            })
            .cloned()
    }

    /// Counts the non-excluded entries directly inside `dir`.
    fn count_disk_children(&self, dir: &Path) -> usize {
        let Ok(read_dir) = fs::read_dir(dir) else {
            return 0;
        };
        let follow = self.scanner.options().follow_symlinks;
        read_dir
            .filter_map(Result::ok)
            .filter(|child| {
                let path = child.path();
                let is_dir = if follow {
                    path.is_dir()
                } else {
                    child.file_type().is_ok_and(|t| t.is_dir())
                };
                !self.scanner.is_excluded(&self.root, &path, is_dir)
            })
            .count()
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use chrono::Duration;
    use fdx_config::IgnoreMatcher;
    use fdx_index::ScanOptions;
    use tempfile::TempDir;

    use super::*;

    /// A scratch tree with a reconciler over it.
    struct Fixture {
        /// Scanned tree.
        tree: TempDir,
        /// Index directory.
        index: TempDir,
        /// Reconciler under test.
        reconciler: Reconciler,
    }

    impl Fixture {
        fn new(files: &[&str]) -> Self {
            let tree = TempDir::new().unwrap();
            for rel in files {
                write(tree.path(), rel, rel);
            }
            let index = TempDir::new().unwrap();
            let mut store = IndexStore::open(index.path()).unwrap();
            store.rebuild(&scanner(), tree.path()).unwrap();
            let reconciler = Reconciler::new(tree.path(), scanner(), store).unwrap();
            Self {
                tree,
                index,
                reconciler,
            }
        }

        fn root(&self) -> PathBuf {
            self.reconciler.root().to_path_buf()
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.root().join(rel)
        }

        /// Relative paths currently indexed.
        fn indexed(&self) -> Vec<String> {
            self.reconciler
                .snapshot()
                .entries()
                .unwrap()
                .into_iter()
                .map(|e| e.rel_path.to_string_lossy().into_owned())
                .collect()
        }

        /// Relative paths a fresh scan produces.
        fn scanned(&self) -> Vec<String> {
            let mut paths: Vec<String> = scanner()
                .scan(self.tree.path())
                .unwrap()
                .map(|e| e.rel_path.to_string_lossy().into_owned())
                .collect();
            paths.sort();
            paths
        }

        /// Indexed entries compared field by field with a fresh scan.
        fn assert_converged(&self) {
            let mut fresh: Vec<Entry> = scanner().scan(self.tree.path()).unwrap().collect();
            fresh.sort_by(|a, b| a.path.cmp(&b.path));
            let indexed = self.reconciler.snapshot().entries().unwrap();
            assert_eq!(indexed, fresh);
        }
    }

    fn scanner() -> EntryScanner {
        let matcher = IgnoreMatcher::compile(&["*.tmp", "build/"], false).unwrap();
        EntryScanner::new(matcher, ScanOptions::default())
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn starts_idle() {
        let f = Fixture::new(&["a.txt"]);
        assert_eq!(f.reconciler.state(), ReconcilerState::Idle);
        assert!(!f.reconciler.has_work());
    }

    #[test]
    fn empty_cycle_is_a_noop() {
        let mut f = Fixture::new(&["a.txt"]);
        assert_eq!(f.reconciler.reconcile().unwrap(), BatchOutcome::Empty);
        assert_eq!(f.reconciler.stats(), ReconcileStats::default());
    }

    #[test]
    fn create_modify_delete_converge() {
        let mut f = Fixture::new(&["a.txt", "docs/b.md"]);

        write(f.tree.path(), "docs/c.md", "new");
        f.reconciler.observe(ChangeEvent::created(f.path("docs/c.md")));
        write(f.tree.path(), "a.txt", "changed content");
        f.reconciler.observe(ChangeEvent::modified(f.path("a.txt")));
        fs::remove_file(f.tree.path().join("docs/b.md")).unwrap();
        f.reconciler.observe(ChangeEvent::deleted(f.path("docs/b.md")));
        assert_eq!(f.reconciler.state(), ReconcilerState::Batching);
        assert_eq!(f.reconciler.pending_len(), 3);

        let outcome = f.reconciler.reconcile().unwrap();
        assert_eq!(outcome, BatchOutcome::Applied { mutations: 3 });
        assert_eq!(f.reconciler.state(), ReconcilerState::Idle);
        f.assert_converged();
    }

    #[test]
    fn same_path_coalesces_to_latest() {
        let mut f = Fixture::new(&["a.txt"]);
        let path = f.path("a.txt");
        let now = Utc::now();

        f.reconciler.observe(ChangeEvent::new(
            ChangeKind::Deleted,
            &path,
            now + Duration::seconds(1),
        ));
        f.reconciler
            .observe(ChangeEvent::new(ChangeKind::Modified, &path, now));
        assert_eq!(f.reconciler.pending_len(), 1);

        fs::remove_file(&path).unwrap();
        f.reconciler.reconcile().unwrap();
        assert!(f.indexed().is_empty());
    }

    #[test]
    fn stale_intent_is_harmless() {
        let mut f = Fixture::new(&["a.txt"]);
        // Delete notified, but the file is back by the time the batch applies.
        f.reconciler.observe(ChangeEvent::deleted(f.path("a.txt")));
        f.reconciler.reconcile().unwrap();
        f.assert_converged();
    }

    #[test]
    fn rename_commits_both_sides_together() {
        let mut f = Fixture::new(&["old/one.txt", "old/two.txt", "keep.txt"]);
        let from = f.path("old");
        let to = f.path("new");
        fs::rename(&from, &to).unwrap();

        f.reconciler.observe(ChangeEvent::renamed(&from, &to));
        assert_eq!(f.reconciler.pending_len(), 2);

        // Nothing is visible until the batch commits.
        let before = f.reconciler.snapshot();
        assert!(before.get(&from).unwrap().is_some());
        assert!(before.get(&to).unwrap().is_none());

        assert_eq!(
            f.reconciler.reconcile().unwrap(),
            BatchOutcome::Applied { mutations: 2 }
        );
        assert_eq!(
            f.indexed(),
            vec!["keep.txt", "new", "new/one.txt", "new/two.txt"]
        );
        assert!(before.get(&from).unwrap().is_some());
        f.assert_converged();
    }

    #[test]
    fn created_directory_brings_its_subtree() {
        let mut f = Fixture::new(&["a.txt"]);
        write(f.tree.path(), "pkg/src/lib.rs", "fn x() {}");
        write(f.tree.path(), "pkg/build/out.o", "");

        f.reconciler.observe(ChangeEvent::created(f.path("pkg")));
        f.reconciler.reconcile().unwrap();

        assert_eq!(f.indexed(), f.scanned());
        assert!(!f.indexed().iter().any(|p| p.contains("build")));
    }

    #[test]
    fn deleted_directory_removes_subtree() {
        let mut f = Fixture::new(&["a.txt", "pkg/one.rs", "pkg/deep/two.rs"]);
        fs::remove_dir_all(f.tree.path().join("pkg")).unwrap();

        f.reconciler.observe(ChangeEvent::deleted(f.path("pkg")));
        f.reconciler.reconcile().unwrap();

        assert_eq!(f.indexed(), vec!["a.txt"]);
    }

    #[test]
    fn excluded_paths_never_enter_the_index() {
        let mut f = Fixture::new(&["a.txt"]);
        write(f.tree.path(), "scratch.tmp", "x");
        write(f.tree.path(), "build/out.o", "x");

        f.reconciler.observe(ChangeEvent::created(f.path("scratch.tmp")));
        f.reconciler.observe(ChangeEvent::created(f.path("build/out.o")));
        f.reconciler.reconcile().unwrap();

        assert_eq!(f.indexed(), vec!["a.txt"]);
    }

    #[test]
    fn parents_are_refreshed() {
        let mut f = Fixture::new(&["docs/a.md"]);
        let docs = f.path("docs");
        write(f.tree.path(), "docs/b.md", "b");

        f.reconciler.observe(ChangeEvent::created(f.path("docs/b.md")));
        f.reconciler.reconcile().unwrap();

        let indexed = f.reconciler.snapshot().get(&docs).unwrap().unwrap();
        let fresh = scanner().entry_for(&f.root(), &docs).unwrap();
        assert_eq!(indexed.modified, fresh.modified);
    }

    #[test]
    fn directory_replaced_by_file_drops_old_children() {
        let mut f = Fixture::new(&["x/a.txt", "keep.txt"]);
        fs::remove_dir_all(f.path("x")).unwrap();
        write(f.tree.path(), "x", "now a file");

        f.reconciler.observe(ChangeEvent::deleted(f.path("x")));
        f.reconciler.observe(ChangeEvent::created(f.path("x")));
        f.reconciler.reconcile().unwrap();

        assert_eq!(f.indexed(), vec!["keep.txt", "x"]);
        f.assert_converged();
    }

    #[test]
    fn directory_modified_into_file_drops_old_children() {
        let mut f = Fixture::new(&["x/a.txt", "keep.txt"]);
        fs::remove_dir_all(f.path("x")).unwrap();
        write(f.tree.path(), "x", "now a file");

        f.reconciler.observe(ChangeEvent::modified(f.path("x")));
        f.reconciler.reconcile().unwrap();

        f.assert_converged();
    }

    #[cfg(unix)]
    #[test]
    fn second_link_to_indexed_target_matches_scan() {
        use std::os::unix::fs::symlink;

        let mut f = Fixture::new(&["real/data.txt"]);
        symlink(f.path("real"), f.path("link_a")).unwrap();
        f.reconciler.request_full_rescan();
        f.reconciler.reconcile().unwrap();
        f.assert_converged();

        symlink(f.path("real"), f.path("link_b")).unwrap();
        f.reconciler.observe(ChangeEvent::created(f.path("link_b")));
        let outcome = f.reconciler.reconcile().unwrap();

        assert!(matches!(outcome, BatchOutcome::Rescanned { .. }));
        assert_eq!(f.indexed(), f.scanned());
        f.assert_converged();
    }

    #[cfg(unix)]
    #[test]
    fn link_inside_created_directory_matches_scan() {
        use std::os::unix::fs::symlink;

        let mut f = Fixture::new(&["real/data.txt"]);
        symlink(f.path("real"), f.path("link_a")).unwrap();
        f.reconciler.request_full_rescan();
        f.reconciler.reconcile().unwrap();

        fs::create_dir(f.path("pkg")).unwrap();
        symlink(f.path("real"), f.path("pkg/inner")).unwrap();
        f.reconciler.observe(ChangeEvent::created(f.path("pkg")));
        f.reconciler.reconcile().unwrap();

        f.assert_converged();
    }

    #[cfg(unix)]
    #[test]
    fn failed_commit_requeues_batch() {
        let mut f = Fixture::new(&["a.txt"]);
        let before = f.indexed();
        write(f.tree.path(), "b.txt", "b");
        f.reconciler.observe(ChangeEvent::created(f.path("b.txt")));

        // The index directory vanishes, so the commit cannot be written.
        fs::remove_dir_all(f.index.path()).unwrap();

        assert!(f.reconciler.reconcile().is_err());
        assert_eq!(f.reconciler.pending_len(), 1);
        assert!(f.reconciler.has_work());
        assert_eq!(f.reconciler.stats().failures, 1);
        assert_eq!(f.reconciler.stats().batches, 0);
        assert_eq!(f.reconciler.state(), ReconcilerState::Batching);
        assert_eq!(f.indexed(), before);
    }

    #[test]
    fn events_outside_root_are_ignored() {
        let mut f = Fixture::new(&["a.txt"]);
        let outside = TempDir::new().unwrap();

        f.reconciler
            .observe(ChangeEvent::created(outside.path().join("x")));
        f.reconciler.observe(ChangeEvent::modified(f.root()));

        assert!(!f.reconciler.has_work());
        assert_eq!(f.reconciler.stats().ignored_events, 2);
    }

    #[test]
    fn rename_out_of_root_is_a_delete() {
        let mut f = Fixture::new(&["a.txt", "b.txt"]);
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("a.txt");
        fs::rename(f.path("a.txt"), &target).unwrap();

        f.reconciler.observe(ChangeEvent::renamed(f.path("a.txt"), &target));
        f.reconciler.reconcile().unwrap();

        assert_eq!(f.indexed(), vec!["b.txt"]);
    }

    #[test]
    fn overflow_escalates_to_full_rescan() {
        let mut f = Fixture::new(&["a.txt"]);
        write(f.tree.path(), "unseen/b.txt", "b");

        f.reconciler.observe(ChangeEvent::overflow());
        assert_eq!(f.reconciler.state(), ReconcilerState::Batching);
        assert!(f.reconciler.has_work());

        let before = Utc::now();
        let outcome = f.reconciler.reconcile().unwrap();
        assert_eq!(outcome, BatchOutcome::Rescanned { entries: 3 });
        let stats = f.reconciler.stats();
        assert_eq!(stats.full_rescans, 1);
        assert_eq!(stats.last_rescan_entries, 3);
        assert!(stats.last_rescan.is_some_and(|t| t >= before));
        assert_eq!(f.reconciler.state(), ReconcilerState::Idle);
        f.assert_converged();
    }

    #[test]
    fn too_many_pending_paths_escalate() {
        let mut f = Fixture::new(&["a.txt"]);
        let root = f.root();
        let mut reconciler = f.reconciler.with_max_pending(2);
        for name in ["x", "y", "z"] {
            reconciler.observe(ChangeEvent::created(root.join(name)));
        }
        assert_eq!(reconciler.pending_len(), 0);
        assert!(reconciler.has_work());

        f.reconciler = reconciler;
        assert!(matches!(
            f.reconciler.reconcile().unwrap(),
            BatchOutcome::Rescanned { .. }
        ));
    }

    #[test]
    fn child_count_mismatch_triggers_rescan() {
        let mut f = Fixture::new(&["docs/a.md"]);
        // Created silently: no event for the new file.
        write(f.tree.path(), "docs/missed.md", "m");

        f.reconciler.observe(ChangeEvent::modified(f.path("docs")));
        let outcome = f.reconciler.reconcile().unwrap();

        assert!(matches!(outcome, BatchOutcome::Rescanned { .. }));
        assert_eq!(f.reconciler.stats().batches, 1);
        assert_eq!(f.reconciler.stats().full_rescans, 1);
        f.assert_converged();
    }

    #[test]
    fn matching_child_count_stays_incremental() {
        let mut f = Fixture::new(&["docs/a.md"]);
        f.reconciler.observe(ChangeEvent::modified(f.path("docs")));
        assert_eq!(
            f.reconciler.reconcile().unwrap(),
            BatchOutcome::Applied { mutations: 1 }
        );
        assert_eq!(f.reconciler.stats().full_rescans, 0);
    }

    #[test]
    fn requested_rescan_runs_once() {
        let mut f = Fixture::new(&["a.txt"]);
        f.reconciler.request_full_rescan();
        assert!(matches!(
            f.reconciler.reconcile().unwrap(),
            BatchOutcome::Rescanned { entries: 1 }
        ));
        assert_eq!(f.reconciler.reconcile().unwrap(), BatchOutcome::Empty);
    }

    #[test]
    fn failed_rescan_is_retained() {
        let mut f = Fixture::new(&["a.txt"]);
        let root = f.root();
        f.reconciler.request_full_rescan();
        fs::rename(&root, root.with_extension("moved")).unwrap();

        assert!(matches!(
            f.reconciler.reconcile(),
            Err(WatchError::Scan(_))
        ));
        assert!(f.reconciler.has_work());
        assert_eq!(f.reconciler.stats().failures, 1);

        fs::rename(root.with_extension("moved"), &root).unwrap();
        assert!(matches!(
            f.reconciler.reconcile().unwrap(),
            BatchOutcome::Rescanned { .. }
        ));
    }
}
