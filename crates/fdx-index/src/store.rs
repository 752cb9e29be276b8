//! Persistent entry storage on Tantivy.
//!
//! [`IndexStore`] owns the single writer of an index. Mutations accumulate in a
//! pending batch and become visible atomically at [`IndexStore::commit`].
//! Readers work on a [`Snapshot`], which is pinned to the last committed
//! generation and never changes underneath them.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term,
    collector::{Count, DocSetCollector},
    directory::MmapDirectory,
    query::{AllQuery, TermQuery},
    schema::{Field, IndexRecordOption, Value},
    tokenizer::TextAnalyzer,
};
use tracing::{debug, info, warn};

use crate::{
    IndexError, StoreError,
    analyzer::{FDX_TOKENIZER, build_analyzer},
    entry::{Entry, EntryKind},
    scan::EntryScanner,
    schema::IndexSchema,
};

/// Default heap size for the index writer (50 MB).
const DEFAULT_HEAP_SIZE: usize = 50_000_000;

/// Counts from a full rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Entries written.
    pub entries: usize,
    /// Files among them.
    pub files: usize,
    /// Directories among them.
    pub directories: usize,
    /// Entries flagged degraded.
    pub degraded: usize,
}

impl RebuildStats {
    /// Counts one entry.
    fn record(&mut self, entry: &Entry) {
        self.entries += 1;
        match entry.kind {
            EntryKind::File => self.files += 1,
            EntryKind::Directory => self.directories += 1,
        }
        if entry.degraded {
            self.degraded += 1;
        }
    }
}

/// Opens the Tantivy index in `path` with the fdx tokenizer registered.
fn open_index(path: &Path, schema: &IndexSchema, create: bool) -> Result<Index, StoreError> {
    if create {
        fs::create_dir_all(path)?;
    } else if !path.exists() {
        return Err(StoreError::Open {
            path: path.to_path_buf(),
            message: "index directory does not exist".to_string(),
        });
    }

    let dir = MmapDirectory::open(path).map_err(|e| {
        let err: tantivy::TantivyError = e.into();
        StoreError::open(path.to_path_buf(), &err)
    })?;

    let index = if create {
        Index::open_or_create(dir, schema.schema().clone())
    } else {
        Index::open(dir)
    }
    .map_err(|e| StoreError::open(path.to_path_buf(), &e))?;

    index.tokenizers().register(FDX_TOKENIZER, build_analyzer());
    Ok(index)
}

/// Builds a manually reloaded reader.
fn open_reader(path: &Path, index: &Index) -> Result<IndexReader, StoreError> {
    index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()
        .map_err(|e| StoreError::open(path.to_path_buf(), &e))
}

/// The single writer of one index.
pub struct IndexStore {
    /// Index directory.
    path: PathBuf,
    /// The Tantivy index.
    index: Index,
    /// The underlying Tantivy writer; holds the directory lock.
    writer: IndexWriter,
    /// Reader reloaded after each commit.
    reader: IndexReader,
    /// Schema with field handles.
    schema: IndexSchema,
    /// Mutations staged since the last commit or rollback.
    pending: usize,
    /// Set once a rollback fails; the writer refuses further work.
    lost: bool,
}

impl IndexStore {
    /// Opens or creates the index in `path` and takes its writer lock.
    ///
    /// Fails with [`StoreError::Open`] if another writer holds the lock.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let schema = IndexSchema::new();
        let index = open_index(path, &schema, true)?;

        let writer = index
            .writer(DEFAULT_HEAP_SIZE)
            .map_err(|e| StoreError::open(path.to_path_buf(), &e))?;
        let reader = open_reader(path, &index)?;

        Ok(Self {
            path: path.to_path_buf(),
            index,
            writer,
            reader,
            schema,
            pending: 0,
            lost: false,
        })
    }

    /// Returns the index directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of mutations staged since the last commit.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Stages an insert-or-replace of the entry keyed by its path.
    pub fn upsert(&mut self, entry: &Entry) -> Result<(), StoreError> {
        self.writer.delete_term(self.path_term(&entry.path));
        self.add(entry)
    }

    /// Stages removal of the entry at `path`. A missing entry is not an error.
    pub fn delete(&mut self, path: &Path) {
        self.writer.delete_term(self.path_term(path));
        self.pending += 1;
    }

    /// Stages removal of the entry at `path` and every entry beneath it.
    pub fn delete_tree(&mut self, path: &Path) {
        let key = path.to_string_lossy();
        self.writer.delete_term(self.path_term(path));
        self.writer
            .delete_term(Term::from_field_text(self.schema.ancestors, &key));
        self.pending += 1;
    }

    /// Stages removal of every entry.
    pub fn delete_all(&mut self) -> Result<(), StoreError> {
        self.check_writer()?;
        self.writer
            .delete_all_documents()
            .map_err(|e| StoreError::write(&e))?;
        self.pending += 1;
        Ok(())
    }

    /// Makes all staged mutations visible at once.
    ///
    /// On failure the batch is rolled back to the last commit and
    /// [`StoreError::Write`] is returned; replaying the batch is safe.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        self.check_writer()?;
        if let Err(e) = self.writer.commit() {
            warn!(index = %self.path.display(), error = %e, "commit failed, rolling back");
            self.rollback()?;
            return Err(StoreError::write(&e));
        }
        debug!(index = %self.path.display(), mutations = self.pending, "committed");
        self.pending = 0;
        self.reader.reload().map_err(|e| StoreError::write(&e))
    }

    /// Discards all staged mutations.
    ///
    /// If the writer cannot be recreated it is marked lost, and every later
    /// write fails with [`StoreError::WriterLost`].
    pub fn rollback(&mut self) -> Result<(), StoreError> {
        self.pending = 0;
        self.check_writer()?;
        if let Err(e) = self.writer.rollback() {
            warn!(index = %self.path.display(), error = %e, "rollback failed, writer lost");
            self.lost = true;
            return Err(StoreError::write(&e));
        }
        Ok(())
    }

    /// Returns a read view of the last committed state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_searcher(self.reader.searcher(), self.schema.clone(), &self.index)
    }

    /// Replaces the whole index with a fresh scan of `root`, in a single commit.
    pub fn rebuild(
        &mut self,
        scanner: &EntryScanner,
        root: &Path,
    ) -> Result<RebuildStats, IndexError> {
        let scan = scanner.scan(root)?;
        self.delete_all()?;

        let mut stats = RebuildStats::default();
        for entry in scan {
            if entry.degraded {
                warn!(path = %entry.path.display(), "indexed degraded entry");
            }
            if let Err(e) = self.add(&entry) {
                self.rollback()?;
                return Err(e.into());
            }
            stats.record(&entry);
        }

        self.commit()?;
        info!(
            root = %root.display(),
            entries = stats.entries,
            degraded = stats.degraded,
            "rebuilt index"
        );
        Ok(stats)
    }

    /// Stages an add without deleting a previous version.
    fn add(&mut self, entry: &Entry) -> Result<(), StoreError> {
        self.check_writer()?;
        let doc = self.to_document(entry);
        self.writer
            .add_document(doc)
            .map_err(|e| StoreError::write(&e))?;
        self.pending += 1;
        Ok(())
    }

    /// Fails if an earlier rollback lost the writer.
    fn check_writer(&self) -> Result<(), StoreError> {
        if self.lost {
            return Err(StoreError::WriterLost(self.path.clone()));
        }
        Ok(())
    }

    /// Builds the unique-key term for a path.
    fn path_term(&self, path: &Path) -> Term {
        Term::from_field_text(self.schema.path, &path.to_string_lossy())
    }

    /// Converts an entry to a Tantivy document.
    fn to_document(&self, entry: &Entry) -> TantivyDocument {
        let s = &self.schema;
        let mut doc = TantivyDocument::new();

        doc.add_text(s.path, entry.path.to_string_lossy());
        doc.add_text(s.rel_path, entry.rel_path.to_string_lossy());
        doc.add_text(s.name, entry.name());
        doc.add_text(s.rel_dir, entry.rel_dir());
        if let Some(parent) = &entry.parent {
            doc.add_text(s.parent, parent.to_string_lossy());
        }
        for ancestor in entry.ancestors() {
            doc.add_text(s.ancestors, ancestor.to_string_lossy());
        }
        doc.add_text(s.kind, entry.kind.as_str());
        if let Some(ext) = &entry.extension {
            doc.add_text(s.extension, ext);
        }
        if let Some(digest) = &entry.content_digest {
            doc.add_text(s.digest, digest);
        }
        doc.add_u64(s.size, entry.size);
        doc.add_i64(s.modified, entry.modified.timestamp_micros());
        if let Some(created) = entry.created {
            doc.add_i64(s.created, created.timestamp_micros());
        }
        doc.add_bool(s.degraded, entry.degraded);
        if let Some(content) = &entry.content {
            doc.add_text(s.content, content);
        }

        doc
    }
}

/// An immutable read view pinned to one committed generation.
///
/// Cloning is cheap; clones share the same generation.
#[derive(Clone)]
pub struct Snapshot {
    /// Tantivy searcher pinned to a generation.
    searcher: Searcher,
    /// Schema with field handles.
    schema: IndexSchema,
    /// Analyzer matching the indexed text fields.
    analyzer: TextAnalyzer,
}

impl Snapshot {
    /// Opens a read-only snapshot of an existing index without taking the writer lock.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let schema = IndexSchema::new();
        let index = open_index(path, &schema, false)?;
        let reader = open_reader(path, &index)?;
        Ok(Self::from_searcher(reader.searcher(), schema, &index))
    }

    /// Wraps a searcher.
    fn from_searcher(searcher: Searcher, schema: IndexSchema, index: &Index) -> Self {
        let analyzer = index
            .tokenizers()
            .get(FDX_TOKENIZER)
            .unwrap_or_else(build_analyzer);
        Self {
            searcher,
            schema,
            analyzer,
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> u64 {
        self.searcher.num_docs()
    }

    /// Returns true if the snapshot holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up the entry at `path`.
    pub fn get(&self, path: &Path) -> Result<Option<Entry>, StoreError> {
        let term = Term::from_field_text(self.schema.path, &path.to_string_lossy());
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let addresses = self
            .searcher
            .search(&query, &DocSetCollector)
            .map_err(|e| StoreError::read(&e))?;

        match addresses.into_iter().next() {
            Some(address) => {
                let doc: TantivyDocument = self
                    .searcher
                    .doc(address)
                    .map_err(|e| StoreError::read(&e))?;
                Ok(Some(self.to_entry(&doc)))
            }
            None => Ok(None),
        }
    }

    /// Returns every entry, sorted by path.
    pub fn entries(&self) -> Result<Vec<Entry>, StoreError> {
        let addresses = self
            .searcher
            .search(&AllQuery, &DocSetCollector)
            .map_err(|e| StoreError::read(&e))?;

        let mut entries = addresses
            .into_iter()
            .map(|address| {
                self.searcher
                    .doc::<TantivyDocument>(address)
                    .map(|doc| self.to_entry(&doc))
                    .map_err(|e| StoreError::read(&e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Counts the indexed direct children of `dir`.
    pub fn count_children(&self, dir: &Path) -> Result<usize, StoreError> {
        let term = Term::from_field_text(self.schema.parent, &dir.to_string_lossy());
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        self.searcher
            .search(&query, &Count)
            .map_err(|e| StoreError::read(&e))
    }

    /// Returns the Tantivy searcher.
    pub(crate) fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    /// Returns the schema.
    pub(crate) fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Returns the analyzer used for the text fields.
    pub(crate) fn analyzer(&self) -> &TextAnalyzer {
        &self.analyzer
    }

    /// Converts a stored document back into an entry.
    pub(crate) fn to_entry(&self, doc: &TantivyDocument) -> Entry {
        let s = &self.schema;
        let text = |field: Field| doc.get_first(field).and_then(|v| v.as_str());
        let micros = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_i64())
                .and_then(DateTime::<Utc>::from_timestamp_micros)
        };

        Entry {
            path: PathBuf::from(text(s.path).unwrap_or_default()),
            rel_path: PathBuf::from(text(s.rel_path).unwrap_or_default()),
            kind: text(s.kind)
                .and_then(EntryKind::parse)
                .unwrap_or(EntryKind::File),
            size: doc.get_first(s.size).and_then(|v| v.as_u64()).unwrap_or(0),
            modified: micros(s.modified).unwrap_or_default(),
            created: micros(s.created),
            content_digest: text(s.digest).map(str::to_string),
            content: text(s.content).map(str::to_string),
            degraded: doc
                .get_first(s.degraded)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            extension: text(s.extension).map(str::to_string),
            parent: text(s.parent).map(PathBuf::from),
        }
    }
}
