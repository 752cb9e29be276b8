//! Filesystem entry index for fdx.
//!
//! This crate provides the indexing core:
//! - Walking a root into [`Entry`] values with [`EntryScanner`]
//! - Persisting entries in a Tantivy index with [`IndexStore`]
//! - Reading committed state through immutable [`Snapshot`]s
//! - Ranking structured [`Query`]s with [`QueryEngine`]
//! - Tracking indexed roots in the [`Registry`]
//!
//! # Example
//!
//! ```no_run
//! use fdx_index::{EntryScanner, IndexStore, Query, QueryEngine, Target};
//!
//! let scanner = EntryScanner::new(Default::default(), Default::default());
//! let mut store = IndexStore::open("./index".as_ref()).unwrap();
//! store.rebuild(&scanner, "./docs".as_ref()).unwrap();
//!
//! let query = Query::new(Target::Term("report".to_string()));
//! for result in QueryEngine::execute(&query, &store.snapshot()).unwrap() {
//!     println!("{:.1} {}", result.score, result.entry.rel_path.display());
//! }
//! ```

#![warn(missing_docs)]

mod analyzer;
mod entry;
mod error;
mod query;
mod ranges;
mod registry;
mod scan;
mod schema;
mod stats;
mod store;

pub use analyzer::{FDX_TOKENIZER, build_analyzer, tokenize};
pub use entry::{Entry, EntryKind, content_digest, extension_of, to_utc_micros};
pub use error::{IndexError, QueryError, RegistryError, ScanError, StoreError};
pub use query::{Filters, Highlights, Query, QueryEngine, ScoredResult, Target, weight};
pub use ranges::merge_ranges;
pub use registry::{
    DATA_DIR_ENV, IndexRoot, IndexStatus, Registry, SCHEMA_VERSION, config_hash,
    default_data_dir,
};
pub use scan::{EntryScanner, Scan, ScanOptions, is_binary_extension};
pub use stats::IndexStats;
pub use store::{IndexStore, RebuildStats, Snapshot};
