//! Index schema definition for the fdx index.
//!
//! One document per entry:
//! - `path`: absolute path, the unique key (raw, stored)
//! - `rel_path`: path relative to the root (stored only)
//! - `name`: final path component (text, stored)
//! - `rel_dir`: relative parent directory (text, stored)
//! - `parent`: absolute parent path (raw, stored) for child counting
//! - `ancestors`: every absolute ancestor below the root (raw, multi-valued) for subtree deletes
//! - `kind`, `extension`, `digest`: raw, stored
//! - `size`: bytes (u64, indexed, fast)
//! - `modified`, `created`: microseconds since the epoch (i64)
//! - `degraded`: bool
//! - `content`: decoded text (text, stored)

use tantivy::schema::{
    FAST, Field, INDEXED, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing,
    TextOptions,
};

use crate::analyzer::FDX_TOKENIZER;

/// Handles to all fields in the index schema.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    /// The underlying Tantivy schema.
    schema: Schema,
    /// Absolute path, the unique key.
    pub path: Field,
    /// Path relative to the root.
    pub rel_path: Field,
    /// Final path component.
    pub name: Field,
    /// Relative parent directory.
    pub rel_dir: Field,
    /// Absolute parent path.
    pub parent: Field,
    /// Absolute ancestor paths.
    pub ancestors: Field,
    /// `file` or `directory`.
    pub kind: Field,
    /// Lower-cased extension.
    pub extension: Field,
    /// Content digest.
    pub digest: Field,
    /// Size in bytes.
    pub size: Field,
    /// Modification time in microseconds.
    pub modified: Field,
    /// Creation time in microseconds.
    pub created: Field,
    /// Degraded flag.
    pub degraded: Field,
    /// Text content.
    pub content: Field,
}

impl IndexSchema {
    /// Creates a new index schema with all fields configured.
    pub fn new() -> Self {
        let mut builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(FDX_TOKENIZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let path = builder.add_text_field("path", STRING | STORED);
        let rel_path = builder.add_text_field("rel_path", STORED);
        let name = builder.add_text_field("name", text_options.clone());
        let rel_dir = builder.add_text_field("rel_dir", text_options.clone());
        let parent = builder.add_text_field("parent", STRING | STORED);
        let ancestors = builder.add_text_field("ancestors", STRING);
        let kind = builder.add_text_field("kind", STRING | STORED);
        let extension = builder.add_text_field("extension", STRING | STORED);
        let digest = builder.add_text_field("digest", STRING | STORED);
        let size = builder.add_u64_field("size", INDEXED | STORED | FAST);
        let modified = builder.add_i64_field("modified", INDEXED | STORED | FAST);
        let created = builder.add_i64_field("created", STORED);
        let degraded = builder.add_bool_field("degraded", INDEXED | STORED);
        let content = builder.add_text_field("content", text_options);

        let schema = builder.build();

        Self {
            schema,
            path,
            rel_path,
            name,
            rel_dir,
            parent,
            ancestors,
            kind,
            extension,
            digest,
            size,
            modified,
            created,
            degraded,
            content,
        }
    }

    /// Returns a reference to the underlying Tantivy schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl Default for IndexSchema {
    fn default() -> Self {
        Self::new()
    }
}
