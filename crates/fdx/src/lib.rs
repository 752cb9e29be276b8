//! fdx: fast file and directory indexing.
//!
//! fdx keeps a searchable index of one or more directory trees. Entries are
//! found by name, by relative path, and optionally by file content, with
//! filters on kind, size, extension and modification time. A watch mode keeps
//! an index current as the tree changes.

#![warn(missing_docs)]

pub mod cli;
