//! Filesystem abstraction and YAML frontmatter primitives for markdown vaults.
//!
//! This crate holds the two things every other layer builds on:
//! - A platform-independent async [`FileSystem`] trait with an in-memory
//!   implementation for tests (the native implementation lives in the daemon).
//! - Frontmatter parsing and canonical serialization over
//!   `HashMap<String, serde_json::Value>`.
//!
//! Everything here is free of sync semantics — no knowledge of tasks,
//! projects, or the remote service.

mod frontmatter;
pub mod fs;

pub use frontmatter::{
    build_note, parse_frontmatter, replace_frontmatter_block, split_frontmatter, Frontmatter,
    ParsedNote,
};
pub use fs::{FileEntry, FileSystem, FsError, InMemoryFs};
