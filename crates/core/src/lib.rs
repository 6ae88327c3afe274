//! Core domain types and shared logic for tally.
//!
//! This crate defines the data model used across all other crates:
//! - Collection, document, and field paths
//! - Document field maps and field-level edits
//! - Username canonicalization
//! - Configuration

pub mod config;
pub mod document;
pub mod error;
pub mod path;
pub mod username;

pub use document::{DocumentSnapshot, Fields};
pub use error::{Error, Result};
pub use path::{CollectionPath, DocRef, FieldPath};

/// Maximum number of write operations the store accepts in one atomic commit.
pub const MAX_OPS_PER_BATCH: usize = 500;
