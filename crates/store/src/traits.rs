//! Store trait definitions.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use tally_core::{CollectionPath, DocRef, DocumentSnapshot, FieldPath, Fields};

// ===== Scan API Types =====

/// Page size constraints for scans.
pub const DEFAULT_PAGE_SIZE: usize = 500;
pub const MIN_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 5000;

/// Maximum size for scan cursors (1 KB).
pub const MAX_CURSOR_SIZE: usize = 1024;

/// A boxed stream of scan pages.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = StoreResult<DocumentPage>> + Send + 'a>>;

/// An opaque cursor for resuming a scan after the last returned document.
///
/// Cursors are backend-agnostic envelopes (see [`crate::cursor`]) and should
/// not be parsed or modified by callers.
#[derive(Clone, PartialEq, Eq)]
pub struct ScanCursor(Vec<u8>);

impl ScanCursor {
    /// Create a cursor from raw bytes.
    ///
    /// Returns an error if the cursor exceeds MAX_CURSOR_SIZE.
    pub fn new(data: Vec<u8>) -> StoreResult<Self> {
        if data.len() > MAX_CURSOR_SIZE {
            return Err(StoreError::InvalidCursor(format!(
                "cursor too large: {} bytes (max: {})",
                data.len(),
                MAX_CURSOR_SIZE
            )));
        }
        Ok(Self(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to base64 for transport.
    pub fn to_base64(&self) -> String {
        use base64::{Engine as _, engine::general_purpose};
        general_purpose::STANDARD.encode(&self.0)
    }

    /// Parse from base64.
    pub fn from_base64(s: &str) -> StoreResult<Self> {
        // Reject before decoding; base64 inflates by 4/3, so 2x is a safe bound.
        const MAX_BASE64_INPUT: usize = MAX_CURSOR_SIZE * 2;
        if s.len() > MAX_BASE64_INPUT {
            return Err(StoreError::InvalidCursor(format!(
                "cursor base64 too large: {} bytes (max: {})",
                s.len(),
                MAX_BASE64_INPUT
            )));
        }

        use base64::{Engine as _, engine::general_purpose};
        let data = general_purpose::STANDARD
            .decode(s)
            .map_err(|e| StoreError::InvalidCursor(format!("invalid cursor base64: {e}")))?;
        Self::new(data)
    }
}

impl std::fmt::Debug for ScanCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ScanCursor").field(&self.to_base64()).finish()
    }
}

/// A single page of scan results.
#[derive(Clone, Debug)]
pub struct DocumentPage {
    /// Documents in this page, ordered by id.
    pub documents: Vec<DocumentSnapshot>,

    /// Cursor for the next page. None on the last page.
    pub next_cursor: Option<ScanCursor>,
}

/// Options for scan operations.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Documents per page, clamped to [MIN_PAGE_SIZE, MAX_PAGE_SIZE].
    pub page_size: usize,
}

impl ScanOptions {
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    /// Get the normalized page size.
    pub fn normalized_page_size(&self) -> usize {
        self.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

// ===== Write API Types =====

/// A single write inside an atomic batch.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Merge the given fields into an existing document. Fails the batch if
    /// the document does not exist.
    Update {
        doc: DocRef,
        fields: Vec<(FieldPath, Value)>,
    },
    /// Delete a document. Deleting a missing document is a no-op.
    Delete { doc: DocRef },
    /// Add `delta` to an integer field, flooring the result at zero.
    Increment {
        doc: DocRef,
        field: FieldPath,
        delta: i64,
    },
}

impl WriteOp {
    /// Single-field update.
    pub fn update(doc: DocRef, field: FieldPath, value: Value) -> Self {
        Self::Update {
            doc,
            fields: vec![(field, value)],
        }
    }

    pub fn delete(doc: DocRef) -> Self {
        Self::Delete { doc }
    }

    /// The document this operation touches.
    pub fn doc(&self) -> &DocRef {
        match self {
            Self::Update { doc, .. } | Self::Delete { doc } | Self::Increment { doc, .. } => doc,
        }
    }

    pub fn kind(&self) -> WriteKind {
        match self {
            Self::Update { .. } => WriteKind::Update,
            Self::Delete { .. } => WriteKind::Delete,
            Self::Increment { .. } => WriteKind::Increment,
        }
    }
}

/// Discriminant of a [`WriteOp`], used for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Update,
    Delete,
    Increment,
}

impl WriteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Increment => "increment",
        }
    }
}

/// Document store abstraction.
///
/// Implementations must make `atomic_increment` a single atomic step with
/// respect to every other write on the same document, and must apply
/// `commit_batch` all-or-nothing.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Read a document.
    async fn get(&self, doc: &DocRef) -> StoreResult<Option<Fields>>;

    /// Create or fully overwrite a document.
    async fn set(&self, doc: &DocRef, data: Fields) -> StoreResult<()>;

    /// Merge fields into an existing document, preserving untouched fields.
    ///
    /// Returns `DocumentMissing` if the document does not exist.
    async fn update(&self, doc: &DocRef, fields: &[(FieldPath, Value)]) -> StoreResult<()>;

    /// Atomically add `delta` to an integer field, flooring the result at 0.
    ///
    /// A missing field counts as 0. Returns the new value, or
    /// `DocumentMissing` if the document does not exist.
    async fn atomic_increment(&self, doc: &DocRef, field: &FieldPath, delta: i64)
    -> StoreResult<i64>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete(&self, doc: &DocRef) -> StoreResult<()>;

    /// Apply up to [`tally_core::MAX_OPS_PER_BATCH`] operations atomically.
    ///
    /// Larger batches are rejected with `BatchTooLarge` before any write.
    async fn commit_batch(&self, ops: &[WriteOp]) -> StoreResult<()>;

    /// Scan a collection in id order, one page at a time.
    ///
    /// Pages are fetched lazily as the stream is polled. Only direct
    /// children of `collection` are returned, never documents of nested
    /// subcollections.
    ///
    /// # Errors
    ///
    /// The stream yields an error if the cursor is malformed or belongs to a
    /// different collection, or if the backend fails fetching a page.
    fn scan_pages<'a>(
        &'a self,
        collection: &CollectionPath,
        options: ScanOptions,
        resume: Option<ScanCursor>,
    ) -> PageStream<'a>;

    /// Get the name of this store backend, for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify backend connectivity.
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Reject batches above the store ceiling.
pub(crate) fn check_batch_size(ops: &[WriteOp]) -> StoreResult<()> {
    if ops.len() > tally_core::MAX_OPS_PER_BATCH {
        return Err(StoreError::BatchTooLarge {
            len: ops.len(),
            max: tally_core::MAX_OPS_PER_BATCH,
        });
    }
    Ok(())
}
