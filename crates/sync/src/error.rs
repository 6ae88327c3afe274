//! Sync error types.

use tally_store::StoreError;
use thiserror::Error;

/// Errors raised by the reconciler and the bulk jobs.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The store could not be reached; the caller may retry later.
    #[error(transparent)]
    StoreUnavailable(StoreError),

    #[error("document not found: {0}")]
    DocumentMissing(String),

    #[error("batch group {group_index} failed for {} documents: {source}", .doc_ids.len())]
    BatchCommitFailed {
        group_index: usize,
        doc_ids: Vec<String>,
        #[source]
        source: StoreError,
    },

    #[error("invalid {id}: {reason}")]
    Validation { id: String, reason: String },

    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl SyncError {
    pub fn validation(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Validation {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failed operation may succeed if retried later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) => true,
            Self::BatchCommitFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DocumentMissing(path) => Self::DocumentMissing(path),
            err if err.is_transient() => Self::StoreUnavailable(err),
            err => Self::Store(err),
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
