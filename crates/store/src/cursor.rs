//! Scan cursor envelope format.
//!
//! Cursors carry the collection and normalized page size they were issued
//! for, so a cursor cannot silently resume a different scan.

use crate::error::{StoreError, StoreResult};
use crate::traits::{ScanCursor, ScanOptions};
use serde::{Deserialize, Serialize};
use tally_core::CollectionPath;

/// Current cursor envelope format version.
pub const CURSOR_VERSION: u8 = 1;

/// Versioned scan cursor envelope.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorEnvelope {
    pub version: u8,
    pub collection: String,
    pub page_size: usize,
    /// Id of the last document returned; the scan resumes strictly after it.
    pub after_id: String,
}

impl CursorEnvelope {
    pub fn new(collection: &CollectionPath, options: &ScanOptions, after_id: String) -> Self {
        Self {
            version: CURSOR_VERSION,
            collection: collection.to_string(),
            page_size: options.normalized_page_size(),
            after_id,
        }
    }

    pub fn to_cursor(&self) -> StoreResult<ScanCursor> {
        ScanCursor::new(serde_json::to_vec(self)?)
    }

    pub fn from_cursor(cursor: &ScanCursor) -> StoreResult<Self> {
        let envelope: Self = serde_json::from_slice(cursor.as_bytes())
            .map_err(|e| StoreError::InvalidCursor(format!("failed to decode cursor: {e}")))?;

        if envelope.version != CURSOR_VERSION {
            return Err(StoreError::InvalidCursor(format!(
                "unsupported cursor version: {} (expected {})",
                envelope.version, CURSOR_VERSION
            )));
        }

        Ok(envelope)
    }

    /// Check that this cursor was issued for the given scan.
    pub fn validate(&self, collection: &CollectionPath, options: &ScanOptions) -> StoreResult<()> {
        if self.collection != collection.as_str() {
            return Err(StoreError::InvalidCursor(format!(
                "collection mismatch: cursor is for '{}', scan is over '{}'",
                self.collection, collection
            )));
        }

        let page_size = options.normalized_page_size();
        if self.page_size != page_size {
            return Err(StoreError::InvalidCursor(format!(
                "page_size mismatch: cursor is for {}, scan uses {}",
                self.page_size, page_size
            )));
        }

        Ok(())
    }
}

/// Resolve the id a scan should start after, validating any resume cursor.
pub(crate) fn resume_after(
    collection: &CollectionPath,
    options: &ScanOptions,
    resume: Option<&ScanCursor>,
) -> StoreResult<Option<String>> {
    match resume {
        None => Ok(None),
        Some(cursor) => {
            let envelope = CursorEnvelope::from_cursor(cursor)?;
            envelope.validate(collection, options)?;
            Ok(Some(envelope.after_id))
        }
    }
}
