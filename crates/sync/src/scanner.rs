//! Collection scanner: a lazy, flattened view over paginated scans.

use crate::error::{SyncError, SyncResult};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tally_core::{CollectionPath, DocRef, DocumentSnapshot};
use tally_store::{DocumentStore, ScanOptions};

/// A boxed stream of scanned documents.
pub type SnapshotStream<'a> = Pin<Box<dyn Stream<Item = SyncResult<DocumentSnapshot>> + Send + 'a>>;

/// Enumerates every document of a collection, one store page at a time.
#[derive(Clone)]
pub struct CollectionScanner {
    store: Arc<dyn DocumentStore>,
    options: ScanOptions,
}

impl CollectionScanner {
    pub fn new(store: Arc<dyn DocumentStore>, page_size: usize) -> Self {
        Self {
            store,
            options: ScanOptions::new(page_size),
        }
    }

    /// Stream the direct documents of `collection` in id order.
    ///
    /// Only one page is held in memory at a time. A page fetch error is
    /// yielded once and ends the stream.
    pub fn scan<'a>(&'a self, collection: &CollectionPath) -> SnapshotStream<'a> {
        let collection = collection.clone();
        Box::pin(async_stream::try_stream! {
            let mut pages = self.store.scan_pages(&collection, self.options.clone(), None);
            while let Some(page) = pages.next().await {
                let page = page.map_err(SyncError::from)?;
                tracing::trace!(
                    collection = %collection,
                    documents = page.documents.len(),
                    "Scanned page"
                );
                for snapshot in page.documents {
                    yield snapshot;
                }
            }
        })
    }

    /// Stream the documents of a subcollection under `parent`.
    pub fn scan_children<'a>(
        &'a self,
        parent: &DocRef,
        subcollection: &str,
    ) -> SyncResult<SnapshotStream<'a>> {
        let collection = parent
            .collection(subcollection)
            .map_err(|e| SyncError::validation(parent.path(), e))?;
        Ok(self.scan(&collection))
    }
}
