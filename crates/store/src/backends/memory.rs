//! In-memory document store.
//!
//! Every operation runs inside one critical section on a `tokio` mutex, which
//! gives the same atomicity guarantees as the SQLite backend: increments
//! cannot interleave and batches are applied all-or-nothing.

use crate::cursor::{CursorEnvelope, resume_after};
use crate::error::{StoreError, StoreResult};
use crate::traits::{
    DocumentPage, DocumentStore, PageStream, ScanCursor, ScanOptions, WriteOp, check_batch_size,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tally_core::document::{increment_field, set_field};
use tally_core::{CollectionPath, DocRef, DocumentSnapshot, FieldPath, Fields};
use tokio::sync::Mutex;

type Collections = BTreeMap<CollectionPath, BTreeMap<String, Fields>>;

/// Process-local document store.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents stored directly under `collection`.
    pub async fn len(&self, collection: &CollectionPath) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub async fn is_empty(&self, collection: &CollectionPath) -> bool {
        self.len(collection).await == 0
    }
}

fn lookup<'a>(collections: &'a Collections, doc: &DocRef) -> Option<&'a Fields> {
    collections.get(doc.collection_path())?.get(doc.id())
}

fn lookup_mut<'a>(collections: &'a mut Collections, doc: &DocRef) -> Option<&'a mut Fields> {
    collections
        .get_mut(doc.collection_path())?
        .get_mut(doc.id())
}

fn store_doc(collections: &mut Collections, doc: &DocRef, data: Fields) {
    collections
        .entry(doc.collection_path().clone())
        .or_default()
        .insert(doc.id().to_string(), data);
}

fn remove_doc(collections: &mut Collections, doc: &DocRef) {
    if let Some(docs) = collections.get_mut(doc.collection_path()) {
        docs.remove(doc.id());
        if docs.is_empty() {
            collections.remove(doc.collection_path());
        }
    }
}

/// Apply one batch operation to a staged copy of a document.
fn apply_op(op: &WriteOp, current: Option<Fields>) -> StoreResult<Option<Fields>> {
    match op {
        WriteOp::Update { doc, fields } => {
            let mut data = current.ok_or_else(|| StoreError::DocumentMissing(doc.path()))?;
            for (field, value) in fields {
                set_field(&mut data, field, value.clone());
            }
            Ok(Some(data))
        }
        WriteOp::Delete { .. } => Ok(None),
        WriteOp::Increment { doc, field, delta } => {
            let mut data = current.ok_or_else(|| StoreError::DocumentMissing(doc.path()))?;
            increment_field(&mut data, field, *delta);
            Ok(Some(data))
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, doc: &DocRef) -> StoreResult<Option<Fields>> {
        let collections = self.collections.lock().await;
        Ok(lookup(&collections, doc).cloned())
    }

    async fn set(&self, doc: &DocRef, data: Fields) -> StoreResult<()> {
        let mut collections = self.collections.lock().await;
        store_doc(&mut collections, doc, data);
        Ok(())
    }

    async fn update(&self, doc: &DocRef, fields: &[(FieldPath, Value)]) -> StoreResult<()> {
        let mut collections = self.collections.lock().await;
        let data = lookup_mut(&mut collections, doc)
            .ok_or_else(|| StoreError::DocumentMissing(doc.path()))?;
        for (field, value) in fields {
            set_field(data, field, value.clone());
        }
        Ok(())
    }

    async fn atomic_increment(
        &self,
        doc: &DocRef,
        field: &FieldPath,
        delta: i64,
    ) -> StoreResult<i64> {
        let mut collections = self.collections.lock().await;
        let data = lookup_mut(&mut collections, doc)
            .ok_or_else(|| StoreError::DocumentMissing(doc.path()))?;
        Ok(increment_field(data, field, delta))
    }

    async fn delete(&self, doc: &DocRef) -> StoreResult<()> {
        let mut collections = self.collections.lock().await;
        remove_doc(&mut collections, doc);
        Ok(())
    }

    async fn commit_batch(&self, ops: &[WriteOp]) -> StoreResult<()> {
        check_batch_size(ops)?;
        let mut collections = self.collections.lock().await;

        // Stage every touched document first so a failing op leaves no trace.
        let mut staged: HashMap<&DocRef, Option<Fields>> = HashMap::new();
        for op in ops {
            let current = match staged.get(op.doc()) {
                Some(staged_doc) => staged_doc.clone(),
                None => lookup(&collections, op.doc()).cloned(),
            };
            let next = apply_op(op, current)?;
            staged.insert(op.doc(), next);
        }

        for (doc, data) in staged {
            match data {
                Some(data) => store_doc(&mut collections, doc, data),
                None => remove_doc(&mut collections, doc),
            }
        }
        Ok(())
    }

    fn scan_pages<'a>(
        &'a self,
        collection: &CollectionPath,
        options: ScanOptions,
        resume: Option<ScanCursor>,
    ) -> PageStream<'a> {
        let collection = collection.clone();
        let page_size = options.normalized_page_size();

        Box::pin(async_stream::try_stream! {
            let mut after = resume_after(&collection, &options, resume.as_ref())?;
            let mut first_page = true;
            loop {
                let documents: Vec<DocumentSnapshot> = {
                    let collections = self.collections.lock().await;
                    match collections.get(&collection) {
                        None => Vec::new(),
                        Some(docs) => {
                            let lower = match after.as_deref() {
                                Some(id) => Bound::Excluded(id),
                                None => Bound::Unbounded,
                            };
                            docs.range::<str, _>((lower, Bound::Unbounded))
                                .take(page_size)
                                .map(|(id, data)| {
                                    collection
                                        .doc(id)
                                        .map(|doc| DocumentSnapshot::new(doc, data.clone()))
                                })
                                .collect::<tally_core::Result<_>>()
                                .map_err(StoreError::from)?
                        }
                    }
                };

                // An exhausted scan still reports one (empty) page.
                if documents.is_empty() && !first_page {
                    break;
                }
                first_page = false;

                let next_cursor = match documents.last() {
                    Some(last) if documents.len() == page_size => Some(
                        CursorEnvelope::new(&collection, &options, last.id().to_string())
                            .to_cursor()?,
                    ),
                    _ => None,
                };
                if let Some(last) = documents.last() {
                    after = Some(last.id().to_string());
                }

                let done = next_cursor.is_none();
                yield DocumentPage { documents, next_cursor };
                if done {
                    break;
                }
            }
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
