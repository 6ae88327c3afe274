use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tally_core::{CollectionPath, DocRef, FieldPath, Fields};
use tally_store::{
    DocumentStore, MemoryStore, PageStream, ScanCursor, ScanOptions, StoreError, StoreResult,
    WriteOp,
};

/// Failure injected into a store call.
#[derive(Clone, Copy, Debug)]
pub enum InjectedFailure {
    /// Permanent rejection; the batch writer must not retry it.
    Rejected,
    /// Transient outage; the batch writer may retry it.
    Unavailable,
}

impl InjectedFailure {
    fn to_error(self) -> StoreError {
        match self {
            Self::Rejected => StoreError::BatchRejected("injected rejection".to_string()),
            Self::Unavailable => StoreError::Unavailable("injected outage".to_string()),
        }
    }
}

/// In-memory store that fails selected calls and records commit attempts.
#[allow(dead_code)]
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    commit_calls: AtomicUsize,
    commit_sizes: Mutex<Vec<usize>>,
    /// 1-based commit attempt number -> failure.
    commit_failures: Mutex<HashMap<usize, InjectedFailure>>,
    /// 0-based page index failed in every scan.
    scan_failure_page: Option<usize>,
    /// Collection whose scans fail from the first page.
    scan_failure_collection: Option<String>,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `attempt`-th call to `commit_batch` (1-based).
    pub fn fail_commit(self, attempt: usize, failure: InjectedFailure) -> Self {
        self.commit_failures
            .lock()
            .unwrap()
            .insert(attempt, failure);
        self
    }

    /// Fail page `index` (0-based) of every scan with a transient error.
    pub fn fail_scan_page(mut self, index: usize) -> Self {
        self.scan_failure_page = Some(index);
        self
    }

    /// Fail every scan of `collection` with a transient error.
    pub fn fail_scans_of(mut self, collection: &str) -> Self {
        self.scan_failure_collection = Some(collection.to_string());
        self
    }

    /// Sizes of every commit attempt, failed ones included.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.commit_sizes.lock().unwrap().clone()
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, doc: &DocRef) -> StoreResult<Option<Fields>> {
        self.inner.get(doc).await
    }

    async fn set(&self, doc: &DocRef, data: Fields) -> StoreResult<()> {
        self.inner.set(doc, data).await
    }

    async fn update(&self, doc: &DocRef, fields: &[(FieldPath, Value)]) -> StoreResult<()> {
        self.inner.update(doc, fields).await
    }

    async fn atomic_increment(
        &self,
        doc: &DocRef,
        field: &FieldPath,
        delta: i64,
    ) -> StoreResult<i64> {
        self.inner.atomic_increment(doc, field, delta).await
    }

    async fn delete(&self, doc: &DocRef) -> StoreResult<()> {
        self.inner.delete(doc).await
    }

    async fn commit_batch(&self, ops: &[WriteOp]) -> StoreResult<()> {
        let attempt = self.commit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.commit_sizes.lock().unwrap().push(ops.len());
        let failure = self.commit_failures.lock().unwrap().get(&attempt).copied();
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }
        self.inner.commit_batch(ops).await
    }

    fn scan_pages<'a>(
        &'a self,
        collection: &CollectionPath,
        options: ScanOptions,
        resume: Option<ScanCursor>,
    ) -> PageStream<'a> {
        let fail_at = if self.scan_failure_collection.as_deref() == Some(collection.as_str()) {
            Some(0)
        } else {
            self.scan_failure_page
        };
        let pages = self.inner.scan_pages(collection, options, resume);
        Box::pin(pages.enumerate().map(move |(index, page)| {
            if Some(index) == fail_at {
                Err(StoreError::Unavailable("injected scan failure".to_string()))
            } else {
                page
            }
        }))
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
