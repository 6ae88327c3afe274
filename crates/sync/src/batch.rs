//! Batch writer: groups writes into atomic commits below the store ceiling.
//!
//! Groups are committed sequentially as they fill. A failed group is recorded
//! and never retried past its retry limit; the writer moves on to the next
//! group so one bad document cannot stall a whole job.

use crate::error::{SyncError, SyncResult};
use crate::report::JobKind;
use std::sync::Arc;
use std::time::Duration;
use tally_core::MAX_OPS_PER_BATCH;
use tally_core::config::JobsConfig;
use tally_store::{DocumentStore, StoreError, StoreResult, WriteKind, WriteOp};

/// A group that could not be committed.
#[derive(Debug)]
pub struct GroupFailure {
    pub group_index: usize,
    /// Paths of every document the group touched, in push order.
    pub doc_ids: Vec<String>,
    pub error: StoreError,
}

impl From<GroupFailure> for SyncError {
    fn from(failure: GroupFailure) -> Self {
        SyncError::BatchCommitFailed {
            group_index: failure.group_index,
            doc_ids: failure.doc_ids,
            source: failure.error,
        }
    }
}

/// Outcome of every group a writer attempted.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub committed_groups: usize,
    pub updates: u64,
    pub deletes: u64,
    pub increments: u64,
    pub failures: Vec<GroupFailure>,
}

impl BatchReport {
    fn record_committed(&mut self, ops: &[WriteOp]) {
        self.committed_groups += 1;
        for op in ops {
            match op.kind() {
                WriteKind::Update => self.updates += 1,
                WriteKind::Delete => self.deletes += 1,
                WriteKind::Increment => self.increments += 1,
            }
        }
    }

    /// Number of documents in failed groups.
    pub fn failed_docs(&self) -> usize {
        self.failures.iter().map(|f| f.doc_ids.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Accumulates operations and commits them in groups of at most `batch_size`.
pub struct BatchWriter {
    store: Arc<dyn DocumentStore>,
    job: JobKind,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
    pending: Vec<WriteOp>,
    next_group: usize,
    report: BatchReport,
}

impl BatchWriter {
    /// Create a writer. The batch size is capped at [`MAX_OPS_PER_BATCH`].
    pub fn new(store: Arc<dyn DocumentStore>, job: JobKind, config: &JobsConfig) -> Self {
        let batch_size = config.batch_size.clamp(1, MAX_OPS_PER_BATCH);
        Self {
            store,
            job,
            batch_size,
            max_retries: config.max_commit_retries,
            retry_backoff: config.retry_backoff(),
            pending: Vec::with_capacity(batch_size),
            next_group: 0,
            report: BatchReport::default(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    /// Queue one operation, committing the current group once it is full.
    pub async fn push(&mut self, op: WriteOp) {
        self.pending.push(op);
        if self.pending.len() >= self.batch_size {
            self.flush().await;
        }
    }

    /// Queue operations that must land in the same atomic group.
    ///
    /// The current group is flushed first if the set would not fit. A set
    /// larger than the batch size is rejected without queuing anything.
    pub async fn push_group(&mut self, ops: Vec<WriteOp>) -> SyncResult<()> {
        if ops.len() > self.batch_size {
            let id = ops.first().map(|op| op.doc().path()).unwrap_or_default();
            return Err(SyncError::validation(
                id,
                format!(
                    "group of {} operations exceeds the batch size of {}",
                    ops.len(),
                    self.batch_size
                ),
            ));
        }

        if self.pending.len() + ops.len() > self.batch_size {
            self.flush().await;
        }
        self.pending.extend(ops);
        if self.pending.len() >= self.batch_size {
            self.flush().await;
        }
        Ok(())
    }

    /// Commit whatever is pending as one group.
    pub async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let ops = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let group_index = self.next_group;
        self.next_group += 1;

        match self.commit_group(&ops, group_index).await {
            Ok(()) => {
                tracing::debug!(
                    job = %self.job,
                    group_index,
                    ops = ops.len(),
                    "Committed batch group"
                );
                self.report.record_committed(&ops);
            }
            Err(e) => {
                tracing::error!(
                    job = %self.job,
                    group_index,
                    ops = ops.len(),
                    error = %e,
                    "Batch group failed, continuing with next group"
                );
                self.report.failures.push(GroupFailure {
                    group_index,
                    doc_ids: ops.iter().map(|op| op.doc().path()).collect(),
                    error: e,
                });
            }
        }
    }

    /// Flush the final partial group and return the report.
    pub async fn finish(mut self) -> BatchReport {
        self.flush().await;
        self.report
    }

    async fn commit_group(&self, ops: &[WriteOp], group_index: usize) -> StoreResult<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.store.commit_batch(ops).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = self.retry_backoff * attempt;
                    tracing::warn!(
                        job = %self.job,
                        group_index,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient batch commit failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Commit `ops` in consecutive groups and report the outcome of each.
pub async fn commit(
    store: Arc<dyn DocumentStore>,
    job: JobKind,
    config: &JobsConfig,
    ops: Vec<WriteOp>,
) -> BatchReport {
    let mut writer = BatchWriter::new(store, job, config);
    for op in ops {
        writer.push(op).await;
    }
    writer.finish().await
}
