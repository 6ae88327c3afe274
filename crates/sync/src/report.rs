//! Job kinds and the per-run result document.

use crate::batch::BatchReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Bulk jobs the service can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Backfill canonical lowercase usernames.
    MigrateUsernames,
    /// Zero counters and purge child collections.
    ResetCounts,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MigrateUsernames => "migrate_usernames",
            Self::ResetCounts => "reset_counts",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document (or collection) the job could not process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub id: String,
    pub error: String,
}

/// Summary of one job run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job: JobKind,
    pub run_id: Uuid,
    pub dry_run: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    pub total_scanned: u64,
    pub updated: u64,
    pub skipped: u64,
    pub deleted: u64,
    pub failed: Vec<JobFailure>,
}

impl JobResult {
    pub fn start(job: JobKind, dry_run: bool) -> Self {
        Self {
            job,
            run_id: Uuid::new_v4(),
            dry_run,
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
            total_scanned: 0,
            updated: 0,
            skipped: 0,
            deleted: 0,
            failed: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, id: impl Into<String>, error: impl ToString) {
        self.failed.push(JobFailure {
            id: id.into(),
            error: error.to_string(),
        });
    }

    /// Fold a writer's committed counts and group failures into this result.
    ///
    /// Every document of a failed group gets its own failure entry.
    pub fn absorb(&mut self, report: BatchReport) {
        self.updated += report.updates;
        self.deleted += report.deletes;
        for failure in report.failures {
            let error = failure.error.to_string();
            for id in failure.doc_ids {
                self.failed.push(JobFailure {
                    id,
                    error: error.clone(),
                });
            }
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(OffsetDateTime::now_utc());
        tracing::info!(
            job = %self.job,
            run_id = %self.run_id,
            dry_run = self.dry_run,
            total_scanned = self.total_scanned,
            updated = self.updated,
            skipped = self.skipped,
            deleted = self.deleted,
            failed = self.failed.len(),
            "Job finished"
        );
        self
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Metric label for the run outcome.
    pub fn outcome(&self) -> &'static str {
        if self.is_clean() { "success" } else { "partial" }
    }
}
