//! Bulk job execution shared by the admin endpoints and the CLI.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use serde::Deserialize;
use std::future::Future;
use tally_sync::{JobKind, JobResult, ResetJob, SyncResult, UsernameMigration};

/// Overrides for a username migration run. Unset fields use the config.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrateUsernamesRequest {
    pub collection: Option<String>,
    pub dry_run: Option<bool>,
}

/// Restricts a reset run to some of the configured target collections.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResetCountsRequest {
    pub collections: Vec<String>,
}

/// Run `job` as the only active job of its kind.
///
/// The job runs on its own task, so a dropped request does not cancel it.
pub async fn run_exclusive<F>(state: &AppState, kind: JobKind, job: F) -> ApiResult<JobResult>
where
    F: Future<Output = SyncResult<JobResult>> + Send + 'static,
{
    let guard = state
        .jobs
        .try_acquire(kind)
        .ok_or_else(|| ApiError::Conflict(format!("another {kind} job is already running")))?;

    let timer = metrics::JOB_DURATION
        .with_label_values(&[kind.as_str()])
        .start_timer();
    let handle = tokio::spawn(async move {
        let _guard = guard;
        job.await
    });
    let result = handle
        .await
        .map_err(|e| ApiError::Internal(format!("{kind} job task failed: {e}")))?;
    timer.observe_duration();

    match result {
        Ok(result) => {
            metrics::record_job_result(&result);
            Ok(result)
        }
        Err(e) => {
            tracing::error!(job = %kind, error = %e, "Job aborted");
            metrics::JOB_RUNS
                .with_label_values(&[kind.as_str(), "failed"])
                .inc();
            Err(e.into())
        }
    }
}

pub async fn migrate_usernames(
    state: &AppState,
    request: MigrateUsernamesRequest,
) -> ApiResult<JobResult> {
    let mut config = state.config.migration.clone();
    if let Some(collection) = request.collection {
        config.collection = collection;
    }
    if let Some(dry_run) = request.dry_run {
        config.dry_run = dry_run;
    }

    let job = UsernameMigration::new(state.store.clone(), state.config.jobs.clone(), config);
    run_exclusive(state, JobKind::MigrateUsernames, async move { job.run().await }).await
}

pub async fn reset_counts(state: &AppState, request: ResetCountsRequest) -> ApiResult<JobResult> {
    let job = ResetJob::new(
        state.store.clone(),
        state.config.jobs.clone(),
        &state.config.reset,
    )
    .only(&request.collections)?;

    run_exclusive(state, JobKind::ResetCounts, async move { job.run().await }).await
}
