//! Admin job endpoints.
//!
//! Both endpoints run the job to completion before responding and return the
//! run's `JobResult`. They are unauthenticated and must be network-restricted.

use super::common::parse_optional_json;
use crate::error::ApiResult;
use crate::jobs::{self, MigrateUsernamesRequest, ResetCountsRequest};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use tally_sync::JobResult;

/// POST /v1/admin/jobs/migrate-usernames - Backfill canonical usernames.
pub async fn trigger_migrate_usernames(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<JobResult>> {
    let request: MigrateUsernamesRequest = parse_optional_json(req).await?;
    let result = jobs::migrate_usernames(&state, request).await?;
    Ok(Json(result))
}

/// POST /v1/admin/jobs/reset-counts - Zero counters and purge children.
pub async fn trigger_reset_counts(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<JobResult>> {
    let request: ResetCountsRequest = parse_optional_json(req).await?;
    let result = jobs::reset_counts(&state, request).await?;
    Ok(Json(result))
}
