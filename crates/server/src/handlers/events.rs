//! Child lifecycle trigger endpoints.

use super::common::parse_json;
use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use serde::Serialize;
use tally_sync::{ChildEvent, ChildEventKind, ReconcileOutcome};

/// Result of handling one child event.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    /// Whether a counter was changed.
    pub applied: bool,
    /// What happened: "applied", "unmapped", or "parent_missing".
    pub outcome: &'static str,
    /// Counter mapped to the child collection, if any.
    pub counter: Option<String>,
    /// New counter value, when applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

impl From<ReconcileOutcome> for EventResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        let value = match &outcome {
            ReconcileOutcome::Applied { value, .. } => Some(*value),
            _ => None,
        };
        Self {
            applied: outcome.applied(),
            outcome: outcome.as_str(),
            counter: outcome.counter().map(str::to_string),
            value,
        }
    }
}

async fn handle_event(
    state: &AppState,
    kind: ChildEventKind,
    req: Request,
) -> ApiResult<Json<EventResponse>> {
    let event: ChildEvent = match parse_json(req).await {
        Ok(event) => event,
        Err(e) => {
            metrics::record_counter_event(kind.as_str(), "invalid");
            return Err(e);
        }
    };

    let result = match kind {
        ChildEventKind::Created => state.reconciler.child_created(&event).await,
        ChildEventKind::Deleted => state.reconciler.child_deleted(&event).await,
    };

    match result {
        Ok(outcome) => {
            metrics::record_counter_event(kind.as_str(), outcome.as_str());
            Ok(Json(outcome.into()))
        }
        Err(e) => {
            metrics::record_counter_event(kind.as_str(), "error");
            Err(e.into())
        }
    }
}

/// POST /v1/events/child-created - Increment the parent's counter.
pub async fn child_created(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<EventResponse>> {
    handle_event(&state, ChildEventKind::Created, req).await
}

/// POST /v1/events/child-deleted - Decrement the parent's counter.
pub async fn child_deleted(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<EventResponse>> {
    handle_event(&state, ChildEventKind::Deleted, req).await
}
