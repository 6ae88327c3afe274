//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        // Trigger delivery
        .route("/v1/events/child-created", post(handlers::child_created))
        .route("/v1/events/child-deleted", post(handlers::child_deleted))
        // Bulk jobs
        .route(
            "/v1/admin/jobs/migrate-usernames",
            post(handlers::trigger_migrate_usernames),
        )
        .route(
            "/v1/admin/jobs/reset-counts",
            post(handlers::trigger_reset_counts),
        );

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
