//! Prometheus metrics for the tally server.
//!
//! Exposes counter event outcomes and bulk job runs.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! It MUST be network-restricted to authorized scraper IPs, the same as the
//! admin job endpoints.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};
use tally_sync::JobResult;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Counter reconciliation metrics
pub static COUNTER_EVENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tally_counter_events_total",
            "Child lifecycle events by event type and outcome",
        ),
        &["event", "outcome"],
    )
    .expect("metric creation failed")
});

// Job metrics
pub static JOB_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("tally_job_runs_total", "Bulk job runs by job and outcome"),
        &["job", "outcome"],
    )
    .expect("metric creation failed")
});

pub static JOB_DOCUMENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tally_job_documents_total",
            "Documents handled by bulk jobs by job and outcome",
        ),
        &["job", "outcome"],
    )
    .expect("metric creation failed")
});

pub static JOB_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new("tally_job_duration_seconds", "Wall time of bulk job runs")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["job"],
    )
    .expect("metric creation failed")
});

pub static JOBS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("tally_jobs_active", "Number of bulk jobs currently running")
        .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// This function is idempotent - subsequent calls after the first are no-ops.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(COUNTER_EVENTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOB_RUNS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOB_DOCUMENTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOB_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOBS_ACTIVE.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

pub fn record_counter_event(event: &str, outcome: &str) {
    COUNTER_EVENTS.with_label_values(&[event, outcome]).inc();
}

/// Record the run outcome and per-document tallies of a finished job.
pub fn record_job_result(result: &JobResult) {
    let job = result.job.as_str();
    JOB_RUNS.with_label_values(&[job, result.outcome()]).inc();
    for (outcome, count) in [
        ("updated", result.updated),
        ("skipped", result.skipped),
        ("deleted", result.deleted),
        ("failed", result.failed.len() as u64),
    ] {
        JOB_DOCUMENTS.with_label_values(&[job, outcome]).inc_by(count);
    }
}
