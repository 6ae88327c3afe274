//! HTTP service for tally.
//!
//! This crate provides:
//! - Trigger endpoints that keep parent counters in step with child events
//! - Admin endpoints running the username migration and counter reset jobs
//! - Health and Prometheus metrics endpoints

pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, JobRegistry};
