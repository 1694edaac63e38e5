//! metroscope - Prometheus metrics for axum services
//!
//! Record counters, gauges, histograms and timers through [`metrics::Scope`],
//! sample every inbound request with [`middleware::Collector`], and expose
//! the result on `/metrics` behind basic auth or an internal network check.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod telemetry;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::handlers::{AppState, api};
use crate::middleware::Collector;

/// Build the demo API router wrapped by `collector`
pub fn app(state: AppState, collector: Arc<Collector>) -> Router {
    let router = Router::new()
        .route("/api/hello", get(api::hello))
        .route("/api/hit", get(api::hit).post(api::hit))
        .route("/api/gauge/{value}", get(api::gauge).put(api::gauge))
        .route("/api/compute", get(api::compute))
        .with_state(state);

    collector.apply(router)
}
