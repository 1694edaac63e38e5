//! Demo API endpoints
//!
//! Small handlers that exercise each kind of measurement so the metrics
//! page has something to show.

use axum::{
    Json,
    extract::{Path, State},
};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;

/// Upper bound of the simulated work in `/api/compute`
const MAX_COMPUTE_MILLIS: u64 = 500;

#[derive(Debug, Serialize)]
pub struct HelloResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RecordedResponse {
    pub metric: String,
    pub value: f64,
}

#[derive(Debug, Serialize)]
pub struct ComputeResponse {
    pub elapsed_ms: u128,
}

pub async fn hello() -> Json<HelloResponse> {
    Json(HelloResponse {
        message: "Hello from metroscope",
    })
}

/// Count one hit on `app_hits_total`
pub async fn hit(State(state): State<AppState>) -> Json<RecordedResponse> {
    state.scope().record_hit("hits");
    Json(RecordedResponse {
        metric: "app_hits_total".to_string(),
        value: 1.0,
    })
}

/// Set the `app_demo` gauge from the path
pub async fn gauge(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> AppResult<Json<RecordedResponse>> {
    let value: f64 = raw
        .parse()
        .map_err(|_| AppError::Validation(format!("'{}' is not a number", raw)))?;
    if !value.is_finite() {
        return Err(AppError::Validation(format!("'{}' is not a finite number", raw)));
    }

    state.scope().record_gauge("demo", value);
    Ok(Json(RecordedResponse {
        metric: "app_demo".to_string(),
        value,
    }))
}

/// Simulate up to half a second of work under the `app_compute_span` timer
pub async fn compute(State(state): State<AppState>) -> Json<ComputeResponse> {
    let span = state.scope().record_span("compute");

    let millis = rand::rng().random_range(0..=MAX_COMPUTE_MILLIS);
    tokio::time::sleep(Duration::from_millis(millis)).await;

    let elapsed = span.stop();
    tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Compute finished");

    Json(ComputeResponse {
        elapsed_ms: elapsed.as_millis(),
    })
}
