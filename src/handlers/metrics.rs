//! Prometheus metrics rendering
//!
//! Encodes everything registered with a [`Reporter`] in Prometheus text
//! format. The collector middleware calls this once a scrape request has
//! passed the access policy.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::metrics::Reporter;

/// Render the metrics page
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if encoding fails
///
/// # Example
///
/// ```bash
/// curl -u scraper:secret http://localhost:3000/metrics
/// # HELP http_requests_total http_requests_total counter
/// # TYPE http_requests_total counter
/// http_requests_total{endpoint="GET /api/hello",status="200"} 42
/// ```
pub fn render(reporter: &Reporter) -> Response {
    match reporter.gather() {
        Ok(output) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], output).into_response(),
        Err(e) => {
            tracing::error!(
                error = %e,
                "Failed to encode metrics for Prometheus scraping"
            );
            AppError::MetricsEncoding(e).into_response()
        }
    }
}
