//! HTTP request sampling
//!
//! Every sampled request produces two series on the `http` scope, tagged
//! with the endpoint (`"<METHOD> <path>"`) and the response status:
//!
//! - `http_request_duration_seconds` histogram
//! - `http_requests_total` counter

use axum::{
    extract::MatchedPath,
    http::{Method, Request, StatusCode},
};
use percent_encoding::percent_decode_str;
use std::time::Instant;

use crate::config::TelemetryConfig;
use crate::metrics::{Scope, TagSet};

/// Prefix of the scope request metrics are recorded under
pub const HTTP_SCOPE_PREFIX: &str = "http";

/// Records duration and count for inbound requests
pub struct RequestSampler {
    scope: Scope,
    path_prefix_filters: Vec<String>,
    asterisk_alternative: String,
}

impl RequestSampler {
    pub fn new(scope: Scope, config: &TelemetryConfig) -> Self {
        Self {
            scope,
            path_prefix_filters: config.path_prefix_filters.clone(),
            asterisk_alternative: config.asterisk_alternative.clone(),
        }
    }

    /// The scope request metrics are recorded on
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Whether requests to `path` are sampled
    ///
    /// With no filters every path is sampled. Otherwise `path` must start
    /// with one of the filters; the root path `/` is always sampled.
    pub fn should_sample(&self, path: &str) -> bool {
        self.path_prefix_filters.is_empty()
            || path == "/"
            || self
                .path_prefix_filters
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Path label for a request
    ///
    /// The matched route pattern with `*` replaced by the configured
    /// alternative. Returns `None` when the path does not decode to valid
    /// UTF-8, when the router matched no route, or when the label would be
    /// empty.
    pub fn endpoint_path<B>(&self, request: &Request<B>) -> Option<String> {
        let pattern = request.extensions().get::<MatchedPath>();
        self.label(request.uri().path(), pattern.map(MatchedPath::as_str))
    }

    fn label(&self, raw_path: &str, pattern: Option<&str>) -> Option<String> {
        percent_decode_str(raw_path).decode_utf8().ok()?;
        let label = pattern?.replace('*', &self.asterisk_alternative);
        (!label.is_empty()).then_some(label)
    }

    /// Start timing `request`; the sample is recorded when the guard drops
    pub fn begin<B>(&self, request: &Request<B>) -> RequestSample {
        let path = self.endpoint_path(request);
        if path.is_none() {
            tracing::debug!(
                uri = %request.uri(),
                "No matched route or path is not valid UTF-8, request will not be sampled"
            );
        }
        self.start(request.method().clone(), path)
    }

    fn start(&self, method: Method, path: Option<String>) -> RequestSample {
        RequestSample {
            scope: self.scope.clone(),
            method,
            path,
            started: Instant::now(),
            status: None,
        }
    }
}

/// In-flight request sample
///
/// Records on drop, so a handler that panics or a client that disconnects
/// still produces a sample. A sample whose status was never set is recorded
/// as `200`.
pub struct RequestSample {
    scope: Scope,
    method: Method,
    path: Option<String>,
    started: Instant,
    status: Option<StatusCode>,
}

impl RequestSample {
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn record(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let status = self.status.unwrap_or(StatusCode::OK).as_u16();

        // Cache key is cheaper to build than the tag set
        let key = format!("{} {} {}", status, self.method, path);
        let scope = match self.scope.get_tagged_scope(&key) {
            Some(scope) => scope,
            None => {
                let tags = TagSet::from([
                    ("endpoint".to_string(), format!("{} {}", self.method, path)),
                    ("status".to_string(), status.to_string()),
                ]);
                self.scope.set_tagged_scope(&key, tags)
            }
        };

        scope.record_duration("request", self.started, Instant::now());
        scope.record_hit("requests");
    }
}

impl Drop for RequestSample {
    fn drop(&mut self) {
        self.record();
    }
}
