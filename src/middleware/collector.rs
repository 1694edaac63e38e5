//! Metrics collector middleware
//!
//! Serves `GET /metrics` behind the access policy and samples every other
//! request. With no access mode configured the middleware forwards every
//! request untouched.

use axum::{
    Router,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::access::{AccessDecision, AccessPolicy, challenge_response};
use super::sample::{HTTP_SCOPE_PREFIX, RequestSampler};
use crate::config::TelemetryConfig;
use crate::handlers;
use crate::metrics::{Reporter, Scope};

/// Path the metrics are served on
pub const SCRAPE_PATH: &str = "/metrics";

/// Shared state of the collector middleware
pub struct Collector {
    policy: AccessPolicy,
    reporter: Arc<Reporter>,
    sampler: Option<RequestSampler>,
}

impl Collector {
    pub fn new(config: &TelemetryConfig, reporter: Arc<Reporter>) -> Self {
        let policy = AccessPolicy::from_config(config);
        let sampler = config.collect_http_request_metrics.then(|| {
            RequestSampler::new(
                Scope::new(Arc::clone(&reporter), HTTP_SCOPE_PREFIX),
                config,
            )
        });

        if policy.is_enabled() {
            tracing::info!(
                allow_any = config.allow_any,
                allow_internal = config.allow_internal,
                basic_auth = config.has_credentials(),
                sample_requests = sampler.is_some(),
                "Metrics collector enabled"
            );
        } else {
            tracing::info!("No metrics access mode configured, collector is disabled");
        }

        Self {
            policy,
            reporter,
            sampler,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.is_enabled()
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    /// Request sampler, when request metrics are collected
    pub fn sampler(&self) -> Option<&RequestSampler> {
        self.sampler.as_ref()
    }

    /// Stop sampling requests
    pub fn close(&self) {
        if let Some(sampler) = &self.sampler {
            sampler.scope().close();
        }
    }

    /// Wrap every route of `router`, including its fallback
    pub fn apply<S>(self: Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, collect))
    }

    fn scrape<B>(&self, request: &Request<B>) -> Response {
        let decision = self.policy.decide(request);
        tracing::debug!(decision = decision.as_str(), "Metrics scrape request");

        match decision {
            AccessDecision::PermitInternal
            | AccessDecision::PermitAuthenticated
            | AccessDecision::PermitAny => handlers::metrics::render(&self.reporter),
            AccessDecision::Challenge => challenge_response(),
            AccessDecision::NotFound => StatusCode::NOT_FOUND.into_response(),
        }
    }
}

/// Whether `request` asks for the metrics page
pub fn is_scrape_request<B>(request: &Request<B>) -> bool {
    request.method() == Method::GET && request.uri().path().eq_ignore_ascii_case(SCRAPE_PATH)
}

/// Middleware function behind [`Collector::apply`]
pub async fn collect(
    State(collector): State<Arc<Collector>>,
    request: Request,
    next: Next,
) -> Response {
    if !collector.is_enabled() {
        return next.run(request).await;
    }

    if is_scrape_request(&request) {
        return collector.scrape(&request);
    }

    let Some(sampler) = collector
        .sampler()
        .filter(|sampler| sampler.should_sample(request.uri().path()))
    else {
        return next.run(request).await;
    };

    let mut sample = sampler.begin(&request);
    let response = next.run(request).await;
    sample.set_status(response.status());
    response
}
