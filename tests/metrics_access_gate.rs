//! Integration tests for /metrics access control
//!
//! Drives the demo router through the collector middleware and checks the
//! status returned for each access configuration.

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
};
use base64::prelude::*;
use metroscope::{
    config::TelemetryConfig,
    handlers::AppState,
    metrics::{Reporter, Scope},
    middleware::Collector,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

fn create_app(config: TelemetryConfig) -> (Router, Arc<Reporter>) {
    let reporter = Arc::new(Reporter::new());
    let state = AppState::new(Scope::new(Arc::clone(&reporter), "app"));
    let collector = Arc::new(Collector::new(&config, Arc::clone(&reporter)));
    (metroscope::app(state, collector), reporter)
}

fn credentials() -> TelemetryConfig {
    TelemetryConfig {
        username: "scraper".to_string(),
        password: "s3cret".to_string(),
        ..Default::default()
    }
}

fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(format!("{}:{}", user, pass)))
}

fn scrape() -> axum::http::request::Builder {
    Request::builder().method("GET").uri("/metrics")
}

fn from_peer(ip: [u8; 4]) -> ConnectInfo<SocketAddr> {
    ConnectInfo(SocketAddr::from((ip, 51000)))
}

async fn body_string(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Disabled
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_no_access_mode_hides_metrics() {
    let (app, _) = create_app(TelemetryConfig::default());

    let response = app
        .oneshot(scrape().body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_no_access_mode_does_not_sample() {
    let (app, reporter) = create_app(TelemetryConfig::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/hello")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let output = reporter.gather().unwrap();
    assert!(!output.contains("http_requests_total"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Basic auth
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_credentials_get_challenge() {
    let (app, _) = create_app(credentials());

    let response = app
        .oneshot(scrape().body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Basic realm=\"metrics\""
    );
}

#[tokio::test]
async fn test_wrong_credentials_get_challenge() {
    let (app, _) = create_app(credentials());

    let response = app
        .oneshot(
            scrape()
                .header(header::AUTHORIZATION, basic("scraper", "guess"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_authorization_gets_challenge() {
    let (app, _) = create_app(credentials());

    let response = app
        .oneshot(
            scrape()
                .header(header::AUTHORIZATION, "Basic not-base64!")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_correct_credentials_get_metrics() {
    let (app, _) = create_app(credentials());

    let response = app
        .oneshot(
            scrape()
                .header(header::AUTHORIZATION, basic("scraper", "s3cret"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; version=0.0.4"
    );
}

#[tokio::test]
async fn test_credentials_override_allow_any() {
    let (app, _) = create_app(TelemetryConfig {
        allow_any: true,
        ..credentials()
    });

    let response = app
        .oneshot(scrape().body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal networks
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_internal_peer_gets_metrics_without_credentials() {
    let (app, _) = create_app(TelemetryConfig {
        allow_internal: true,
        ..credentials()
    });

    let response = app
        .oneshot(
            scrape()
                .extension(from_peer([10, 0, 0, 5]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_public_peer_falls_back_to_basic_auth() {
    let (app, _) = create_app(TelemetryConfig {
        allow_internal: true,
        ..credentials()
    });

    let response = app
        .oneshot(
            scrape()
                .extension(from_peer([8, 8, 8, 8]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_public_peer_is_hidden_when_only_internal_allowed() {
    let (app, _) = create_app(TelemetryConfig {
        allow_internal: true,
        ..Default::default()
    });

    let response = app
        .oneshot(
            scrape()
                .extension(from_peer([8, 8, 8, 8]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forwarded_for_identifies_internal_caller_behind_proxy() {
    let (app, _) = create_app(TelemetryConfig {
        allow_internal: true,
        ..Default::default()
    });

    let response = app
        .oneshot(
            scrape()
                .header("x-forwarded-for", "192.168.1.7")
                .extension(from_peer([203, 0, 113, 1]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// ─────────────────────────────────────────────────────────────────────────────
// Allow any
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_allow_any_serves_metrics() {
    let (app, reporter) = create_app(TelemetryConfig {
        allow_any: true,
        ..Default::default()
    });
    Scope::new(Arc::clone(&reporter), "app").record_gauge("temperature", 21.5);

    let response = app
        .oneshot(scrape().body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("# TYPE app_temperature gauge"));
    assert!(body.contains("app_temperature 21.5"));
}

#[tokio::test]
async fn test_metrics_path_is_case_insensitive() {
    let (app, _) = create_app(TelemetryConfig {
        allow_any: true,
        ..Default::default()
    });

    let response = app
        .oneshot(
            Request::builder()
                .uri("/Metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_non_get_metrics_request_is_not_served() {
    let (app, _) = create_app(TelemetryConfig {
        allow_any: true,
        ..Default::default()
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
