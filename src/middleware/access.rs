//! Access control for the metrics endpoint
//!
//! A scrape request is checked against, in order:
//! 1. the internal subnet allow-list (when `allow_internal` is set),
//! 2. the configured basic auth credential pair,
//! 3. `allow_any`.
//!
//! Anything else gets a 404 so the endpoint's existence is not disclosed.

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::prelude::*;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::TelemetryConfig;

/// Basic auth realm announced in the challenge
pub const REALM: &str = "metrics";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthParseError {
    #[error("unsupported authorization scheme")]
    UnsupportedScheme,
    #[error("invalid base64 encoding")]
    InvalidBase64Encoding,
    #[error("credentials are not valid UTF-8")]
    InvalidUtf8Encoding,
    #[error("no ':' between username and password")]
    NoDelimiterFound,
}

/// Username and password decoded from a `Basic` authorization header
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Compare against the expected pair without short-circuiting on the first mismatch
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl FromStr for BasicCredentials {
    type Err = AuthParseError;

    /// Parse a full header value such as `Basic dTpw`
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (scheme, encoded) = value
            .trim()
            .split_once(' ')
            .ok_or(AuthParseError::UnsupportedScheme)?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(AuthParseError::UnsupportedScheme);
        }

        let decoded = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthParseError::InvalidBase64Encoding)?;
        let decoded =
            String::from_utf8(decoded).map_err(|_| AuthParseError::InvalidUtf8Encoding)?;

        let (username, password) = decoded
            .split_once(':')
            .ok_or(AuthParseError::NoDelimiterFound)?;

        Ok(BasicCredentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl TryFrom<&HeaderValue> for BasicCredentials {
    type Error = AuthParseError;

    fn try_from(value: &HeaderValue) -> Result<Self, Self::Error> {
        let value = value
            .to_str()
            .map_err(|_| AuthParseError::InvalidUtf8Encoding)?;
        value.parse()
    }
}

/// Outcome of checking a scrape request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Caller is on a private subnet
    PermitInternal,
    /// Caller presented the configured credentials
    PermitAuthenticated,
    /// `allow_any` is set
    PermitAny,
    /// Credentials are configured but missing or wrong
    Challenge,
    /// No access mode applies
    NotFound,
}

impl AccessDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(
            self,
            AccessDecision::PermitInternal
                | AccessDecision::PermitAuthenticated
                | AccessDecision::PermitAny
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessDecision::PermitInternal => "internal",
            AccessDecision::PermitAuthenticated => "authenticated",
            AccessDecision::PermitAny => "any",
            AccessDecision::Challenge => "challenge",
            AccessDecision::NotFound => "not_found",
        }
    }
}

/// The configured scrape access modes
#[derive(Clone)]
pub struct AccessPolicy {
    allow_internal: bool,
    allow_any: bool,
    credentials: Option<(String, String)>,
}

impl AccessPolicy {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            allow_internal: config.allow_internal,
            allow_any: config.allow_any,
            credentials: config
                .has_credentials()
                .then(|| (config.username.clone(), config.password.clone())),
        }
    }

    /// Whether any mode exposes the endpoint
    pub fn is_enabled(&self) -> bool {
        self.allow_internal || self.allow_any || self.credentials.is_some()
    }

    /// Decide a scrape request; first matching rule wins
    pub fn decide<B>(&self, request: &Request<B>) -> AccessDecision {
        if self.allow_internal && client_ip(request).is_some_and(is_private) {
            return AccessDecision::PermitInternal;
        }

        if let Some((username, password)) = &self.credentials {
            let authenticated = request
                .headers()
                .get(header::AUTHORIZATION)
                .map(BasicCredentials::try_from)
                .is_some_and(|parsed| match parsed {
                    Ok(credentials) => credentials.matches(username, password),
                    Err(e) => {
                        tracing::debug!(error = %e, "Malformed authorization header on scrape request");
                        false
                    }
                });
            return if authenticated {
                AccessDecision::PermitAuthenticated
            } else {
                AccessDecision::Challenge
            };
        }

        if self.allow_any {
            return AccessDecision::PermitAny;
        }

        AccessDecision::NotFound
    }
}

/// 401 response asking for basic auth credentials
pub fn challenge_response() -> Response {
    let challenge = format!("Basic realm=\"{}\"", REALM);
    match HeaderValue::from_str(&challenge) {
        Ok(value) => (StatusCode::UNAUTHORIZED, [(header::WWW_AUTHENTICATE, value)]).into_response(),
        Err(_) => StatusCode::UNAUTHORIZED.into_response(),
    }
}

/// Resolve the caller's address
///
/// Prefers the right-most parseable `X-Forwarded-For` entry (the one added
/// by the nearest proxy), then `X-Real-IP`, then the connection peer.
pub fn client_ip<B>(request: &Request<B>) -> Option<IpAddr> {
    forwarded_for(request.headers())
        .or_else(|| {
            request
                .headers()
                .get(X_REAL_IP)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_ip)
        })
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let entries: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .collect();
    entries.into_iter().rev().find_map(parse_ip)
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    let value = value.trim();
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

/// Whether `ip` belongs to a private, loopback or carrier-grade NAT range
pub fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_v4(v4),
            None => v6.is_loopback() || v6.is_unique_local(),
        },
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    // 100.64.0.0/10
    let shared = a == 100 && (b & 0b1100_0000) == 0b0100_0000;
    ip.is_private() || ip.is_loopback() || shared
}
