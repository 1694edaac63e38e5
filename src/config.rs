//! Configuration management for metroscope
//!
//! Parses TOML configuration files and provides typed access to settings.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Address to bind the listener to
    ///
    /// `host` must be an IP literal; hostnames are rejected rather than
    /// falling back to a wildcard bind.
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            AppError::Config(format!(
                "server.host '{}' must be an IP address such as 127.0.0.1 or 0.0.0.0",
                self.host
            ))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Settings for the `/metrics` endpoint and HTTP request sampling
///
/// The endpoint is only exposed when at least one of `allow_any`,
/// `allow_internal`, or a complete `username`/`password` pair is set;
/// otherwise the collector middleware forwards every request untouched.
#[derive(Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Basic auth username for the metrics endpoint
    #[serde(default)]
    pub username: String,

    /// Basic auth password for the metrics endpoint
    #[serde(default)]
    pub password: String,

    /// Serve metrics to anyone when no credentials are configured
    #[serde(default)]
    pub allow_any: bool,

    /// Serve metrics to callers from private subnets without credentials
    #[serde(default)]
    pub allow_internal: bool,

    /// Sample inbound HTTP requests into `http_*` metrics
    ///
    /// Turn off when the metrics endpoint lives on a separate server from
    /// the traffic being measured.
    #[serde(default = "default_collect_http_request_metrics")]
    pub collect_http_request_metrics: bool,

    /// Only sample requests whose path starts with one of these prefixes
    #[serde(default)]
    pub path_prefix_filters: Vec<String>,

    /// Replacement for the `*` wildcard marker in route pattern labels
    #[serde(default)]
    pub asterisk_alternative: String,
}

fn default_collect_http_request_metrics() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            allow_any: false,
            allow_internal: false,
            collect_http_request_metrics: default_collect_http_request_metrics(),
            path_prefix_filters: Vec::new(),
            asterisk_alternative: String::new(),
        }
    }
}

impl std::fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("allow_any", &self.allow_any)
            .field("allow_internal", &self.allow_internal)
            .field(
                "collect_http_request_metrics",
                &self.collect_http_request_metrics,
            )
            .field("path_prefix_filters", &self.path_prefix_filters)
            .field("asterisk_alternative", &self.asterisk_alternative)
            .finish()
    }
}

impl TelemetryConfig {
    /// Whether both a username and a password are configured
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Whether any access mode exposes the metrics endpoint
    pub fn is_enabled(&self) -> bool {
        self.allow_any || self.allow_internal || self.has_credentials()
    }

    /// Validate telemetry settings
    pub fn validate(&self) -> AppResult<()> {
        if self.username.is_empty() != self.password.is_empty() {
            return Err(AppError::Config(
                "telemetry.username and telemetry.password must be set together".to_string(),
            ));
        }

        for prefix in &self.path_prefix_filters {
            if !prefix.starts_with('/') {
                return Err(AppError::Config(format!(
                    "telemetry.path_prefix_filters entry '{}' must start with '/'",
                    prefix
                )));
            }
        }

        if self.asterisk_alternative.contains('*') {
            return Err(AppError::Config(format!(
                "telemetry.asterisk_alternative '{}' cannot itself contain '*'",
                self.asterisk_alternative
            )));
        }

        Ok(())
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        tracing::debug!(
            telemetry_enabled = config.telemetry.is_enabled(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()` and `from_str()`, but
    /// can also be called explicitly on configs built in code.
    pub fn validate(&self) -> AppResult<()> {
        if self.server.port == 0 {
            return Err(AppError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }
        self.server.socket_addr()?;

        self.telemetry.validate()
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_str("[server]\nport = 8080\n").expect("should parse");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(!config.telemetry.is_enabled());
        assert!(config.telemetry.collect_http_request_metrics);
        assert!(config.telemetry.path_prefix_filters.is_empty());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_full_telemetry_section_parses() {
        let config = Config::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 3000

            [telemetry]
            username = "scraper"
            password = "s3cret"
            allow_internal = true
            collect_http_request_metrics = false
            path_prefix_filters = ["/api", "/v2"]
            asterisk_alternative = "wildcard"
            "#,
        )
        .expect("should parse");

        let telemetry = &config.telemetry;
        assert!(telemetry.has_credentials());
        assert!(telemetry.allow_internal);
        assert!(!telemetry.allow_any);
        assert!(!telemetry.collect_http_request_metrics);
        assert_eq!(telemetry.path_prefix_filters, vec!["/api", "/v2"]);
        assert_eq!(telemetry.asterisk_alternative, "wildcard");
    }

    #[test]
    fn test_enabled_by_any_single_mode() {
        let any = TelemetryConfig {
            allow_any: true,
            ..Default::default()
        };
        let internal = TelemetryConfig {
            allow_internal: true,
            ..Default::default()
        };
        let credentials = TelemetryConfig {
            username: "u".to_string(),
            password: "p".to_string(),
            ..Default::default()
        };

        assert!(any.is_enabled());
        assert!(internal.is_enabled());
        assert!(credentials.is_enabled());
        assert!(!TelemetryConfig::default().is_enabled());
    }

    #[test]
    fn test_half_credential_pair_does_not_enable() {
        let config = TelemetryConfig {
            username: "u".to_string(),
            ..Default::default()
        };
        assert!(!config.is_enabled());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_relative_path_prefix() {
        let result = Config::from_str(
            r#"
            [server]
            port = 3000

            [telemetry]
            allow_any = true
            path_prefix_filters = ["api"]
            "#,
        );
        let err = result.expect_err("relative prefix should be rejected");
        assert!(err.to_string().contains("must start with '/'"));
    }

    #[test]
    fn test_rejects_wildcard_in_asterisk_alternative() {
        let config = TelemetryConfig {
            asterisk_alternative: "**".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_port() {
        assert!(Config::from_str("[server]\nport = 0\n").is_err());
    }

    #[test]
    fn test_rejects_hostname_as_bind_address() {
        let err = Config::from_str("[server]\nhost = \"localhost\"\nport = 3000\n")
            .expect_err("hostname should be rejected");
        assert!(err.to_string().contains("server.host 'localhost'"));
    }

    #[test]
    fn test_socket_addr_from_ip_literal() {
        let config = Config::from_str("[server]\nhost = \"::1\"\nport = 8080\n")
            .expect("IPv6 literal should parse");
        assert_eq!(
            config.server.socket_addr().unwrap(),
            "[::1]:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = TelemetryConfig {
            username: "scraper".to_string(),
            password: "hunter2".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("scraper"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
