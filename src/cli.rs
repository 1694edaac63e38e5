//! Command-line interface for metroscope
//!
//! Provides argument parsing and subcommand handling for the demo server.

use clap::{Parser, Subcommand};

/// Demo HTTP server instrumented with Prometheus metrics
#[derive(Parser)]
#[command(name = "metroscope")]
#[command(version)]
#[command(about = "Demo HTTP server instrumented with Prometheus metrics")]
#[command(
    long_about = "metroscope serves a small demo API, samples every request into \
    Prometheus histograms and counters, and exposes them on /metrics behind \
    basic auth or an internal network check."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# metroscope configuration
# ========================

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 3000

# ─────────────────────────────────────────────────────────────────────────────
# TELEMETRY
# ─────────────────────────────────────────────────────────────────────────────
#
# /metrics is only served when at least one access mode is set. Checks run
# in this order, first match wins:
#   1. allow_internal: callers from private networks need no credentials
#   2. username/password: everyone else must present basic auth
#   3. allow_any: no credentials configured, serve everyone
# Otherwise /metrics answers 404.

[telemetry]
# Basic auth credentials (set both or neither)
username = ""
password = ""

allow_internal = true
allow_any = false

# Record http_request_duration_seconds and http_requests_total for each request
collect_http_request_metrics = true

# Only sample paths starting with one of these prefixes ("/" is always sampled)
path_prefix_filters = []

# Replacement for "*" in wildcard route labels
asterisk_alternative = ""

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"
"#
}
