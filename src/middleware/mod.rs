//! HTTP middleware for metrics exposure and request sampling

pub mod access;
pub mod collector;
pub mod sample;

pub use access::{AccessDecision, AccessPolicy, AuthParseError, BasicCredentials};
pub use collector::{Collector, SCRAPE_PATH, collect};
pub use sample::{RequestSample, RequestSampler};
