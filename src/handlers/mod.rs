//! HTTP request handlers for the metroscope demo server

use crate::metrics::{Reporter, Scope};
use std::sync::Arc;

pub mod api;
pub mod metrics;

/// Application state shared across all handlers
///
/// Holds the application scope; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    scope: Scope,
}

impl AppState {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }

    /// Scope application measurements are recorded on
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Reporter backing the application scope
    pub fn reporter(&self) -> &Arc<Reporter> {
        self.scope.reporter()
    }
}
