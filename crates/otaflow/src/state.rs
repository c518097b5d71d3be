//! Application state shared across HTTP handlers

use std::sync::Arc;

use otaflow_core::Orchestrator;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// The firmware update orchestrator
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Create new application state
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}
