//! Application state.

use std::sync::Arc;

use kiln_engine::BuildRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<BuildRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<BuildRegistry>) -> Self {
        Self { registry }
    }
}
