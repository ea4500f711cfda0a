//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! cloned into every connection task and the persistence task. It holds the
//! grid, the connection registry, the rate limiter that reads the registry,
//! and the immutable config. There is exactly one canvas per process.

use std::sync::Arc;

use crate::config::Config;
use crate::rate_limit::RateLimiter;
use crate::services::grid::GridStore;
use crate::services::registry::Registry;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub grid: GridStore,
    pub registry: Registry,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let grid = GridStore::new(config.grid_width, config.grid_height, Arc::new(config.palette.clone()));
        let registry = Registry::new();
        let rate_limiter = RateLimiter::new(registry.clone(), config.rate_limit_interval);
        Self { config: Arc::new(config), grid, registry, rate_limiter }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
