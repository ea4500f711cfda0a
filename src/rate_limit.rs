//! Per-connection rate limiting for pixel placements.
//!
//! DESIGN
//! ======
//! Minimum-interval limiter: an update is accepted when the connection has
//! no accepted update yet, or when at least `min_interval` has passed since
//! the last one. Accepting stamps the record with `now`; rejecting leaves it
//! untouched, so a burst of rejected updates does not push the window out.
//!
//! Records live in the connection registry next to the active set, so they
//! disappear with the connection.

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::services::registry::Registry;

/// Default minimum spacing between accepted updates (10 per second).
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 100;

#[derive(Clone)]
pub struct RateLimiter {
    registry: Registry,
    min_interval: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(registry: Registry, min_interval: Duration) -> Self {
        Self { registry, min_interval }
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Check and record one update from `client_id`.
    pub fn accept(&self, client_id: Uuid) -> bool {
        self.accept_at(client_id, Instant::now())
    }

    /// Internal: check + record with explicit timestamp (for testing).
    pub(crate) fn accept_at(&self, client_id: Uuid, now: Instant) -> bool {
        let min_interval = self.min_interval;
        self.registry
            .try_record(client_id, |last| admits(last, now, min_interval).then_some(now))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn admits(last: Option<Instant>, now: Instant, min_interval: Duration) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= min_interval,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
