// Consecutive-failure circuit breaker guarding the sandbox

use autograder_common::BreakerConfig;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    backoff_until: Option<Instant>,
    /// Times the threshold was crossed since the last success
    trips: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed,
    Open { retry_in: Duration },
}

impl BreakerStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerStatus::Open { .. })
    }
}

/// Read-only view for health reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub consecutive_failures: u32,
    pub trips: u32,
    pub open: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Check whether a request may go out
    ///
    /// An elapsed backoff closes the circuit again and clears the failure
    /// count; the trip count is kept so the next trip backs off longer.
    pub fn check(&self) -> BreakerStatus {
        let mut state = self.state.lock();
        let Some(until) = state.backoff_until else {
            return BreakerStatus::Closed;
        };

        let now = Instant::now();
        if now < until {
            return BreakerStatus::Open {
                retry_in: until - now,
            };
        }

        info!(trips = state.trips, "Circuit breaker backoff elapsed, closing");
        state.backoff_until = None;
        state.consecutive_failures = 0;
        crate::metrics::BREAKER_OPEN.set(0);
        BreakerStatus::Closed
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.consecutive_failures > 0 || state.trips > 0 {
            info!(
                failures = state.consecutive_failures,
                trips = state.trips,
                "Sandbox recovered, resetting circuit breaker"
            );
        }
        *state = BreakerState::default();
        crate::metrics::BREAKER_OPEN.set(0);
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        let already_open = matches!(state.backoff_until, Some(until) if Instant::now() < until);
        if state.consecutive_failures >= self.config.failure_threshold && !already_open {
            state.trips = state.trips.saturating_add(1);
            let backoff = self.backoff_for(state.trips);
            state.backoff_until = Some(Instant::now() + backoff);
            crate::metrics::BREAKER_OPEN.set(1);
            warn!(
                failures = state.consecutive_failures,
                trips = state.trips,
                backoff_secs = backoff.as_secs(),
                "Circuit breaker opened"
            );
        }
    }

    /// `min(base * 2^(trips-1), max)`
    fn backoff_for(&self, trips: u32) -> Duration {
        let exponent = trips.saturating_sub(1).min(16);
        let factor = 1u32 << exponent;
        self.config
            .base_backoff
            .saturating_mul(factor)
            .min(self.config.max_backoff)
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.lock();
        BreakerSnapshot {
            consecutive_failures: state.consecutive_failures,
            trips: state.trips,
            open: matches!(state.backoff_until, Some(until) if Instant::now() < until),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
