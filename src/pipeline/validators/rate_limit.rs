//! Per-client minimum-interval rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::pipeline::context::RequestContext;
use crate::pipeline::validators::{RequestValidator, ValidatorError};
use crate::pipeline::violation::{SecurityViolation, Severity, ViolationKind};

/// Shared last-seen state for the rate limiter.
///
/// Constructed once per process and handed to the validator; the map is
/// guarded by a single lock so the check-and-update is atomic.
#[derive(Clone, Default)]
pub struct RateLimiterState {
    last_seen: Arc<Mutex<HashMap<IpAddr, Instant>>>,
}

impl RateLimiterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic test-and-set: returns false when `client` was seen within
    /// `min_interval`, otherwise records now as the last-seen time.
    fn try_acquire(&self, client: IpAddr, min_interval: Duration) -> bool {
        let now = Instant::now();
        let mut map = self.last_seen.lock().expect("rate limiter mutex poisoned");
        if let Some(last) = map.get(&client) {
            if now.duration_since(*last) < min_interval {
                return false;
            }
        }
        map.insert(client, now);
        true
    }
}

/// Fails (non-critically) when the same client address issues a second
/// request within the configured minimum interval.
pub struct RateLimitValidator {
    state: RateLimiterState,
    min_interval: Duration,
}

impl RateLimitValidator {
    pub fn new(state: RateLimiterState, min_interval: Duration) -> Self {
        Self { state, min_interval }
    }
}

impl RequestValidator for RateLimitValidator {
    fn name(&self) -> &'static str {
        "RateLimitValidator"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn validate(&self, ctx: &RequestContext) -> Result<Option<SecurityViolation>, ValidatorError> {
        if self.state.try_acquire(ctx.remote_addr, self.min_interval) {
            return Ok(None);
        }

        Ok(Some(
            SecurityViolation::new(
                ViolationKind::RateLimit,
                Severity::Medium,
                self.name(),
                "Request interval below minimum",
            )
            .with_detail("client", ctx.remote_addr.to_string())
            .with_detail("min_interval_ms", self.min_interval.as_millis().to_string()),
        ))
    }
}
