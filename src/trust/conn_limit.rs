//! Per-endpoint concurrent-connection accounting.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use crate::config::schema::ConnectionLimitConfig;
use crate::observability::metrics;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Live connection state for one remote endpoint.
#[derive(Debug)]
struct EndpointState {
    live: AtomicI64,
    last_activity: AtomicU64,
}

impl EndpointState {
    fn new() -> Self {
        Self {
            live: AtomicI64::new(0),
            last_activity: AtomicU64::new(now_secs()),
        }
    }
}

/// Counts live connections per remote endpoint and enforces a
/// concurrency limit before the handshake completes.
///
/// Register/release are lock-free atomic updates; the periodic sweep
/// removes idle zero-count entries so the endpoint map stays bounded.
pub struct ConnectionRateLimiter {
    endpoints: DashMap<String, Arc<EndpointState>>,
    sweep_interval: Duration,
    stale_after: Duration,
}

impl ConnectionRateLimiter {
    pub fn new(config: &ConnectionLimitConfig) -> Self {
        Self {
            endpoints: DashMap::new(),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            stale_after: Duration::from_secs(config.stale_after_secs),
        }
    }

    /// True when a new connection from `endpoint` is within the limit.
    /// A limit of zero or below disables enforcement.
    pub fn check(&self, endpoint: &str, limit: i64) -> bool {
        if limit <= 0 {
            return true;
        }
        let live = self
            .endpoints
            .get(endpoint)
            .map(|st| st.live.load(Ordering::Relaxed))
            .unwrap_or(0);
        let allowed = live < limit;
        if !allowed {
            metrics::record_connection_rejected();
            tracing::warn!(endpoint, live, limit, "Connection limit exceeded");
        }
        allowed
    }

    /// Record a new live connection for `endpoint`.
    pub fn register(&self, endpoint: &str) {
        let state = self
            .endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(EndpointState::new()))
            .clone();
        state.live.fetch_add(1, Ordering::Relaxed);
        state.last_activity.store(now_secs(), Ordering::Relaxed);
    }

    /// Record a closed connection. The count floors at zero.
    pub fn release(&self, endpoint: &str) {
        if let Some(state) = self.endpoints.get(endpoint) {
            let _ = state
                .live
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |live| {
                    (live > 0).then(|| live - 1)
                });
            state.last_activity.store(now_secs(), Ordering::Relaxed);
        }
    }

    /// Current live count for an endpoint.
    pub fn live(&self, endpoint: &str) -> i64 {
        self.endpoints
            .get(endpoint)
            .map(|st| st.live.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Number of tracked endpoints.
    pub fn tracked_endpoints(&self) -> usize {
        self.endpoints.len()
    }

    /// Remove endpoints with no live connections and no recent
    /// activity. An entry that changed between scan and removal is
    /// kept; retain re-checks each entry under its own shard lock.
    pub fn sweep(&self) {
        let cutoff = now_secs().saturating_sub(self.stale_after.as_secs());
        let before = self.endpoints.len();
        self.endpoints.retain(|_, state| {
            state.live.load(Ordering::Relaxed) > 0
                || state.last_activity.load(Ordering::Relaxed) >= cutoff
        });
        let removed = before - self.endpoints.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.endpoints.len(), "Swept stale endpoints");
        }
    }

    /// Register a connection and get a guard that releases it on drop.
    pub fn track(self: &Arc<Self>, endpoint: &str) -> EndpointConnectionGuard {
        self.register(endpoint);
        EndpointConnectionGuard {
            limiter: Arc::clone(self),
            endpoint: endpoint.to_string(),
        }
    }

    /// Run the sweep on its own schedule until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        let mut interval = tokio::time::interval(limiter.sweep_interval);
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                limiter.sweep();
            }
        })
    }
}

/// RAII guard for one live connection.
pub struct EndpointConnectionGuard {
    limiter: Arc<ConnectionRateLimiter>,
    endpoint: String,
}

impl Drop for EndpointConnectionGuard {
    fn drop(&mut self) {
        self.limiter.release(&self.endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(stale_after_secs: u64) -> ConnectionRateLimiter {
        ConnectionRateLimiter::new(&ConnectionLimitConfig {
            max_connections_per_endpoint: 0,
            sweep_interval_secs: 300,
            stale_after_secs,
        })
    }

    #[test]
    fn zero_limit_disables_enforcement() {
        let limiter = limiter(1800);
        limiter.register("10.0.0.1:50000");
        assert!(limiter.check("10.0.0.1:50000", 0));
        assert!(limiter.check("10.0.0.1:50000", -1));
    }

    #[test]
    fn limit_counts_live_connections() {
        let limiter = limiter(1800);

        limiter.register("peer");
        limiter.register("peer");
        limiter.release("peer");
        // One live connection, limit one: refused.
        assert!(!limiter.check("peer", 1));

        limiter.release("peer");
        assert!(limiter.check("peer", 1));
    }

    #[test]
    fn count_never_goes_negative() {
        let limiter = limiter(1800);
        limiter.register("peer");
        limiter.release("peer");
        limiter.release("peer");
        limiter.release("peer");
        assert_eq!(limiter.live("peer"), 0);
    }

    #[test]
    fn unknown_endpoint_is_unlimited_until_registered() {
        let limiter = limiter(1800);
        assert!(limiter.check("unseen", 1));
    }

    #[test]
    fn guard_releases_on_drop() {
        let limiter = Arc::new(limiter(1800));
        let guard = limiter.track("peer");
        assert_eq!(limiter.live("peer"), 1);
        drop(guard);
        assert_eq!(limiter.live("peer"), 0);
    }

    #[test]
    fn sweep_removes_idle_stale_entries_only() {
        let limiter = limiter(0);

        limiter.register("idle");
        limiter.release("idle");
        limiter.register("busy");
        assert_eq!(limiter.tracked_endpoints(), 2);

        // stale_after of zero makes every idle entry immediately stale.
        std::thread::sleep(Duration::from_millis(1100));
        limiter.sweep();

        assert_eq!(limiter.tracked_endpoints(), 1);
        assert_eq!(limiter.live("busy"), 1);
    }
}
