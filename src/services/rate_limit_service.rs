use crate::config::RateLimitConfig;
use dashmap::DashMap;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
struct Metrics {
    decisions_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            decisions_total: meter
                .u64_counter("courier_rate_limit_decisions_total")
                .with_description("Rate limit decisions (allowed/throttled)")
                .build(),
        }
    }
}

/// Sliding-window limiter keyed by client identifier.
///
/// Each client keeps the timestamps of its admitted requests inside the trailing
/// window. The prune, count and record steps run under the map shard's write lock,
/// so concurrent checks for the same client cannot both slip under the limit.
#[derive(Clone, Debug)]
pub struct RateLimitService {
    windows: Arc<DashMap<String, VecDeque<Instant>>>,
    limit: usize,
    window: Duration,
    metrics: Metrics,
}

impl RateLimitService {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(config.limit, Duration::from_millis(config.window_ms))
    }

    #[must_use]
    pub fn with_limits(limit: usize, window: Duration) -> Self {
        Self { windows: Arc::new(DashMap::new()), limit, window, metrics: Metrics::new() }
    }

    /// Admits the request and records it, or rejects it without recording.
    #[must_use]
    pub fn is_allowed(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let mut timestamps = self.windows.entry(client_id.to_owned()).or_default();
        self.prune(&mut timestamps, now);

        let allowed = timestamps.len() < self.limit;
        if allowed {
            timestamps.push_back(now);
        }
        drop(timestamps);

        self.log_decision(client_id, allowed);
        allowed
    }

    /// Drops clients whose windows hold no live timestamps. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            self.prune(timestamps, now);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        let Some(window_start) = now.checked_sub(self.window) else {
            return;
        };
        while timestamps.front().is_some_and(|&at| at <= window_start) {
            timestamps.pop_front();
        }
    }

    fn log_decision(&self, client_id: &str, allowed: bool) {
        let label = if allowed {
            "allowed"
        } else {
            tracing::warn!(client_id = %client_id, limit = self.limit, "Rate limit exceeded");
            "throttled"
        };

        self.metrics.decisions_total.add(1, &[KeyValue::new("status", label)]);
    }
}
