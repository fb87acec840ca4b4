use crate::services::rate_limit_service::RateLimitService;
use opentelemetry::{global, metrics::Counter};
use std::time::Duration;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    evicted: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            evicted: meter
                .u64_counter("courier_rate_limit_clients_evicted_total")
                .with_description("Idle client windows removed by the rate limit sweep")
                .build(),
        }
    }
}

/// Periodically drops rate-limit windows for clients that have gone quiet.
#[derive(Debug)]
pub struct RateLimitSweepWorker {
    limiter: RateLimitService,
    interval: Duration,
    metrics: Metrics,
}

impl RateLimitSweepWorker {
    #[must_use]
    pub fn new(limiter: RateLimitService, interval: Duration) -> Self {
        Self { limiter, interval, metrics: Metrics::new() }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut next_tick = tokio::time::Instant::now() + self.interval;

        while !*shutdown.borrow() {
            tokio::select! {
                () = tokio::time::sleep_until(next_tick) => {
                    async {
                        let evicted = self.limiter.prune_idle();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = self.limiter.tracked_clients(), "Swept idle rate limit windows");
                            self.metrics.evicted.add(evicted as u64, &[]);
                        }
                    }
                    .instrument(tracing::info_span!("rate_limit_sweep_iteration"))
                    .await;
                    next_tick = tokio::time::Instant::now() + self.interval;
                }
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Rate limit sweep loop shutting down...");
    }
}
