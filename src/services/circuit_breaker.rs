//! Per-sender circuit breaker.
//!
//! ```text
//! Closed   → Open:     cumulative failures reach the threshold
//! Open     → HalfOpen: first call after the reset timeout has elapsed
//! HalfOpen → Closed:   the trial call succeeds
//! HalfOpen → Open:     the trial call fails
//! ```
//!
//! The failure count only resets on success. It is carried over into the
//! half-open state, so a failed trial call re-trips the breaker straight away.

use crate::config::BreakerConfig;
use opentelemetry::{KeyValue, global, metrics::Counter};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakerError<E> {
    #[error("Circuit is OPEN for {sender}; call rejected")]
    Open { sender: String },
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

#[derive(Clone, Debug)]
struct Metrics {
    transitions_total: Counter<u64>,
    rejected_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            transitions_total: meter
                .u64_counter("courier_breaker_transitions_total")
                .with_description("Circuit breaker state transitions")
                .build(),
            rejected_total: meter
                .u64_counter("courier_breaker_rejected_total")
                .with_description("Calls rejected by an open circuit")
                .build(),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
    metrics: Metrics,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::with_settings(name, config.failure_threshold, Duration::from_millis(config.reset_timeout_ms))
    }

    #[must_use]
    pub fn with_settings(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState { state: CircuitState::Closed, failure_count: 0, last_failure_time: None }),
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Runs `call` unless the circuit is open.
    ///
    /// # Errors
    /// Returns `BreakerError::Open` without invoking `call` while the circuit is open,
    /// otherwise wraps whatever error `call` produced.
    pub async fn execute<T, E, F, Fut>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(BreakerError::Open { sender: self.name.clone() });
        }

        match call().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.state != CircuitState::Open {
            return true;
        }

        if state.last_failure_time.is_none_or(|at| at.elapsed() > self.reset_timeout) {
            self.transition(&mut state, CircuitState::HalfOpen);
            return true;
        }

        self.metrics.rejected_total.add(1, &[KeyValue::new("sender", self.name.clone())]);
        tracing::debug!(sender = %self.name, "Circuit open, rejecting call");
        false
    }

    fn record_success(&self) {
        let mut state = self.state.lock();
        state.failure_count = 0;
        state.last_failure_time = None;
        if state.state != CircuitState::Closed {
            self.transition(&mut state, CircuitState::Closed);
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count = state.failure_count.saturating_add(1);

        if state.failure_count >= self.failure_threshold {
            state.last_failure_time = Some(Instant::now());
            if state.state != CircuitState::Open {
                self.transition(&mut state, CircuitState::Open);
            }
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.state;
        state.state = to;
        self.metrics.transitions_total.add(
            1,
            &[KeyValue::new("sender", self.name.clone()), KeyValue::new("to", to.as_str())],
        );

        match to {
            CircuitState::Open => tracing::warn!(
                sender = %self.name,
                from = from.as_str(),
                failures = state.failure_count,
                reset_timeout_ms = u64::try_from(self.reset_timeout.as_millis()).unwrap_or(u64::MAX),
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::info!(sender = %self.name, "Circuit breaker half-open, probing sender"),
            CircuitState::Closed => tracing::info!(sender = %self.name, from = from.as_str(), "Circuit breaker closed"),
        }
    }
}
