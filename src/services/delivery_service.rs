use crate::adapters::sender::{MessageSender, SenderError};
use crate::config::Config;
use crate::domain::message::{DeliveryResult, Message, Receipt};
use crate::domain::status::StatusView;
use crate::domain::submission::{AttemptRecord, SubmissionId, SubmissionStatus};
use crate::error::{DeliveryError, DeliveryFailure};
use crate::services::circuit_breaker::{BreakerError, CircuitBreaker, CircuitState};
use crate::services::delivery_queue::{DeliveryOutcome, DeliveryQueue};
use crate::services::idempotency_service::{IdempotencyService, InFlightDelivery, Reservation};
use crate::services::rate_limit_service::RateLimitService;
use crate::services::retry::RetryPolicy;
use crate::services::status_tracker::StatusTracker;
use crate::workers::DeliveryWorker;
use futures::FutureExt;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    submissions_total: Counter<u64>,
    attempts_total: Counter<u64>,
    deliveries_total: Counter<u64>,
    delivery_duration: Histogram<f64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            submissions_total: meter
                .u64_counter("courier_submissions_total")
                .with_description("Submissions by admission outcome (queued/duplicate/rate_limited/rejected)")
                .build(),
            attempts_total: meter
                .u64_counter("courier_send_attempts_total")
                .with_description("Individual send attempts by sender and outcome")
                .build(),
            deliveries_total: meter
                .u64_counter("courier_deliveries_total")
                .with_description("Finished deliveries by final status")
                .build(),
            delivery_duration: meter
                .f64_histogram("courier_delivery_duration_seconds")
                .with_description("Time from dequeue to final outcome, including backoff waits")
                .with_unit("s")
                .build(),
        }
    }
}

/// A sender together with the breaker that guards it.
#[derive(Debug)]
struct SenderRoute {
    sender: Arc<dyn MessageSender>,
    breaker: CircuitBreaker,
}

/// Owned by a queued job. If the job is dropped before it finishes, the submission
/// is marked failed and its idempotency key is released.
#[derive(Debug)]
struct JobGuard {
    service: DeliveryService,
    submission_id: SubmissionId,
    idempotency_key: Option<String>,
    settled: bool,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::warn!(submission_id = %self.submission_id, "Delivery abandoned before completion");
        self.service.tracker.mark(self.submission_id, SubmissionStatus::Failed);
        if let Some(key) = self.idempotency_key.as_deref() {
            self.service.idempotency.release(key, DeliveryError::QueueClosed);
        }
    }
}

/// Result of admitting a message.
#[derive(Debug)]
pub enum Submission {
    /// The idempotency key was already delivered; this is the cached result.
    Duplicate(DeliveryResult),
    /// Another submission with the same idempotency key is still queued; this one
    /// shares its outcome and is not delivered separately.
    InFlight(InFlightDelivery),
    /// The message was queued and will be delivered by the worker.
    Queued(PendingDelivery),
}

impl Submission {
    #[must_use]
    pub const fn submission_id(&self) -> SubmissionId {
        match self {
            Self::Duplicate(result) => result.submission_id,
            Self::InFlight(attached) => attached.submission_id(),
            Self::Queued(pending) => pending.submission_id,
        }
    }

    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_) | Self::InFlight(_))
    }

    /// Waits for the final outcome. Resolves immediately for duplicates.
    ///
    /// # Errors
    /// Returns a `DeliveryFailure` if every sender failed or the queue shut down first.
    pub async fn outcome(self) -> Result<DeliveryResult, DeliveryFailure> {
        match self {
            Self::Duplicate(result) => Ok(result),
            Self::InFlight(attached) => attached.wait().await,
            Self::Queued(pending) => pending.wait().await,
        }
    }
}

/// Handle to a queued submission.
#[derive(Debug)]
pub struct PendingDelivery {
    submission_id: SubmissionId,
    rx: oneshot::Receiver<DeliveryOutcome>,
}

impl PendingDelivery {
    #[must_use]
    pub const fn submission_id(&self) -> SubmissionId {
        self.submission_id
    }

    /// # Errors
    /// Returns a `DeliveryFailure` carrying this submission's id if delivery did not succeed.
    pub async fn wait(self) -> Result<DeliveryResult, DeliveryFailure> {
        let outcome = self.rx.await.unwrap_or(Err(DeliveryError::QueueClosed));
        outcome.map_err(|error| DeliveryFailure { submission_id: self.submission_id, error })
    }
}

/// Owns the delivery pipeline: admission (rate limit, idempotency), the queue, and
/// the sender fallback chain with per-sender retries and circuit breakers.
#[derive(Clone, Debug)]
pub struct DeliveryService {
    routes: Arc<[SenderRoute]>,
    rate_limiter: RateLimitService,
    idempotency: IdempotencyService,
    tracker: StatusTracker,
    retry: RetryPolicy,
    send_timeout: Duration,
    queue: DeliveryQueue,
    metrics: Metrics,
}

impl DeliveryService {
    /// Builds the service and the worker that must be spawned to drain its queue.
    ///
    /// Senders are tried in the order given.
    #[must_use]
    pub fn new(senders: Vec<Arc<dyn MessageSender>>, config: &Config) -> (Self, DeliveryWorker) {
        let routes: Vec<SenderRoute> = senders
            .into_iter()
            .map(|sender| {
                let breaker = CircuitBreaker::new(sender.name(), &config.breaker);
                SenderRoute { sender, breaker }
            })
            .collect();

        let (queue, worker) = DeliveryQueue::new();

        let service = Self {
            routes: routes.into(),
            rate_limiter: RateLimitService::new(&config.rate_limit),
            idempotency: IdempotencyService::new(),
            tracker: StatusTracker::new(),
            retry: RetryPolicy::new(&config.retry),
            send_timeout: Duration::from_millis(config.retry.send_timeout_ms),
            queue,
            metrics: Metrics::new(),
        };
        (service, worker)
    }

    /// Admits a message for delivery.
    ///
    /// # Errors
    /// Returns `DeliveryError::RateLimitExceeded` if the client is over its limit, or
    /// `DeliveryError::QueueClosed` if the delivery worker has stopped.
    #[tracing::instrument(skip_all, fields(client_id = %client_id))]
    pub fn submit(
        &self,
        message: Message,
        idempotency_key: Option<String>,
        client_id: &str,
    ) -> Result<Submission, DeliveryError> {
        if !self.rate_limiter.is_allowed(client_id) {
            self.metrics.submissions_total.add(1, &[KeyValue::new("outcome", "rate_limited")]);
            return Err(DeliveryError::RateLimitExceeded { client_id: client_id.to_owned() });
        }

        let submission_id = SubmissionId::generate();

        if let Some(key) = idempotency_key.as_deref() {
            match self.idempotency.reserve(key, submission_id) {
                Reservation::Reserved => {}
                Reservation::Sent(result) => {
                    tracing::info!(idempotency_key = %key, submission_id = %result.submission_id, "Duplicate request detected");
                    self.metrics.submissions_total.add(1, &[KeyValue::new("outcome", "duplicate")]);
                    return Ok(Submission::Duplicate(result));
                }
                Reservation::InFlight(attached) => {
                    tracing::info!(
                        idempotency_key = %key,
                        submission_id = %attached.submission_id(),
                        "Duplicate request detected while first is in flight"
                    );
                    self.metrics.submissions_total.add(1, &[KeyValue::new("outcome", "duplicate")]);
                    return Ok(Submission::InFlight(attached));
                }
            }
        }

        self.tracker.create(submission_id);

        // Dropping the job unfinished (shutdown, rejected enqueue, worker panic) settles it through the guard.
        let mut guard = JobGuard { service: self.clone(), submission_id, idempotency_key, settled: false };
        let job = async move {
            let outcome = guard.service.deliver(submission_id, message, guard.idempotency_key.as_deref()).await;
            guard.settled = true;
            outcome
        }
        .boxed();

        match self.queue.enqueue(submission_id, job) {
            Ok(rx) => {
                self.metrics.submissions_total.add(1, &[KeyValue::new("outcome", "queued")]);
                tracing::debug!(submission_id = %submission_id, "Submission accepted");
                Ok(Submission::Queued(PendingDelivery { submission_id, rx }))
            }
            Err(e) => {
                self.metrics.submissions_total.add(1, &[KeyValue::new("outcome", "rejected")]);
                Err(e)
            }
        }
    }

    /// # Errors
    /// Returns `DeliveryError::InvalidFormat` for malformed ids and
    /// `DeliveryError::NotFound` for ids that were never issued.
    pub fn get_status(&self, raw_id: &str) -> Result<StatusView, DeliveryError> {
        self.tracker.view(raw_id)
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimitService {
        &self.rate_limiter
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    #[must_use]
    pub fn breaker_state(&self, sender: &str) -> Option<CircuitState> {
        self.routes.iter().find(|route| route.sender.name() == sender).map(|route| route.breaker.state())
    }

    async fn deliver(
        &self,
        submission_id: SubmissionId,
        message: Message,
        idempotency_key: Option<&str>,
    ) -> DeliveryOutcome {
        let started = Instant::now();

        for route in self.routes.iter() {
            let name = route.sender.name();
            match self.deliver_via(submission_id, route, &message).await {
                Ok(receipt) => {
                    let result = DeliveryResult::new(submission_id, receipt);
                    self.tracker.mark(submission_id, SubmissionStatus::Success);
                    if let Some(key) = idempotency_key {
                        self.idempotency.mark_as_sent(key, &result);
                    }
                    tracing::info!(sender = %name, message_id = %result.message_id, "Message sent via {name}");
                    self.finish("success", started);
                    return Ok(result);
                }
                Err(e) => {
                    tracing::warn!(sender = %name, error = %e, "Failed with sender {name}, trying next");
                }
            }
        }

        self.tracker.mark(submission_id, SubmissionStatus::Failed);
        if let Some(key) = idempotency_key {
            self.idempotency.release(key, DeliveryError::AllSendersFailed);
        }
        tracing::error!(senders = self.routes.len(), "All senders failed");
        self.finish("failed", started);
        Err(DeliveryError::AllSendersFailed)
    }

    /// Retries one sender through its breaker. An open circuit ends the retries at once.
    async fn deliver_via(
        &self,
        submission_id: SubmissionId,
        route: &SenderRoute,
        message: &Message,
    ) -> Result<Receipt, BreakerError<SenderError>> {
        let name = route.sender.name();

        self.retry
            .run_when(
                move || async move {
                    let timestamp = OffsetDateTime::now_utc();
                    let result = route.breaker.execute(|| self.send_with_timeout(route.sender.as_ref(), message)).await;

                    let (attempt, status) = match &result {
                        Ok(receipt) => (AttemptRecord::succeeded(name, timestamp, receipt.message_id.as_str()), "success"),
                        Err(e) => (
                            AttemptRecord::failed(name, timestamp, e.to_string()),
                            if e.is_open() { "circuit_open" } else { "failure" },
                        ),
                    };
                    self.tracker.record_attempt(submission_id, attempt);
                    self.metrics
                        .attempts_total
                        .add(1, &[KeyValue::new("sender", name.to_owned()), KeyValue::new("status", status)]);
                    result
                },
                |e: &BreakerError<SenderError>| !e.is_open(),
            )
            .instrument(tracing::info_span!("send", sender = %name))
            .await
    }

    async fn send_with_timeout(&self, sender: &dyn MessageSender, message: &Message) -> Result<Receipt, SenderError> {
        tokio::time::timeout(self.send_timeout, sender.send(message)).await.unwrap_or_else(|_| {
            Err(SenderError::Timeout {
                provider: sender.name().to_owned(),
                timeout_ms: u64::try_from(self.send_timeout.as_millis()).unwrap_or(u64::MAX),
            })
        })
    }

    fn finish(&self, status: &'static str, started: Instant) {
        let attrs = [KeyValue::new("status", status)];
        self.metrics.deliveries_total.add(1, &attrs);
        self.metrics.delivery_duration.record(started.elapsed().as_secs_f64(), &attrs);
    }
}
