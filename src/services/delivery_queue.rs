use crate::domain::message::DeliveryResult;
use crate::domain::submission::SubmissionId;
use crate::error::DeliveryError;
use crate::workers::DeliveryWorker;
use futures::future::BoxFuture;
use opentelemetry::{global, metrics::UpDownCounter};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};

pub type DeliveryOutcome = Result<DeliveryResult, DeliveryError>;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) depth: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            depth: meter
                .i64_up_down_counter("courier_delivery_queue_depth")
                .with_description("Submissions waiting for the delivery worker")
                .build(),
        }
    }
}

/// One queued submission: the work to run and the channel its submitter is waiting on.
pub struct DeliveryTask {
    pub(crate) submission_id: SubmissionId,
    pub(crate) job: BoxFuture<'static, DeliveryOutcome>,
    pub(crate) responder: oneshot::Sender<DeliveryOutcome>,
}

impl fmt::Debug for DeliveryTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryTask").field("submission_id", &self.submission_id).finish_non_exhaustive()
    }
}

/// Producer side of the FIFO drained by the single [`DeliveryWorker`].
///
/// Enqueueing never waits; the channel is unbounded and admission is bounded by
/// the per-client rate limit instead.
#[derive(Clone, Debug)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<DeliveryTask>,
    depth: Arc<AtomicUsize>,
    metrics: Metrics,
}

impl DeliveryQueue {
    /// Creates the queue together with the worker that drains it.
    #[must_use]
    pub fn new() -> (Self, DeliveryWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let metrics = Metrics::new();
        let worker = DeliveryWorker::new(rx, Arc::clone(&depth), metrics.clone());
        (Self { tx, depth, metrics }, worker)
    }

    /// Appends a job and returns the receiver that will carry its outcome.
    ///
    /// # Errors
    /// Returns `DeliveryError::QueueClosed` if the worker has shut down.
    pub fn enqueue(
        &self,
        submission_id: SubmissionId,
        job: BoxFuture<'static, DeliveryOutcome>,
    ) -> Result<oneshot::Receiver<DeliveryOutcome>, DeliveryError> {
        let (responder, completion) = oneshot::channel();
        self.depth.fetch_add(1, Ordering::SeqCst);

        if self.tx.send(DeliveryTask { submission_id, job, responder }).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            tracing::error!(submission_id = %submission_id, "Delivery worker is gone, rejecting submission");
            return Err(DeliveryError::QueueClosed);
        }

        self.metrics.depth.add(1, &[]);
        tracing::debug!(submission_id = %submission_id, depth = self.depth(), "Submission queued");
        Ok(completion)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}
