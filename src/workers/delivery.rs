use crate::error::DeliveryError;
use crate::services::delivery_queue::{DeliveryTask, Metrics};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

/// Drains the delivery queue one task at a time, in submission order.
///
/// A dequeued task always runs to completion, including its backoff waits. On
/// shutdown the task in hand is finished and everything still queued is rejected
/// with `DeliveryError::QueueClosed`.
#[derive(Debug)]
pub struct DeliveryWorker {
    rx: mpsc::UnboundedReceiver<DeliveryTask>,
    depth: Arc<AtomicUsize>,
    metrics: Metrics,
}

impl DeliveryWorker {
    pub(crate) const fn new(rx: mpsc::UnboundedReceiver<DeliveryTask>, depth: Arc<AtomicUsize>, metrics: Metrics) -> Self {
        Self { rx, depth, metrics }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Delivery worker started");

        while !*shutdown.borrow() {
            tokio::select! {
                task = self.rx.recv() => {
                    let Some(task) = task else { break };
                    self.process(task).await;
                }
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }

        self.reject_pending();
        tracing::info!("Delivery worker shutting down...");
    }

    async fn process(&self, task: DeliveryTask) {
        let DeliveryTask { submission_id, job, responder } = task;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        self.metrics.depth.add(-1, &[]);

        let outcome = job.instrument(tracing::info_span!("delivery", %submission_id)).await;
        if let Err(e) = &outcome {
            tracing::debug!(submission_id = %submission_id, error = %e, "Delivery task failed");
        }

        if responder.send(outcome).is_err() {
            tracing::debug!(submission_id = %submission_id, "Submitter stopped waiting before delivery finished");
        }
    }

    fn reject_pending(&mut self) {
        self.rx.close();
        let mut rejected = 0usize;
        while let Ok(task) = self.rx.try_recv() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            self.metrics.depth.add(-1, &[]);
            // The job settles its submission when dropped, before the submitter hears back.
            let DeliveryTask { job, responder, .. } = task;
            drop(job);
            let _ = responder.send(Err(DeliveryError::QueueClosed));
            rejected += 1;
        }
        if rejected > 0 {
            tracing::warn!(count = rejected, "Rejected queued submissions on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::message::DeliveryResult;
    use crate::domain::submission::SubmissionId;
    use crate::error::DeliveryError;
    use crate::services::delivery_queue::{DeliveryOutcome, DeliveryQueue};
    use futures::FutureExt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::watch;

    fn ok(id: SubmissionId) -> DeliveryOutcome {
        Ok(DeliveryResult { submission_id: id, success: true, provider: "Provider1".into(), message_id: "msg_1".into() })
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_one_at_a_time_in_order() {
        let (queue, worker) = DeliveryQueue::new();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(worker.run(shutdown_rx));

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut receivers = Vec::new();
        for (label, delay_ms) in [("a", 300u64), ("b", 10), ("c", 100)] {
            let id = SubmissionId::generate();
            let log = Arc::clone(&log);
            let job = async move {
                log.lock().expect("lock").push(format!("{label}:start"));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                log.lock().expect("lock").push(format!("{label}:end"));
                ok(id)
            }
            .boxed();
            receivers.push(queue.enqueue(id, job).expect("queue open"));
        }

        for rx in receivers {
            assert!(rx.await.expect("worker responded").is_ok());
        }

        let log = log.lock().expect("lock").clone();
        assert_eq!(log, vec!["a:start", "a:end", "b:start", "b:end", "c:start", "c:end"]);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_failed_task_does_not_stop_queue() {
        let (queue, worker) = DeliveryQueue::new();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(worker.run(shutdown_rx));

        let failing = queue
            .enqueue(SubmissionId::generate(), async { Err(DeliveryError::AllSendersFailed) }.boxed())
            .expect("queue open");
        let id = SubmissionId::generate();
        let next = queue.enqueue(id, async move { ok(id) }.boxed()).expect("queue open");

        assert_eq!(failing.await.expect("responded"), Err(DeliveryError::AllSendersFailed));
        assert_eq!(next.await.expect("responded"), ok(id));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_queued_tasks() {
        let (queue, worker) = DeliveryQueue::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let id = SubmissionId::generate();
        let queued = queue.enqueue(id, async move { ok(id) }.boxed()).expect("queue open");

        shutdown_tx.send(true).expect("receiver alive");
        worker.run(shutdown_rx).await;

        assert_eq!(queued.await.expect("responded"), Err(DeliveryError::QueueClosed));
        assert_eq!(queue.depth(), 0);

        let late = queue.enqueue(SubmissionId::generate(), async { Err(DeliveryError::QueueClosed) }.boxed());
        assert!(matches!(late, Err(DeliveryError::QueueClosed)));
    }
}
