use crate::domain::message::DeliveryResult;
use crate::domain::submission::SubmissionId;
use crate::error::{DeliveryError, DeliveryFailure};
use crate::services::delivery_queue::DeliveryOutcome;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
enum KeySlot {
    /// Claimed by a queued submission; later submitters subscribe to its outcome.
    InFlight { submission_id: SubmissionId, done: watch::Sender<Option<DeliveryOutcome>> },
    Sent(DeliveryResult),
}

/// What [`IdempotencyService::reserve`] found for a key.
#[derive(Debug)]
pub enum Reservation {
    /// The key was free and now belongs to the caller's submission.
    Reserved,
    /// Another submission with this key is still being delivered.
    InFlight(InFlightDelivery),
    /// The key was already delivered.
    Sent(DeliveryResult),
}

/// Handle on the outcome of the submission that owns a key.
#[derive(Debug)]
pub struct InFlightDelivery {
    submission_id: SubmissionId,
    rx: watch::Receiver<Option<DeliveryOutcome>>,
}

impl InFlightDelivery {
    #[must_use]
    pub const fn submission_id(&self) -> SubmissionId {
        self.submission_id
    }

    /// Waits for the owning submission to finish.
    ///
    /// # Errors
    /// Returns the owning submission's failure.
    pub async fn wait(mut self) -> Result<DeliveryResult, DeliveryFailure> {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(DeliveryError::QueueClosed)),
            Err(_) => Err(DeliveryError::QueueClosed),
        };
        outcome.map_err(|error| DeliveryFailure { submission_id: self.submission_id, error })
    }
}

/// Process-lifetime cache of successful deliveries, keyed by caller-supplied idempotency key.
///
/// A key is claimed when its first submission is admitted, so a resubmission that
/// arrives while the first is still queued attaches to it instead of sending again.
/// Delivered entries are write-once with no expiry. A key whose delivery failed is
/// released and may be submitted again.
#[derive(Clone, Debug, Default)]
pub struct IdempotencyService {
    slots: Arc<DashMap<String, KeySlot>>,
}

impl IdempotencyService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_duplicate(&self, key: &str) -> bool {
        self.slots.get(key).is_some_and(|slot| matches!(slot.value(), KeySlot::Sent(_)))
    }

    /// Claims `key` for `submission_id`, or reports who already holds it.
    ///
    /// Check and claim happen under the key's shard lock.
    pub fn reserve(&self, key: &str, submission_id: SubmissionId) -> Reservation {
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(slot) => match slot.get() {
                KeySlot::Sent(result) => Reservation::Sent(result.clone()),
                KeySlot::InFlight { submission_id, done } => {
                    Reservation::InFlight(InFlightDelivery { submission_id: *submission_id, rx: done.subscribe() })
                }
            },
            Entry::Vacant(slot) => {
                let (done, _) = watch::channel(None);
                slot.insert(KeySlot::InFlight { submission_id, done });
                Reservation::Reserved
            }
        }
    }

    /// Stores the result for `key` unless one is already recorded. Returns whether it was stored.
    ///
    /// Submissions attached to the key are woken with the result.
    pub fn mark_as_sent(&self, key: &str, result: &DeliveryResult) -> bool {
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(mut slot) => {
                if matches!(slot.get(), KeySlot::Sent(_)) {
                    tracing::debug!(idempotency_key = %key, "Idempotency key already recorded, keeping first result");
                    return false;
                }
                if let KeySlot::InFlight { done, .. } = slot.insert(KeySlot::Sent(result.clone())) {
                    done.send_replace(Some(Ok(result.clone())));
                }
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(KeySlot::Sent(result.clone()));
                true
            }
        }
    }

    /// Frees a key whose delivery did not succeed and fails everyone attached to it.
    pub fn release(&self, key: &str, error: DeliveryError) {
        if let Some((_, KeySlot::InFlight { submission_id, done })) =
            self.slots.remove_if(key, |_, slot| matches!(slot, KeySlot::InFlight { .. }))
        {
            tracing::debug!(idempotency_key = %key, submission_id = %submission_id, error = %error, "Released idempotency key");
            done.send_replace(Some(Err(error)));
        }
    }

    #[must_use]
    pub fn get_result(&self, key: &str) -> Option<DeliveryResult> {
        self.slots.get(key).and_then(|slot| match slot.value() {
            KeySlot::Sent(result) => Some(result.clone()),
            KeySlot::InFlight { .. } => None,
        })
    }
}
