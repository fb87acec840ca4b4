use crate::domain::status::StatusView;
use crate::domain::submission::{AttemptRecord, SubmissionId, SubmissionRecord, SubmissionStatus};
use crate::error::DeliveryError;
use dashmap::DashMap;
use std::sync::Arc;
use time::OffsetDateTime;

/// In-memory ledger of every submission and its attempts.
///
/// Records live for the lifetime of the process.
#[derive(Clone, Debug, Default)]
pub struct StatusTracker {
    records: Arc<DashMap<SubmissionId, SubmissionRecord>>,
}

impl StatusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, id: SubmissionId) {
        self.records.insert(id, SubmissionRecord::pending(OffsetDateTime::now_utc()));
    }

    pub fn record_attempt(&self, id: SubmissionId, attempt: AttemptRecord) {
        if let Some(mut record) = self.records.get_mut(&id) {
            record.attempts.push(attempt);
        } else {
            tracing::warn!(submission_id = %id, "Attempt recorded for unknown submission");
        }
    }

    pub fn mark(&self, id: SubmissionId, status: SubmissionStatus) {
        if let Some(mut record) = self.records.get_mut(&id)
            && !record.finish(status)
        {
            tracing::warn!(submission_id = %id, current = ?record.status, requested = ?status, "Ignoring status change");
        }
    }

    #[must_use]
    pub fn get(&self, id: SubmissionId) -> Option<SubmissionRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// Looks up a submission by its external id.
    ///
    /// # Errors
    /// Returns `DeliveryError::InvalidFormat` if `raw_id` is not a submission id,
    /// `DeliveryError::NotFound` if no such submission exists.
    pub fn view(&self, raw_id: &str) -> Result<StatusView, DeliveryError> {
        let id: SubmissionId = raw_id.parse().map_err(|_| DeliveryError::InvalidFormat)?;
        self.records.get(&id).map(|r| StatusView::from(r.value())).ok_or(DeliveryError::NotFound)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_errors() {
        let tracker = StatusTracker::new();

        assert_eq!(tracker.view("garbage"), Err(DeliveryError::InvalidFormat));
        assert_eq!(tracker.view(&SubmissionId::generate().to_string()), Err(DeliveryError::NotFound));
    }

    #[test]
    fn test_attempts_append_in_order() {
        let tracker = StatusTracker::new();
        let id = SubmissionId::generate();
        tracker.create(id);

        let now = OffsetDateTime::now_utc();
        tracker.record_attempt(id, AttemptRecord::failed("Provider1", now, "boom"));
        tracker.record_attempt(id, AttemptRecord::succeeded("Provider2", now, "msg_1"));
        tracker.mark(id, SubmissionStatus::Success);
        tracker.mark(id, SubmissionStatus::Failed);

        let record = tracker.get(id).expect("record exists");
        assert_eq!(record.status, SubmissionStatus::Success);
        assert_eq!(record.attempts.len(), 2);
        assert_eq!(record.attempts[0].sender, "Provider1");
        assert_eq!(record.attempts[1].sender, "Provider2");

        let view = tracker.view(&id.to_string()).expect("view exists");
        assert_eq!(view.provider.as_deref(), Some("Provider2"));
    }
}
