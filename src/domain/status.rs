use crate::domain::submission::{AttemptRecord, SubmissionRecord, SubmissionStatus};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub attempts: Vec<AttemptView>,
    pub statistics: Statistics,
    pub timings: Timings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    pub provider: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_attempts: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Percentage of successful attempts, rounded to two decimals. Zero when nothing was attempted yet.
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Timestamp of the latest attempt; absent while the submission is still queued.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub duration_ms: Option<i64>,
}

impl From<&AttemptRecord> for AttemptView {
    fn from(attempt: &AttemptRecord) -> Self {
        Self {
            provider: attempt.sender.clone(),
            timestamp: attempt.timestamp,
            status: if attempt.success { SubmissionStatus::Success } else { SubmissionStatus::Failed },
            error: attempt.error.clone(),
            message_id: attempt.receipt_id.clone(),
        }
    }
}

impl Statistics {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_attempts(attempts: &[AttemptRecord]) -> Self {
        let total_attempts = attempts.len();
        let success_count = attempts.iter().filter(|a| a.success).count();
        let success_rate = if total_attempts == 0 {
            0.0
        } else {
            let pct = success_count as f64 / total_attempts as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        };

        Self { total_attempts, success_count, failure_count: total_attempts - success_count, success_rate }
    }
}

impl From<&SubmissionRecord> for StatusView {
    fn from(record: &SubmissionRecord) -> Self {
        let last = record.last_attempt();
        let completed_at = last.map(|a| a.timestamp);
        let duration_ms = completed_at.map(|at| {
            let elapsed = (at - record.created_at).whole_milliseconds();
            i64::try_from(elapsed).unwrap_or(i64::MAX)
        });

        Self {
            status: record.status,
            provider: last.map(|a| a.sender.clone()),
            message_id: record.attempts.iter().rev().find_map(|a| a.receipt_id.clone()),
            attempts: record.attempts.iter().map(AttemptView::from).collect(),
            statistics: Statistics::from_attempts(&record.attempts),
            timings: Timings { started_at: record.created_at, completed_at, duration_ms },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_view_of_queued_submission_has_no_attempt_timings() {
        let record = SubmissionRecord::pending(OffsetDateTime::now_utc());
        let view = StatusView::from(&record);

        assert_eq!(view.status, SubmissionStatus::Pending);
        assert!(view.attempts.is_empty());
        assert_eq!(view.provider, None);
        assert_eq!(view.statistics.total_attempts, 0);
        assert!(view.statistics.success_rate.abs() < f64::EPSILON);
        assert_eq!(view.timings.completed_at, None);
        assert_eq!(view.timings.duration_ms, None);
    }

    #[test]
    fn test_view_statistics_and_timings() {
        let created = OffsetDateTime::now_utc();
        let mut record = SubmissionRecord::pending(created);
        record.attempts.push(AttemptRecord::failed("Provider1", created + Duration::milliseconds(10), "boom"));
        record.attempts.push(AttemptRecord::failed("Provider1", created + Duration::milliseconds(20), "boom"));
        record.attempts.push(AttemptRecord::succeeded("Provider2", created + Duration::milliseconds(250), "msg_1"));
        record.finish(SubmissionStatus::Success);

        let view = StatusView::from(&record);

        assert_eq!(view.status, SubmissionStatus::Success);
        assert_eq!(view.provider.as_deref(), Some("Provider2"));
        assert_eq!(view.message_id.as_deref(), Some("msg_1"));
        assert_eq!(view.statistics.total_attempts, 3);
        assert_eq!(view.statistics.success_count, 1);
        assert_eq!(view.statistics.failure_count, 2);
        assert!((view.statistics.success_rate - 33.33).abs() < 1e-9);
        assert_eq!(view.timings.duration_ms, Some(250));
        assert_eq!(view.attempts[0].status, SubmissionStatus::Failed);
        assert_eq!(view.attempts[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let created = OffsetDateTime::now_utc();
        let mut record = SubmissionRecord::pending(created);
        record.attempts.push(AttemptRecord::succeeded("Provider1", created, "msg_9"));
        record.finish(SubmissionStatus::Success);

        let json = serde_json::to_value(StatusView::from(&record)).expect("serializable view");

        assert_eq!(json["status"], "success");
        assert_eq!(json["messageId"], "msg_9");
        assert_eq!(json["attempts"][0]["status"], "success");
        assert_eq!(json["statistics"]["totalAttempts"], 1);
        assert_eq!(json["timings"]["durationMs"], 0);
    }
}
