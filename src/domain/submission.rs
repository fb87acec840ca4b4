use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

pub const SUBMISSION_ID_PREFIX: &str = "status_";

/// Identifier of a submission.
///
/// Rendered as `status_` followed by a hyphenated UUIDv7, e.g.
/// `status_01890a5d-ac96-774b-bcce-b302099a8057`. Any string not matching that
/// shape fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SUBMISSION_ID_PREFIX}{}", self.0.hyphenated())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("malformed submission id")]
pub struct MalformedSubmissionId;

impl FromStr for SubmissionId {
    type Err = MalformedSubmissionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(SUBMISSION_ID_PREFIX).ok_or(MalformedSubmissionId)?;
        // hyphenated form only
        if raw.len() != 36 {
            return Err(MalformedSubmissionId);
        }
        Uuid::parse_str(raw).map(Self).map_err(|_| MalformedSubmissionId)
    }
}

impl Serialize for SubmissionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SubmissionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub sender: String,
    pub timestamp: OffsetDateTime,
    pub success: bool,
    pub error: Option<String>,
    pub receipt_id: Option<String>,
}

impl AttemptRecord {
    #[must_use]
    pub fn succeeded(sender: impl Into<String>, timestamp: OffsetDateTime, receipt_id: impl Into<String>) -> Self {
        Self { sender: sender.into(), timestamp, success: true, error: None, receipt_id: Some(receipt_id.into()) }
    }

    #[must_use]
    pub fn failed(sender: impl Into<String>, timestamp: OffsetDateTime, error: impl Into<String>) -> Self {
        Self { sender: sender.into(), timestamp, success: false, error: Some(error.into()), receipt_id: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub status: SubmissionStatus,
    pub attempts: Vec<AttemptRecord>,
    pub created_at: OffsetDateTime,
}

impl SubmissionRecord {
    #[must_use]
    pub fn pending(created_at: OffsetDateTime) -> Self {
        Self { status: SubmissionStatus::Pending, attempts: Vec::new(), created_at }
    }

    #[must_use]
    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }

    /// Moves a pending record to a terminal status. Terminal records never change again.
    pub fn finish(&mut self, status: SubmissionStatus) -> bool {
        if self.status != SubmissionStatus::Pending || status == SubmissionStatus::Pending {
            return false;
        }
        self.status = status;
        true
    }
}
