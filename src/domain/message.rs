use crate::domain::submission::SubmissionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// What a sender hands back after accepting a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub success: bool,
    pub provider: String,
    pub message_id: String,
}

/// Outcome of a successful submission. Cached verbatim under its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub submission_id: SubmissionId,
    pub success: bool,
    pub provider: String,
    pub message_id: String,
}

impl DeliveryResult {
    #[must_use]
    pub fn new(submission_id: SubmissionId, receipt: Receipt) -> Self {
        Self { submission_id, success: receipt.success, provider: receipt.provider, message_id: receipt.message_id }
    }
}
