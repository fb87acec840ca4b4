use crate::domain::submission::SubmissionId;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures surfaced by the delivery pipeline to its callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Rate limit exceeded for client {client_id}")]
    RateLimitExceeded { client_id: String },
    #[error("All senders failed")]
    AllSendersFailed,
    #[error("Invalid status ID format")]
    InvalidFormat,
    #[error("Status not found")]
    NotFound,
    #[error("Delivery queue is closed")]
    QueueClosed,
}

/// Rejection of a queued submission, carrying the id so callers can look up its status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Submission {submission_id} failed: {error}")]
pub struct DeliveryFailure {
    pub submission_id: SubmissionId,
    pub error: DeliveryError,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found")]
    NotFound,
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Delivery failed: {0}")]
    DeliveryFailed(DeliveryFailure),
    #[error("Service unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::RateLimitExceeded { .. } => Self::RateLimited,
            DeliveryError::InvalidFormat => Self::BadRequest(err.to_string()),
            DeliveryError::NotFound => Self::NotFound,
            DeliveryError::QueueClosed | DeliveryError::AllSendersFailed => Self::Unavailable,
        }
    }
}

impl From<DeliveryFailure> for AppError {
    fn from(failure: DeliveryFailure) -> Self {
        match failure.error {
            DeliveryError::QueueClosed => Self::Unavailable,
            _ => Self::DeliveryFailed(failure),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, json!({ "code": 400, "error": msg }))
            }
            Self::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, json!({ "code": 404, "error": DeliveryError::NotFound.to_string() }))
            }
            Self::RateLimited => {
                tracing::debug!("Rate limit exceeded");
                (StatusCode::TOO_MANY_REQUESTS, json!({ "code": 429, "error": "Rate limit exceeded" }))
            }
            Self::DeliveryFailed(failure) => {
                tracing::warn!(submission_id = %failure.submission_id, error = %failure.error, "Delivery failed");
                (
                    StatusCode::BAD_GATEWAY,
                    json!({
                        "code": 502,
                        "submissionId": failure.submission_id.to_string(),
                        "error": failure.error.to_string(),
                    }),
                )
            }
            Self::Unavailable => {
                tracing::error!("Delivery queue unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "code": 503, "error": "Service unavailable" }))
            }
        };

        (status, Json(body)).into_response()
    }
}
