use crate::api::AppState;
use crate::api::schemas::messaging::{SendMessageRequest, SendMessageResponse};
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};

/// Submits a message and waits for it to be delivered.
///
/// # Errors
/// Returns `AppError::BadRequest` for malformed bodies, `AppError::RateLimited` if the
/// client is over its limit, `AppError::DeliveryFailed` if every sender failed, and
/// `AppError::Unavailable` if the server is shutting down.
pub async fn send_message(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let (message, idempotency_key, client_id) = request.into_parts()?;

    let submission = state.delivery_service.submit(message, idempotency_key, &client_id)?;
    let result = submission.outcome().await?;

    Ok(Json(SendMessageResponse::from(result)))
}
