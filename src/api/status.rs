use crate::api::AppState;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

/// Returns the delivery status of a submission.
///
/// # Errors
/// Returns `AppError::BadRequest` for malformed ids and `AppError::NotFound` for unknown ones.
pub async fn get_status(State(state): State<AppState>, Path(submission_id): Path<String>) -> Result<impl IntoResponse> {
    let view = state.delivery_service.get_status(&submission_id)?;
    Ok(Json(view))
}
