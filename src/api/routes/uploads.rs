//! Upload progress and cancellation handlers.

use crate::api::AppState;
use crate::error::Error;
use crate::types::UploadId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /uploads/:id - Poll upload progress
///
/// Returns the current progress snapshot verbatim: status, percentage,
/// message, file counters, speed, ETA, and the error message/code for
/// failed or cancelled uploads. This is the sole result channel once the
/// submit call has returned its accepted response.
#[utoipa::path(
    get,
    path = "/api/v1/uploads/{id}",
    tag = "uploads",
    params(
        ("id" = String, Path, description = "Upload id returned by the submit endpoint")
    ),
    responses(
        (status = 200, description = "Progress snapshot", body = crate::progress::UploadProgress),
        (status = 404, description = "Unknown or expired upload id", body = crate::error::ApiError)
    )
)]
pub async fn get_upload_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let id = UploadId::from(id);
    match state.ingestor.progress(&id) {
        Some(progress) => (StatusCode::OK, Json(progress)).into_response(),
        None => Error::NotFound(format!("upload {}", id)).into_response(),
    }
}

/// POST /uploads/:id/cancel - Cancel a running upload
///
/// Flips the cooperative cancellation flag and immediately reports the
/// upload as cancelled; the background task stops at its next suspension
/// point and cleans up its staging artifacts. Rejects uploads that already
/// reached a terminal state.
#[utoipa::path(
    post,
    path = "/api/v1/uploads/{id}/cancel",
    tag = "uploads",
    params(
        ("id" = String, Path, description = "Upload id returned by the submit endpoint")
    ),
    responses(
        (status = 200, description = "Upload cancelled", body = crate::progress::UploadProgress),
        (status = 404, description = "Unknown or expired upload id", body = crate::error::ApiError),
        (status = 409, description = "Upload already terminal", body = crate::error::ApiError)
    )
)]
pub async fn cancel_upload(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = UploadId::from(id);
    match state.ingestor.cancel(&id) {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(e) => e.into_response(),
    }
}
