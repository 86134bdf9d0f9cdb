//! HTTP error response handling for the API
//!
//! Conversions from domain errors to HTTP responses with appropriate status
//! codes and JSON error bodies.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Convert domain errors to HTTP responses automatically
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let api_error: ApiError = self.into();

        (status_code, Json(api_error)).into_response()
    }
}

/// Explicit ApiError responses default to 500; errors carrying their own
/// status go through `Error::into_response`
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use crate::error::{Error, SecurityError, ToHttpStatus, ValidationError};

    #[test]
    fn not_found_maps_to_404() {
        let error = Error::NotFound("upload abc".to_string());
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), "not_found");
    }

    #[test]
    fn duplicate_maps_to_conflict() {
        let error = Error::Duplicate("chapter 1".to_string());
        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), "duplicate_chapter");
    }

    #[test]
    fn malformed_metadata_maps_to_bad_request() {
        let error = Error::Validation(ValidationError::MalformedMetadata {
            field: "collection_id",
            reason: "must not be empty".to_string(),
        });
        assert_eq!(error.status_code(), 400);
    }

    #[test]
    fn security_errors_map_to_unprocessable() {
        let error = Error::Security(SecurityError::PathTraversal {
            entry: "../x".to_string(),
        });
        assert_eq!(error.status_code(), 422);
        assert_eq!(error.error_code(), "path_traversal");
    }
}
