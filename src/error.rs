//! Error types for chapter-ingest
//!
//! This module provides the error handling for the library, including:
//! - Domain-specific error categories (Validation, Security, Extraction, Commit, Store)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//!
//! The categories carry policy: validation errors are user-correctable and
//! reported with an actionable message; security errors indicate adversarial
//! input and abort the whole operation; extraction errors are environmental
//! and surfaced without retry; commit errors trigger the rollback protocol
//! before being surfaced.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for chapter-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chapter-ingest
#[derive(Debug, Error)]
pub enum Error {
    /// User-correctable input problem
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Adversarial input detected; the whole operation was aborted
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// Environmental failure during decompression or staging writes
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Failure during the staging→final commit protocol
    #[error("commit error: {0}")]
    Commit(#[from] CommitError),

    /// Chapter store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// A chapter with the same collection and number already exists
    #[error("duplicate chapter: {0}")]
    Duplicate(String),

    /// Operation is not valid for the current state
    #[error("cannot {operation}: upload is {current_state}")]
    InvalidState {
        /// The operation that was attempted (e.g. "cancel")
        operation: String,
        /// The state that prevents it (e.g. "complete")
        current_state: String,
    },

    /// Upload cancelled cooperatively before completion
    #[error("upload cancelled")]
    Cancelled,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServer(String),
}

/// User-correctable validation failures
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A metadata field failed its validation rule
    #[error("invalid field '{field}': {reason}")]
    MalformedMetadata {
        /// Which field was rejected
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// The uploaded bytes are not a recognized container format
    #[error("not a recognized archive: {0}")]
    UnreadableContainer(String),

    /// The archive contained no extractable page images
    #[error("archive contains no valid page images")]
    NoValidImages,
}

/// Adversarial-input failures; always abort the whole operation
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Entry name encodes a path traversal sequence
    #[error("path traversal attempt in entry '{entry}'")]
    PathTraversal {
        /// The offending archive-internal name
        entry: String,
    },

    /// Entry exceeds the per-file uncompressed size ceiling
    #[error("entry '{entry}' exceeds size limit: {size} > {limit} bytes")]
    EntryTooLarge {
        /// The offending archive-internal name
        entry: String,
        /// Declared or streamed uncompressed size
        size: u64,
        /// The configured ceiling
        limit: u64,
    },

    /// Cumulative uncompressed size exceeds the container ceiling
    #[error("archive exceeds total size limit: {total} > {limit} bytes")]
    ArchiveTooLarge {
        /// Cumulative uncompressed bytes
        total: u64,
        /// The configured ceiling
        limit: u64,
    },

    /// Container holds more entries than permitted
    #[error("archive has too many entries: {count} > {limit}")]
    TooManyEntries {
        /// Entry count encountered
        count: usize,
        /// The configured ceiling
        limit: usize,
    },

    /// Entry extension claims an image but the content is something else
    #[error("entry '{entry}' is not an image ({detected})")]
    DisguisedContent {
        /// The offending archive-internal name
        entry: String,
        /// What the content was identified as
        detected: String,
    },

    /// Extracted file turned out to be a symlink, hardlink, or special file
    #[error("refusing special file at {path}: {reason}")]
    SpecialFile {
        /// Path of the deleted file
        path: PathBuf,
        /// What the post-write check found
        reason: String,
    },
}

/// Environmental extraction failures (not retried by the core)
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The decompressor failed mid-entry
    #[error("failed to decompress entry '{entry}': {reason}")]
    Decompress {
        /// The archive-internal name being read
        entry: String,
        /// Decoder error text
        reason: String,
    },

    /// Writing to the staging area failed
    #[error("failed to write staged file {path}: {reason}")]
    StagingWrite {
        /// Destination path of the write
        path: PathBuf,
        /// I/O error text
        reason: String,
    },
}

/// Failures in the atomic staging→final commit protocol
#[derive(Debug, Error)]
pub enum CommitError {
    /// Renaming the pre-existing final directory aside failed
    #[error("failed to back up existing directory {path}: {reason}")]
    BackupFailed {
        /// The directory that could not be moved aside
        path: PathBuf,
        /// Rename error text
        reason: String,
    },

    /// The staging→final rename failed
    #[error("failed to move {from} to {to}: {reason}")]
    MoveFailed {
        /// Staging directory
        from: PathBuf,
        /// Final directory
        to: PathBuf,
        /// Rename error text
        reason: String,
    },

    /// Creating the durable chapter record failed after files were moved
    #[error("failed to create chapter record: {reason}")]
    RecordFailed {
        /// Store error text
        reason: String,
    },

    /// Deleting the backup directory failed after the record was created
    #[error("failed to delete backup {path}: {reason}")]
    CleanupFailed {
        /// The backup directory that could not be removed
        path: PathBuf,
        /// Removal error text
        reason: String,
    },

    /// A compensating action failed while rolling back
    #[error("rollback incomplete: {reason}")]
    RollbackFailed {
        /// What could not be undone
        reason: String,
    },
}

/// Chapter store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g. duplicate collection/chapter pair)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Standardized API error response
///
/// Machine-readable error code, human-readable message, optional details.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "path_traversal",
///     "message": "security error: path traversal attempt in entry '../../etc/passwd'"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "not_found", "entry_too_large")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed client input
            Error::Validation(ValidationError::MalformedMetadata { .. }) => 400,

            // 422 Unprocessable Entity - semantically unusable uploads
            Error::Validation(_) => 422,
            Error::Security(_) => 422,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Store(StoreError::NotFound(_)) => 404,

            // 409 Conflict
            Error::Duplicate(_) => 409,
            Error::InvalidState { .. } => 409,
            Error::Cancelled => 409,

            // 500 Internal Server Error - server-side issues
            Error::Extraction(_) => 500,
            Error::Commit(_) => 500,
            Error::Store(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServer(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Validation(e) => match e {
                ValidationError::MalformedMetadata { .. } => "malformed_metadata",
                ValidationError::UnreadableContainer(_) => "unreadable_container",
                ValidationError::NoValidImages => "no_valid_images",
            },
            Error::Security(e) => match e {
                SecurityError::PathTraversal { .. } => "path_traversal",
                SecurityError::EntryTooLarge { .. } => "entry_too_large",
                SecurityError::ArchiveTooLarge { .. } => "archive_too_large",
                SecurityError::TooManyEntries { .. } => "too_many_entries",
                SecurityError::DisguisedContent { .. } => "disguised_content",
                SecurityError::SpecialFile { .. } => "special_file",
            },
            Error::Extraction(e) => match e {
                ExtractionError::Decompress { .. } => "decompress_failed",
                ExtractionError::StagingWrite { .. } => "staging_write_failed",
            },
            Error::Commit(e) => match e {
                CommitError::BackupFailed { .. } => "backup_failed",
                CommitError::MoveFailed { .. } => "move_failed",
                CommitError::RecordFailed { .. } => "record_failed",
                CommitError::CleanupFailed { .. } => "commit_cleanup_failed",
                CommitError::RollbackFailed { .. } => "rollback_failed",
            },
            Error::Store(StoreError::NotFound(_)) => "not_found",
            Error::Store(_) => "store_error",
            Error::Sqlx(_) => "store_error",
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::Duplicate(_) => "duplicate_chapter",
            Error::InvalidState { .. } => "invalid_state",
            Error::Cancelled => "cancelled",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServer(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        // Add contextual details for specific error types
        let details = match &error {
            Error::Security(SecurityError::EntryTooLarge { entry, size, limit }) => {
                Some(serde_json::json!({
                    "entry": entry,
                    "size_bytes": size,
                    "limit_bytes": limit,
                }))
            }
            Error::Security(SecurityError::ArchiveTooLarge { total, limit }) => {
                Some(serde_json::json!({
                    "total_bytes": total,
                    "limit_bytes": limit,
                }))
            }
            Error::Security(SecurityError::TooManyEntries { count, limit }) => {
                Some(serde_json::json!({
                    "entry_count": count,
                    "limit": limit,
                }))
            }
            Error::Security(SecurityError::DisguisedContent { entry, detected }) => {
                Some(serde_json::json!({
                    "entry": entry,
                    "detected": detected,
                }))
            }
            Error::Validation(ValidationError::MalformedMetadata { field, reason }) => {
                Some(serde_json::json!({
                    "field": field,
                    "reason": reason,
                }))
            }
            Error::InvalidState {
                operation,
                current_state,
            } => Some(serde_json::json!({
                "operation": operation,
                "current_state": current_state,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// Returns (Error, expected_status, expected_code) for a representative
    /// construction of every reachable match arm in ToHttpStatus.
    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        vec![
            (
                Error::Validation(ValidationError::MalformedMetadata {
                    field: "collection_id",
                    reason: "must not be empty".to_string(),
                }),
                400,
                "malformed_metadata",
            ),
            (
                Error::Validation(ValidationError::UnreadableContainer(
                    "bad magic".to_string(),
                )),
                422,
                "unreadable_container",
            ),
            (
                Error::Validation(ValidationError::NoValidImages),
                422,
                "no_valid_images",
            ),
            (
                Error::Security(SecurityError::PathTraversal {
                    entry: "../../etc/passwd".to_string(),
                }),
                422,
                "path_traversal",
            ),
            (
                Error::Security(SecurityError::EntryTooLarge {
                    entry: "huge.png".to_string(),
                    size: 100,
                    limit: 10,
                }),
                422,
                "entry_too_large",
            ),
            (
                Error::Security(SecurityError::ArchiveTooLarge {
                    total: 100,
                    limit: 10,
                }),
                422,
                "archive_too_large",
            ),
            (
                Error::Security(SecurityError::TooManyEntries {
                    count: 1000,
                    limit: 500,
                }),
                422,
                "too_many_entries",
            ),
            (
                Error::Security(SecurityError::DisguisedContent {
                    entry: "page.jpg".to_string(),
                    detected: "PDF document".to_string(),
                }),
                422,
                "disguised_content",
            ),
            (
                Error::Security(SecurityError::SpecialFile {
                    path: PathBuf::from("/staging/x"),
                    reason: "symbolic link".to_string(),
                }),
                422,
                "special_file",
            ),
            (
                Error::Extraction(ExtractionError::Decompress {
                    entry: "01.jpg".to_string(),
                    reason: "corrupt stream".to_string(),
                }),
                500,
                "decompress_failed",
            ),
            (
                Error::Extraction(ExtractionError::StagingWrite {
                    path: PathBuf::from("/staging/01.jpg"),
                    reason: "disk full".to_string(),
                }),
                500,
                "staging_write_failed",
            ),
            (
                Error::Commit(CommitError::MoveFailed {
                    from: PathBuf::from("/staging"),
                    to: PathBuf::from("/library"),
                    reason: "cross-device".to_string(),
                }),
                500,
                "move_failed",
            ),
            (
                Error::Commit(CommitError::RecordFailed {
                    reason: "insert failed".to_string(),
                }),
                500,
                "record_failed",
            ),
            (
                Error::Commit(CommitError::CleanupFailed {
                    path: PathBuf::from("/library/c/1.backup"),
                    reason: "permission denied".to_string(),
                }),
                500,
                "commit_cleanup_failed",
            ),
            (
                Error::Commit(CommitError::RollbackFailed {
                    reason: "restore failed".to_string(),
                }),
                500,
                "rollback_failed",
            ),
            (
                Error::Store(StoreError::NotFound("chapter 9".to_string())),
                404,
                "not_found",
            ),
            (
                Error::Store(StoreError::QueryFailed("syntax".to_string())),
                500,
                "store_error",
            ),
            (Error::NotFound("upload abc".to_string()), 404, "not_found"),
            (
                Error::Duplicate("collection 1 chapter 2".to_string()),
                409,
                "duplicate_chapter",
            ),
            (
                Error::InvalidState {
                    operation: "cancel".to_string(),
                    current_state: "complete".to_string(),
                },
                409,
                "invalid_state",
            ),
            (Error::Cancelled, 409, "cancelled"),
            (
                Error::ApiServer("bind failed".to_string()),
                500,
                "api_server_error",
            ),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_status_code() {
        for (error, expected_status, expected_code) in all_error_variants() {
            let actual = error.status_code();
            assert_eq!(
                actual, expected_status,
                "Error with code={expected_code} returned status {actual}, expected {expected_status}"
            );
        }
    }

    #[test]
    fn every_variant_maps_to_expected_error_code() {
        for (error, expected_status, expected_code) in all_error_variants() {
            let actual = error.error_code();
            assert_eq!(
                actual, expected_code,
                "Error with status={expected_status} returned code={actual}, expected {expected_code}"
            );
        }
    }

    #[test]
    fn api_error_carries_details_for_size_breach() {
        let error = Error::Security(SecurityError::EntryTooLarge {
            entry: "huge.png".to_string(),
            size: 1000,
            limit: 500,
        });
        let api_error: ApiError = error.into();

        assert_eq!(api_error.error.code, "entry_too_large");
        assert!(api_error.error.message.contains("huge.png"));
        let details = api_error.error.details.unwrap();
        assert_eq!(details["size_bytes"], 1000);
        assert_eq!(details["limit_bytes"], 500);
    }

    #[test]
    fn api_error_without_details() {
        let error = Error::Validation(ValidationError::NoValidImages);
        let api_error: ApiError = error.into();

        assert_eq!(api_error.error.code, "no_valid_images");
        assert!(api_error.error.details.is_none());
    }

    #[test]
    fn io_errors_convert_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: Error = io.into();
        assert_eq!(error.status_code(), 500);
        assert_eq!(error.error_code(), "io_error");
    }
}
