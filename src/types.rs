//! Core types for chapter-ingest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Number of random bytes in an upload id token (hex-encoded to twice this length)
const UPLOAD_ID_BYTES: usize = 16;

/// Opaque correlation token for an upload, issued at submission time.
///
/// All progress and cancellation queries are keyed by this token. It is
/// minted before any durable record exists, so it is a random value rather
/// than a store row id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct UploadId(pub String);

impl UploadId {
    /// Generate a new random upload id (128 bits, hex-encoded)
    pub fn generate() -> Self {
        let bytes: [u8; UPLOAD_ID_BYTES] = rand::random();
        let mut token = String::with_capacity(UPLOAD_ID_BYTES * 2);
        for b in bytes {
            use std::fmt::Write;
            // write! to a String cannot fail
            let _ = write!(token, "{:02x}", b);
        }
        Self(token)
    }

    /// Get the token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UploadId {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for UploadId {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Unique identifier for a persisted chapter record
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct ChapterId(pub i64);

impl ChapterId {
    /// Create a new ChapterId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ChapterId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ChapterId> for i64 {
    fn from(id: ChapterId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChapterId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for ChapterId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ChapterId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ChapterId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Upload lifecycle status
///
/// Progresses `Initializing → Uploading → Processing → Extracting →
/// Finalizing → Complete`, with `Error` reachable from every non-terminal
/// state and `Cancelled` a terminal variant of `Error` triggered by the
/// cancellation endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Progress entry created, background task not yet running
    Initializing,
    /// Archive bytes being spooled to the staging area
    Uploading,
    /// Container validation and pre-extraction checks
    Processing,
    /// Entries being extracted into staging
    Extracting,
    /// Sorting, renaming, and atomic commit
    Finalizing,
    /// Chapter committed, record created
    Complete,
    /// Failed; see error message and code
    Error,
    /// Cancelled by the client before completion
    Cancelled,
}

impl UploadStatus {
    /// Whether this status is terminal (no further transitions occur)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Complete | UploadStatus::Error | UploadStatus::Cancelled
        )
    }

    /// Stable lowercase name, used as the SSE event type
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Initializing => "initializing",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Processing => "processing",
            UploadStatus::Extracting => "extracting",
            UploadStatus::Finalizing => "finalizing",
            UploadStatus::Complete => "complete",
            UploadStatus::Error => "error",
            UploadStatus::Cancelled => "cancelled",
        }
    }
}

/// Chapter record as exposed through the API
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ChapterInfo {
    /// Record id
    pub id: ChapterId,
    /// Collection this chapter belongs to
    pub collection_id: String,
    /// Chapter identifier within the collection
    pub chapter_number: String,
    /// Optional display title
    pub title: Option<String>,
    /// Ordered page references, library-relative
    pub pages: Vec<String>,
    /// Designated cover page (always the first ordered page)
    pub cover: String,
    /// Number of pages
    pub page_count: u32,
    /// Confidence of the automatically inferred page order, in [0, 1]
    pub sort_confidence: f64,
    /// Whether a human should review the inferred order
    pub requires_manual_reorder: bool,
    /// Record creation time
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_ids_are_unique_and_hex() {
        let a = UploadId::generate();
        let b = UploadId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn status_terminality() {
        assert!(UploadStatus::Complete.is_terminal());
        assert!(UploadStatus::Error.is_terminal());
        assert!(UploadStatus::Cancelled.is_terminal());
        assert!(!UploadStatus::Initializing.is_terminal());
        assert!(!UploadStatus::Extracting.is_terminal());
        assert!(!UploadStatus::Finalizing.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&UploadStatus::Extracting).unwrap();
        assert_eq!(json, r#""extracting""#);
    }
}
