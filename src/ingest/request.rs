//! Validated upload metadata
//!
//! Request bodies arrive as loosely-typed multipart fields; everything the
//! core recognizes is validated here, once, at the boundary. Identifier
//! fields name directories in the library, so beyond length rules they also
//! reject separators and control characters.

use crate::error::{Error, Result, ValidationError};

/// Maximum length of a collection identifier
const MAX_COLLECTION_ID_LEN: usize = 50;
/// Maximum length of a chapter number
const MAX_CHAPTER_NUMBER_LEN: usize = 20;
/// Maximum length of a chapter title
const MAX_TITLE_LEN: usize = 200;

/// Validated metadata accompanying an archive upload
#[derive(Clone, Debug)]
pub struct UploadRequest {
    collection_id: String,
    chapter_number: String,
    title: Option<String>,
}

impl UploadRequest {
    /// Validate raw field values into a request.
    ///
    /// Rules: `collection_id` non-empty, ≤ 50 chars; `chapter_number`
    /// non-empty, ≤ 20 chars; `title` optional, ≤ 200 chars. Identifier
    /// fields must be usable as single path components.
    pub fn new(
        collection_id: impl Into<String>,
        chapter_number: impl Into<String>,
        title: Option<String>,
    ) -> Result<Self> {
        let collection_id = collection_id.into();
        let chapter_number = chapter_number.into();

        validate_identifier("collection_id", &collection_id, MAX_COLLECTION_ID_LEN)?;
        validate_identifier("chapter_number", &chapter_number, MAX_CHAPTER_NUMBER_LEN)?;

        let title = match title {
            Some(t) if t.trim().is_empty() => None,
            Some(t) => {
                if t.chars().count() > MAX_TITLE_LEN {
                    return Err(Error::Validation(ValidationError::MalformedMetadata {
                        field: "title",
                        reason: format!("must be at most {} characters", MAX_TITLE_LEN),
                    }));
                }
                Some(t)
            }
            None => None,
        };

        Ok(Self {
            collection_id,
            chapter_number,
            title,
        })
    }

    /// Collection identifier
    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Chapter number
    pub fn chapter_number(&self) -> &str {
        &self.chapter_number
    }

    /// Optional title
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
}

/// Validate a field that becomes a directory name component
fn validate_identifier(field: &'static str, value: &str, max_len: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(ValidationError::MalformedMetadata {
            field,
            reason: "must not be empty".to_string(),
        }));
    }
    if value.chars().count() > max_len {
        return Err(Error::Validation(ValidationError::MalformedMetadata {
            field,
            reason: format!("must be at most {} characters", max_len),
        }));
    }
    if value == "." || value == ".." {
        return Err(Error::Validation(ValidationError::MalformedMetadata {
            field,
            reason: "reserved name".to_string(),
        }));
    }
    if value.chars().any(|c| c == '/' || c == '\\' || c.is_ascii_control()) {
        return Err(Error::Validation(ValidationError::MalformedMetadata {
            field,
            reason: "must not contain path separators or control characters".to_string(),
        }));
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: Error) -> &'static str {
        match err {
            Error::Validation(ValidationError::MalformedMetadata { field, .. }) => field,
            other => panic!("expected MalformedMetadata, got {other:?}"),
        }
    }

    #[test]
    fn valid_request_passes() {
        let request =
            UploadRequest::new("solar-saga", "12.5", Some("The Long Night".to_string())).unwrap();
        assert_eq!(request.collection_id(), "solar-saga");
        assert_eq!(request.chapter_number(), "12.5");
        assert_eq!(request.title(), Some("The Long Night"));
    }

    #[test]
    fn empty_title_becomes_none() {
        let request = UploadRequest::new("c", "1", Some("   ".to_string())).unwrap();
        assert_eq!(request.title(), None);
    }

    #[test]
    fn empty_fields_rejected() {
        assert_eq!(field_of(UploadRequest::new("", "1", None).unwrap_err()), "collection_id");
        assert_eq!(field_of(UploadRequest::new("  ", "1", None).unwrap_err()), "collection_id");
        assert_eq!(field_of(UploadRequest::new("c", "", None).unwrap_err()), "chapter_number");
    }

    #[test]
    fn overlong_fields_rejected() {
        let long = "x".repeat(51);
        assert_eq!(field_of(UploadRequest::new(long, "1", None).unwrap_err()), "collection_id");

        let long = "x".repeat(21);
        assert_eq!(field_of(UploadRequest::new("c", long, None).unwrap_err()), "chapter_number");

        let long = "x".repeat(201);
        assert_eq!(field_of(UploadRequest::new("c", "1", Some(long)).unwrap_err()), "title");
    }

    #[test]
    fn path_like_identifiers_rejected() {
        for bad in ["a/b", "a\\b", "..", ".", "x\x00y"] {
            assert!(
                UploadRequest::new(bad, "1", None).is_err(),
                "collection_id {bad:?} should be rejected"
            );
            assert!(
                UploadRequest::new("c", bad, None).is_err(),
                "chapter_number {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn boundary_lengths_accepted() {
        UploadRequest::new("x".repeat(50), "y".repeat(20), Some("t".repeat(200))).unwrap();
    }
}
