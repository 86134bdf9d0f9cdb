//! Database layer for chapter-ingest
//!
//! Handles SQLite persistence for committed chapter records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — database lifecycle, schema migrations
//! - [`chapters`] — chapter record CRUD and duplicate lookup
//!
//! The commit pipeline talks to the record store through the
//! [`ChapterStore`] trait rather than the concrete [`Database`], so record
//! creation/deletion stays pluggable and the rollback protocol can be tested
//! with failure-injecting stores.

use crate::error::Result;
use crate::types::{ChapterId, ChapterInfo};
use async_trait::async_trait;
use sqlx::{FromRow, sqlite::SqlitePool};

mod chapters;
mod migrations;

/// New chapter record to be inserted after files are committed
#[derive(Debug, Clone)]
pub struct NewChapter {
    /// Collection this chapter belongs to
    pub collection_id: String,
    /// Chapter identifier within the collection
    pub chapter_number: String,
    /// Optional display title
    pub title: Option<String>,
    /// Ordered page references, library-relative
    pub pages: Vec<String>,
    /// Designated cover page reference
    pub cover: String,
    /// Natural sort confidence, in [0, 1]
    pub sort_confidence: f64,
    /// Whether a human should review the inferred order
    pub requires_manual_reorder: bool,
}

/// Chapter record from the database
#[derive(Debug, Clone, FromRow)]
pub struct Chapter {
    /// Unique database id
    pub id: i64,
    /// Collection this chapter belongs to
    pub collection_id: String,
    /// Chapter identifier within the collection
    pub chapter_number: String,
    /// Optional display title
    pub title: Option<String>,
    /// Ordered page references as a JSON array
    pub pages: String,
    /// Designated cover page reference
    pub cover: String,
    /// Number of pages
    pub page_count: i64,
    /// Natural sort confidence, in [0, 1]
    pub sort_confidence: f64,
    /// Whether a human should review the inferred order (0/1)
    pub requires_manual_reorder: i64,
    /// Unix timestamp of record creation
    pub created_at: i64,
}

impl Chapter {
    /// Decode the JSON page list column
    pub fn page_list(&self) -> Result<Vec<String>> {
        Ok(serde_json::from_str(&self.pages)?)
    }

    /// Convert to the API-facing representation
    pub fn into_info(self) -> Result<ChapterInfo> {
        let pages = self.page_list()?;
        Ok(ChapterInfo {
            id: ChapterId(self.id),
            collection_id: self.collection_id,
            chapter_number: self.chapter_number,
            title: self.title,
            cover: self.cover,
            page_count: self.page_count as u32,
            sort_confidence: self.sort_confidence,
            requires_manual_reorder: self.requires_manual_reorder != 0,
            created_at: chrono::DateTime::from_timestamp(self.created_at, 0)
                .unwrap_or_else(chrono::Utc::now),
            pages,
        })
    }
}

/// Durable chapter record store.
///
/// The atomic commit protocol creates a record only after files are
/// physically committed, and deletes it again when a later step fails.
#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// Insert a new chapter record, returning its id
    async fn insert_chapter(&self, chapter: &NewChapter) -> Result<ChapterId>;

    /// Delete a chapter record
    async fn delete_chapter(&self, id: ChapterId) -> Result<()>;

    /// Find a chapter by its (collection, chapter number) pair
    async fn find_chapter(
        &self,
        collection_id: &str,
        chapter_number: &str,
    ) -> Result<Option<Chapter>>;

    /// Get a chapter by id
    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>>;
}

/// SQLite-backed chapter store
pub struct Database {
    /// Connection pool
    pub(crate) pool: SqlitePool,
}
