//! Chapter record CRUD operations.

use crate::error::{Error, StoreError};
use crate::types::ChapterId;
use crate::Result;
use async_trait::async_trait;

use super::{Chapter, ChapterStore, Database, NewChapter};

#[async_trait]
impl ChapterStore for Database {
    /// Insert a new chapter record
    async fn insert_chapter(&self, chapter: &NewChapter) -> Result<ChapterId> {
        let now = chrono::Utc::now().timestamp();
        let pages_json = serde_json::to_string(&chapter.pages)?;

        let result = sqlx::query(
            r#"
            INSERT INTO chapters (
                collection_id, chapter_number, title, pages, cover,
                page_count, sort_confidence, requires_manual_reorder, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chapter.collection_id)
        .bind(&chapter.chapter_number)
        .bind(&chapter.title)
        .bind(&pages_json)
        .bind(&chapter.cover)
        .bind(chapter.pages.len() as i64)
        .bind(chapter.sort_confidence)
        .bind(chapter.requires_manual_reorder as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::Store(StoreError::ConstraintViolation(format!(
                    "chapter {} already exists in collection {}",
                    chapter.chapter_number, chapter.collection_id
                )))
            }
            _ => Error::Store(StoreError::QueryFailed(format!(
                "failed to insert chapter: {}",
                e
            ))),
        })?;

        Ok(ChapterId(result.last_insert_rowid()))
    }

    /// Delete a chapter record
    async fn delete_chapter(&self, id: ChapterId) -> Result<()> {
        let result = sqlx::query("DELETE FROM chapters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Store(StoreError::QueryFailed(format!(
                    "failed to delete chapter: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::Store(StoreError::NotFound(format!(
                "chapter {}",
                id
            ))));
        }
        Ok(())
    }

    /// Find a chapter by its (collection, chapter number) pair
    async fn find_chapter(
        &self,
        collection_id: &str,
        chapter_number: &str,
    ) -> Result<Option<Chapter>> {
        let row = sqlx::query_as::<_, Chapter>(
            r#"
            SELECT
                id, collection_id, chapter_number, title, pages, cover,
                page_count, sort_confidence, requires_manual_reorder, created_at
            FROM chapters
            WHERE collection_id = ? AND chapter_number = ?
            "#,
        )
        .bind(collection_id)
        .bind(chapter_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to find chapter: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a chapter by id
    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>> {
        let row = sqlx::query_as::<_, Chapter>(
            r#"
            SELECT
                id, collection_id, chapter_number, title, pages, cover,
                page_count, sort_confidence, requires_manual_reorder, created_at
            FROM chapters
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to get chapter: {}",
                e
            )))
        })?;

        Ok(row)
    }
}

impl Database {
    /// List all chapters in a collection, ordered by chapter number
    pub async fn list_collection_chapters(&self, collection_id: &str) -> Result<Vec<Chapter>> {
        let rows = sqlx::query_as::<_, Chapter>(
            r#"
            SELECT
                id, collection_id, chapter_number, title, pages, cover,
                page_count, sort_confidence, requires_manual_reorder, created_at
            FROM chapters
            WHERE collection_id = ?
            ORDER BY chapter_number ASC
            "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "failed to list chapters: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
