//! Database lifecycle and schema migrations.

use crate::error::{Error, StoreError};
use crate::Result;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Store(StoreError::ConnectionFailed(format!(
                    "failed to create database directory: {}",
                    e
                )))
            })?;
        }

        // Connect with foreign key enforcement and WAL mode
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Store(StoreError::ConnectionFailed(format!(
                    "failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Store(StoreError::ConnectionFailed(format!(
                "failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chapters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection_id TEXT NOT NULL,
                chapter_number TEXT NOT NULL,
                title TEXT,
                pages TEXT NOT NULL,
                cover TEXT NOT NULL,
                page_count INTEGER NOT NULL,
                sort_confidence REAL NOT NULL,
                requires_manual_reorder INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                UNIQUE (collection_id, chapter_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::MigrationFailed(format!(
                "failed to create chapters table: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_chapters_collection
            ON chapters (collection_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::MigrationFailed(format!(
                "failed to create collection index: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Access the underlying pool (integration tests)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
