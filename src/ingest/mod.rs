//! Core ingestion orchestrator
//!
//! The [`ChapterIngestor`] struct ties the pipeline together: it accepts an
//! archive upload, performs only the cheap synchronous checks on the calling
//! task, and hands the expensive work (extraction, sorting, commit) to a
//! spawned background task correlated by upload id. Callers follow along via
//! the progress tracker, by polling or by subscribing to its event stream.
//!
//! The struct is cheaply cloneable — every field is Arc-backed — so it can
//! be handed to spawned tasks and API state alike.

mod pipeline;
mod request;


pub use request::UploadRequest;

use crate::commit::CommitManager;
use crate::config::Config;
use crate::db::{ChapterStore, Database};
use crate::error::{Error, Result, ValidationError};
use crate::progress::{ProgressEvent, ProgressTracker, ProgressUpdate, UploadProgress};
use crate::storage::LibraryStorage;
use crate::types::{UploadId, UploadStatus};
use crate::validation;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main ingestion entry point (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ChapterIngestor {
    /// Chapter record database.
    /// Public for integration tests to query committed records.
    pub db: Arc<Database>,
    /// Configuration (shared across tasks)
    pub(crate) config: Arc<Config>,
    /// Library and staging file layout
    pub(crate) storage: LibraryStorage,
    /// Progress store for all in-flight uploads
    pub(crate) tracker: ProgressTracker,
    /// Commit protocol driver
    pub(crate) commit_manager: Arc<CommitManager>,
    /// Fires on shutdown; stops the sweeper
    shutdown: CancellationToken,
}

impl ChapterIngestor {
    /// Create a new ingestor.
    ///
    /// Opens (or creates) the sqlite database, prepares the library and
    /// staging directories, and starts the progress sweep task.
    pub async fn new(config: Config) -> Result<Self> {
        let storage = LibraryStorage::new(&config.storage);
        storage.init().await?;

        let db = Arc::new(Database::new(&config.database_path).await?);
        let tracker = ProgressTracker::new(config.progress);
        let store: Arc<dyn ChapterStore> = db.clone();
        let commit_manager = Arc::new(CommitManager::new(store));

        let shutdown = CancellationToken::new();
        tracker.spawn_sweeper(shutdown.clone());

        info!(
            library_dir = ?config.storage.library_dir,
            staging_dir = ?config.storage.staging_dir,
            "chapter ingestor initialized"
        );

        Ok(Self {
            db,
            config: Arc::new(config),
            storage,
            tracker,
            commit_manager,
            shutdown,
        })
    }

    /// Submit an archive for ingestion.
    ///
    /// Performs only synchronous validation — metadata rules (already
    /// enforced by [`UploadRequest`]), a duplicate-chapter pre-check, and the
    /// container magic-byte check — then spools the archive and spawns the
    /// extraction pipeline. Returns the upload id immediately; all further
    /// outcomes are reported through the progress interface.
    pub async fn submit(&self, request: UploadRequest, archive: Vec<u8>) -> Result<UploadId> {
        if archive.is_empty() {
            return Err(Error::Validation(ValidationError::UnreadableContainer(
                "empty upload body".to_string(),
            )));
        }
        if !validation::is_valid_container(&archive) {
            return Err(Error::Validation(ValidationError::UnreadableContainer(
                "leading bytes do not match a ZIP signature".to_string(),
            )));
        }

        if let Some(existing) = self
            .db
            .find_chapter(request.collection_id(), request.chapter_number())
            .await?
        {
            return Err(Error::Duplicate(format!(
                "chapter {} already exists in collection {} (id {})",
                request.chapter_number(),
                request.collection_id(),
                existing.id
            )));
        }

        let (id, cancel_token) = self.tracker.create();

        // Spool the archive bytes next to the staging area before returning,
        // so the accepted response implies the bytes are safely on disk.
        let archive_size = archive.len() as u64;
        self.tracker.update(
            &id,
            ProgressUpdate {
                status: Some(UploadStatus::Uploading),
                progress: Some(2.0),
                message: Some("spooling archive".to_string()),
                processed_bytes: Some(archive_size),
                total_bytes: Some(archive_size),
                ..Default::default()
            },
        );
        let archive_path = self.storage.archive_path_for(&id);
        if let Err(e) = tokio::fs::write(&archive_path, &archive).await {
            let error = Error::Io(e);
            self.tracker.fail(&id, &error);
            return Err(error);
        }

        info!(
            upload_id = %id,
            collection_id = request.collection_id(),
            chapter_number = request.chapter_number(),
            archive_size,
            "upload accepted, spawning extraction pipeline"
        );

        let ingestor = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            pipeline::run(ingestor, task_id, request, cancel_token).await;
        });

        Ok(id)
    }

    /// Current progress snapshot for an upload
    pub fn progress(&self, id: &UploadId) -> Option<UploadProgress> {
        self.tracker.get(id)
    }

    /// Request cooperative cancellation of a running upload.
    ///
    /// The upload is reported as cancelled immediately; the background task
    /// observes the flag at its next suspension point and cleans up. Rejects
    /// uploads that are already terminal.
    pub fn cancel(&self, id: &UploadId) -> Result<UploadProgress> {
        self.tracker.cancel(id)
    }

    /// Subscribe to progress events for all uploads.
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.tracker.subscribe()
    }

    /// Delete a committed chapter: record first, then files
    pub async fn delete_chapter(&self, id: crate::types::ChapterId) -> Result<()> {
        let chapter = self
            .db
            .get_chapter(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chapter {}", id)))?;

        self.db.delete_chapter(id).await?;
        self.storage
            .remove_chapter_dir(&chapter.collection_id, &chapter.chapter_number)
            .await?;

        info!(chapter_id = %id, "chapter deleted");
        Ok(())
    }

    /// Serve a persisted page reference (placeholder on missing content)
    pub async fn read_page(&self, reference: &str) -> crate::storage::PageContent {
        self.storage.read_page(reference).await
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Stop background maintenance tasks
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let ingestor = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(ingestor, config).await })
    }
}
