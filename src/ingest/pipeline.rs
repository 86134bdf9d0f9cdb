//! Background extraction pipeline
//!
//! Runs the phases of one upload strictly in sequence: container extraction,
//! natural ordering, sequential renaming, atomic commit. Every exit path —
//! success, failure, cancellation — ends with staging cleanup and a terminal
//! progress update, because the progress interface is the only channel the
//! original caller still has.

use super::{ChapterIngestor, UploadRequest};
use crate::db::NewChapter;
use crate::error::{Error, ExtractionError, Result};
use crate::extraction::{self, ExtractedFile};
use crate::progress::ProgressUpdate;
use crate::sorting;
use crate::types::{ChapterId, UploadId, UploadStatus};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the pipeline for one upload and report its terminal state
pub(super) async fn run(
    ingestor: ChapterIngestor,
    id: UploadId,
    request: UploadRequest,
    cancel: CancellationToken,
) {
    let result = execute(&ingestor, &id, &request, &cancel).await;

    // The staging artifacts are removed on every path: on success the
    // extraction directory was consumed by the commit rename and only the
    // spooled archive remains; on failure both are torn down.
    ingestor.storage.remove_staging(&id).await;

    match result {
        Ok(chapter_id) => {
            info!(upload_id = %id, chapter_id = %chapter_id, "ingestion complete");
            ingestor
                .tracker
                .complete(&id, format!("chapter {} created", chapter_id));
        }
        Err(Error::Cancelled) => {
            info!(upload_id = %id, "ingestion cancelled, staging cleaned up");
            ingestor.tracker.fail(&id, &Error::Cancelled);
        }
        Err(e) => {
            error!(upload_id = %id, error = %e, "ingestion failed");
            ingestor.tracker.fail(&id, &e);
        }
    }
}

async fn execute(
    ingestor: &ChapterIngestor,
    id: &UploadId,
    request: &UploadRequest,
    cancel: &CancellationToken,
) -> Result<ChapterId> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    ingestor.tracker.update(
        id,
        ProgressUpdate {
            status: Some(UploadStatus::Processing),
            progress: Some(5.0),
            message: Some("validating container".to_string()),
            ..Default::default()
        },
    );

    let archive_path = ingestor.storage.archive_path_for(id);
    let staging_dir = ingestor.storage.staging_dir_for(id);

    // Extraction is blocking work; progress flows back through the tracker
    // from inside the entry callback.
    let files = {
        let tracker = ingestor.tracker.clone();
        let task_id = id.clone();
        let limits = ingestor.config.limits;
        let archive = archive_path.clone();
        let staging = staging_dir.clone();
        let token = cancel.clone();

        tokio::task::spawn_blocking(move || {
            extraction::extract_container(&archive, &staging, &limits, &token, |done, total| {
                let percent = 10.0 + 60.0 * done as f32 / total.max(1) as f32;
                tracker.update(
                    &task_id,
                    ProgressUpdate {
                        status: Some(UploadStatus::Extracting),
                        progress: Some(percent),
                        message: Some(format!("extracting entry {} of {}", done, total)),
                        current_file: Some(done as u32),
                        total_files: Some(total as u32),
                        ..Default::default()
                    },
                );
            })
        })
        .await
        .map_err(|e| {
            Error::Extraction(ExtractionError::Decompress {
                entry: "container".to_string(),
                reason: format!("extraction task panicked: {}", e),
            })
        })??
    };

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    ingestor.tracker.update(
        id,
        ProgressUpdate {
            status: Some(UploadStatus::Finalizing),
            progress: Some(75.0),
            message: Some("ordering pages".to_string()),
            ..Default::default()
        },
    );

    let sort_result = sorting::sort_pages(files);
    info!(
        upload_id = %id,
        pages = sort_result.sorted_files.len(),
        confidence = sort_result.confidence,
        requires_manual_reorder = sort_result.requires_manual_reorder,
        "pages ordered"
    );

    let page_names = assign_page_names(&staging_dir, &sort_result.sorted_files).await?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    ingestor.tracker.update(
        id,
        ProgressUpdate {
            status: Some(UploadStatus::Finalizing),
            progress: Some(90.0),
            message: Some("committing chapter".to_string()),
            ..Default::default()
        },
    );

    let pages: Vec<String> = page_names
        .iter()
        .map(|name| {
            ingestor.storage.page_reference(
                request.collection_id(),
                request.chapter_number(),
                name,
            )
        })
        .collect();
    // The extractor guarantees at least one staged file, so the cover (the
    // first ordered page) always exists.
    let cover = pages[0].clone();

    let record = NewChapter {
        collection_id: request.collection_id().to_string(),
        chapter_number: request.chapter_number().to_string(),
        title: request.title().map(|t| t.to_string()),
        pages,
        cover,
        sort_confidence: sort_result.confidence,
        requires_manual_reorder: sort_result.requires_manual_reorder,
    };

    let final_dir = ingestor
        .storage
        .chapter_dir(request.collection_id(), request.chapter_number());

    let chapter_id = ingestor
        .commit_manager
        .commit(&staging_dir, &final_dir, record)
        .await?;

    Ok(chapter_id)
}

/// Rename staged files to their final sequential page names
/// (`001.ext`, `002.ext`, …) in reading order.
///
/// Two passes, because a staged file may already carry a name that collides
/// with another file's target (an archive containing `001.jpg` at reading
/// position five).
async fn assign_page_names(
    staging_dir: &Path,
    sorted: &[ExtractedFile],
) -> Result<Vec<String>> {
    let mut temps = Vec::with_capacity(sorted.len());
    for (index, file) in sorted.iter().enumerate() {
        let extension = file
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "jpg".to_string());
        let temp = staging_dir.join(format!(".reorder_{:04}", index));
        tokio::fs::rename(&file.path, &temp).await.map_err(|e| {
            Error::Extraction(ExtractionError::StagingWrite {
                path: temp.clone(),
                reason: e.to_string(),
            })
        })?;
        temps.push((temp, extension));
    }

    let mut names = Vec::with_capacity(temps.len());
    for (index, (temp, extension)) in temps.iter().enumerate() {
        let name = format!("{:03}.{}", index + 1, extension);
        tokio::fs::rename(temp, staging_dir.join(&name))
            .await
            .map_err(|e| {
                Error::Extraction(ExtractionError::StagingWrite {
                    path: staging_dir.join(&name),
                    reason: e.to_string(),
                })
            })?;
        names.push(name);
    }

    Ok(names)
}
