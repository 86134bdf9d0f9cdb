//! Atomic commit of a staged chapter
//!
//! Moving a fully-populated staging directory into the library and creating
//! the durable chapter record is a two-phase obligation: after any failure,
//! the files and the record must exist together or not at all — a reader
//! must never observe a record without files or orphaned files without a
//! record.
//!
//! The protocol is a saga of forward steps, each registering a compensating
//! action before it can fail: back up any pre-existing final directory,
//! rename staging into place, create the record, delete the backup. On
//! failure the registered compensations run in reverse order. Renames are
//! used instead of copies so each step is atomic within one filesystem
//! volume.

use crate::db::{ChapterStore, NewChapter};
use crate::error::{CommitError, Error, Result};
use crate::types::ChapterId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Suffix appended to a pre-existing final directory while it is held as a
/// rollback backup
const BACKUP_SUFFIX: &str = ".backup";

/// Compensating action registered by a forward commit step
enum Compensation {
    /// Rename the backup back to the original final location
    RestoreBackup {
        backup: PathBuf,
        original: PathBuf,
    },
    /// Remove the committed final directory
    RemoveFinal { path: PathBuf },
    /// Delete the created chapter record
    DeleteRecord { id: ChapterId },
}

/// Drives the staging→final commit protocol against a chapter store
pub struct CommitManager {
    store: Arc<dyn ChapterStore>,
}

impl CommitManager {
    /// Create a commit manager backed by the given record store
    pub fn new(store: Arc<dyn ChapterStore>) -> Self {
        Self { store }
    }

    /// Commit a staged chapter: move `staging_dir` to `final_dir` and create
    /// the chapter record.
    ///
    /// On success the staging directory no longer exists and the returned id
    /// refers to the created record. On failure every completed step has been
    /// compensated before the error is returned.
    pub async fn commit(
        &self,
        staging_dir: &Path,
        final_dir: &Path,
        record: NewChapter,
    ) -> Result<ChapterId> {
        let mut compensations: Vec<Compensation> = Vec::new();

        match self
            .run_forward(staging_dir, final_dir, record, &mut compensations)
            .await
        {
            Ok(id) => Ok(id),
            Err(e) => {
                error!(error = %e, ?final_dir, "commit failed, rolling back");
                self.run_compensations(compensations).await;
                Err(e)
            }
        }
    }

    async fn run_forward(
        &self,
        staging_dir: &Path,
        final_dir: &Path,
        record: NewChapter,
        compensations: &mut Vec<Compensation>,
    ) -> Result<ChapterId> {
        // BackupExisting: a re-upload replaces the previous files, but they
        // are kept aside until the new record is durable.
        let backup_dir = backup_path(final_dir);
        let had_existing = tokio::fs::try_exists(final_dir).await.unwrap_or(false);
        if had_existing {
            tokio::fs::rename(final_dir, &backup_dir)
                .await
                .map_err(|e| {
                    Error::Commit(CommitError::BackupFailed {
                        path: final_dir.to_path_buf(),
                        reason: e.to_string(),
                    })
                })?;
            debug!(?final_dir, ?backup_dir, "backed up existing chapter directory");
            compensations.push(Compensation::RestoreBackup {
                backup: backup_dir.clone(),
                original: final_dir.to_path_buf(),
            });
        }

        // MoveStagingToFinal: atomic rename on the same volume.
        if let Some(parent) = final_dir.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Commit(CommitError::MoveFailed {
                    from: staging_dir.to_path_buf(),
                    to: final_dir.to_path_buf(),
                    reason: format!("failed to create parent directory: {}", e),
                })
            })?;
        }
        tokio::fs::rename(staging_dir, final_dir)
            .await
            .map_err(|e| {
                Error::Commit(CommitError::MoveFailed {
                    from: staging_dir.to_path_buf(),
                    to: final_dir.to_path_buf(),
                    reason: e.to_string(),
                })
            })?;
        compensations.push(Compensation::RemoveFinal {
            path: final_dir.to_path_buf(),
        });

        // CreateRecord: only after the files are physically in place.
        let id = self.store.insert_chapter(&record).await.map_err(|e| {
            Error::Commit(CommitError::RecordFailed {
                reason: e.to_string(),
            })
        })?;
        compensations.push(Compensation::DeleteRecord { id });

        // DeleteBackup: the old files are no longer needed once both the new
        // files and the new record exist.
        if had_existing {
            tokio::fs::remove_dir_all(&backup_dir).await.map_err(|e| {
                Error::Commit(CommitError::CleanupFailed {
                    path: backup_dir.clone(),
                    reason: e.to_string(),
                })
            })?;
        }

        info!(chapter_id = %id, ?final_dir, pages = record.pages.len(), "chapter committed");
        Ok(id)
    }

    /// Execute compensations in reverse registration order. Individual
    /// failures are logged and the remaining compensations still run; the
    /// original commit error is what surfaces to the caller.
    async fn run_compensations(&self, compensations: Vec<Compensation>) {
        for compensation in compensations.into_iter().rev() {
            match compensation {
                Compensation::DeleteRecord { id } => {
                    if let Err(e) = self.store.delete_chapter(id).await {
                        error!(chapter_id = %id, error = %e, "rollback: failed to delete chapter record");
                    } else {
                        debug!(chapter_id = %id, "rollback: deleted chapter record");
                    }
                }
                Compensation::RemoveFinal { path } => {
                    if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                        error!(?path, error = %e, "rollback: failed to remove final directory");
                    } else {
                        debug!(?path, "rollback: removed final directory");
                    }
                }
                Compensation::RestoreBackup { backup, original } => {
                    if let Err(e) = tokio::fs::rename(&backup, &original).await {
                        error!(?backup, ?original, error = %e, "rollback: failed to restore backup");
                    } else {
                        debug!(?original, "rollback: restored previous chapter directory");
                    }
                }
            }
        }
    }
}

/// Backup location for a final directory
fn backup_path(final_dir: &Path) -> PathBuf {
    let mut name = final_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(BACKUP_SUFFIX);
    final_dir.with_file_name(name)
}
