//! Upload progress tracking
//!
//! An owned, upload-id-keyed store of task status. The background pipeline
//! is the sole writer for its own entry; the store itself is safe for
//! concurrent access across many simultaneous uploads. Every update
//! refreshes a heartbeat and is pushed to broadcast subscribers, so a
//! subscribed caller sees terminal states promptly while others poll.
//!
//! A periodic sweep bounds the store's memory: entries past their TTL are
//! purged regardless of state, terminal entries are purged after a shorter
//! grace period, and entries whose heartbeat went quiet are flipped to an
//! error state — a leaked background task must never pin an entry forever.
//!
//! The map uses a std RwLock rather than the async one so the blocking
//! extraction code can report progress without a runtime handle.

use crate::config::ProgressConfig;
use crate::error::{Error, Result, ToHttpStatus};
use crate::types::{UploadId, UploadStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use utoipa::ToSchema;

/// Buffer size for the progress event broadcast channel
const EVENT_CHANNEL_BUFFER: usize = 1000;

/// Snapshot of one upload's progress, as returned to polling clients
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadProgress {
    /// Upload correlation token
    pub id: UploadId,
    /// Current lifecycle status
    pub status: UploadStatus,
    /// Progress percentage (0.0 to 100.0)
    pub progress: f32,
    /// Human-readable status message
    pub message: String,
    /// Index of the entry currently being processed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<u32>,
    /// Total number of entries in the container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<u32>,
    /// When the upload was accepted
    pub started_at: DateTime<Utc>,
    /// Processing throughput in bytes per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_bps: Option<u64>,
    /// Estimated seconds until completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    /// Error message, present in the error/cancelled states
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error code, present in the error/cancelled states
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Whether cancellation was requested
    pub cancelled: bool,
}

/// Progress change pushed to broadcast subscribers
#[derive(Clone, Debug, Serialize)]
pub struct ProgressEvent {
    /// The upload that changed
    pub id: UploadId,
    /// Full snapshot after the change
    pub progress: UploadProgress,
}

/// Partial update merged into an upload's progress entry.
///
/// Unset fields keep their previous values.
#[derive(Clone, Debug, Default)]
pub struct ProgressUpdate {
    /// New lifecycle status
    pub status: Option<UploadStatus>,
    /// New progress percentage
    pub progress: Option<f32>,
    /// New status message
    pub message: Option<String>,
    /// Entry currently being processed
    pub current_file: Option<u32>,
    /// Total entries in the container
    pub total_files: Option<u32>,
    /// Bytes processed so far (drives speed/ETA derivation)
    pub processed_bytes: Option<u64>,
    /// Total bytes expected (drives ETA derivation)
    pub total_bytes: Option<u64>,
    /// Error message
    pub error: Option<String>,
    /// Machine-readable error code
    pub error_code: Option<String>,
}

/// Internal per-upload state: the public snapshot plus bookkeeping that
/// never leaves the tracker
struct TrackedUpload {
    progress: UploadProgress,
    cancel_token: CancellationToken,
    created: Instant,
    last_heartbeat: Instant,
    terminal_at: Option<Instant>,
    processed_bytes: u64,
    total_bytes: u64,
}

/// Owned progress store for all in-flight uploads
#[derive(Clone)]
pub struct ProgressTracker {
    entries: Arc<RwLock<HashMap<UploadId, TrackedUpload>>>,
    event_tx: tokio::sync::broadcast::Sender<ProgressEvent>,
    config: ProgressConfig,
}

impl ProgressTracker {
    /// Create a new tracker with the given sweep tuning
    pub fn new(config: ProgressConfig) -> Self {
        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_BUFFER);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            config,
        }
    }

    /// Register a new upload. Returns its id and the cancellation token the
    /// background task must poll.
    pub fn create(&self) -> (UploadId, CancellationToken) {
        let id = UploadId::generate();
        let token = CancellationToken::new();
        let now = Instant::now();

        let progress = UploadProgress {
            id: id.clone(),
            status: UploadStatus::Initializing,
            progress: 0.0,
            message: "upload accepted".to_string(),
            current_file: None,
            total_files: None,
            started_at: Utc::now(),
            speed_bps: None,
            eta_seconds: None,
            error: None,
            error_code: None,
            cancelled: false,
        };

        let snapshot = progress.clone();
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                id.clone(),
                TrackedUpload {
                    progress,
                    cancel_token: token.clone(),
                    created: now,
                    last_heartbeat: now,
                    terminal_at: None,
                    processed_bytes: 0,
                    total_bytes: 0,
                },
            );
        }
        self.publish(&id, snapshot);

        (id, token)
    }

    /// Merge a partial update into an upload's entry.
    ///
    /// Refreshes the heartbeat, recomputes throughput and ETA from the merged
    /// byte counters, and publishes the new snapshot. Updates against a
    /// terminal entry are ignored — once an upload is complete, errored, or
    /// cancelled, its final message is what clients see.
    pub fn update(&self, id: &UploadId, update: ProgressUpdate) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        let Some(entry) = entries.get_mut(id) else {
            debug!(upload_id = %id, "progress update for unknown upload");
            return;
        };
        if entry.progress.status.is_terminal() {
            return;
        }

        if let Some(status) = update.status {
            entry.progress.status = status;
            if status.is_terminal() {
                entry.terminal_at = Some(Instant::now());
            }
        }
        if let Some(progress) = update.progress {
            entry.progress.progress = progress.clamp(0.0, 100.0);
        }
        if let Some(message) = update.message {
            entry.progress.message = message;
        }
        if let Some(current) = update.current_file {
            entry.progress.current_file = Some(current);
        }
        if let Some(total) = update.total_files {
            entry.progress.total_files = Some(total);
        }
        if let Some(error) = update.error {
            entry.progress.error = Some(error);
        }
        if let Some(code) = update.error_code {
            entry.progress.error_code = Some(code);
        }
        if let Some(processed) = update.processed_bytes {
            entry.processed_bytes = processed;
        }
        if let Some(total) = update.total_bytes {
            entry.total_bytes = total;
        }

        // Derive throughput and ETA from the merged byte counters.
        let elapsed = entry.created.elapsed().as_secs_f64();
        if entry.processed_bytes > 0 && elapsed > 0.0 {
            let speed = (entry.processed_bytes as f64 / elapsed) as u64;
            entry.progress.speed_bps = Some(speed);
            if entry.total_bytes > entry.processed_bytes && speed > 0 {
                entry.progress.eta_seconds =
                    Some((entry.total_bytes - entry.processed_bytes) / speed);
            } else {
                entry.progress.eta_seconds = None;
            }
        }

        entry.last_heartbeat = Instant::now();
        let snapshot = entry.progress.clone();
        drop(entries);
        self.publish(id, snapshot);
    }

    /// Mark an upload failed with the message and machine code of an error
    pub fn fail(&self, id: &UploadId, error: &Error) {
        let status = if matches!(error, Error::Cancelled) {
            UploadStatus::Cancelled
        } else {
            UploadStatus::Error
        };
        self.update(
            id,
            ProgressUpdate {
                status: Some(status),
                message: Some(error.to_string()),
                error: Some(error.to_string()),
                error_code: Some(error.error_code().to_string()),
                ..Default::default()
            },
        );
    }

    /// Mark an upload complete
    pub fn complete(&self, id: &UploadId, message: impl Into<String>) {
        self.update(
            id,
            ProgressUpdate {
                status: Some(UploadStatus::Complete),
                progress: Some(100.0),
                message: Some(message.into()),
                ..Default::default()
            },
        );
    }

    /// Request cooperative cancellation of a running upload.
    ///
    /// The entry flips to the cancelled terminal state immediately; the
    /// background task observes the token at its next suspension point and
    /// runs the regular cleanup path. Rejects uploads already in a terminal
    /// state.
    pub fn cancel(&self, id: &UploadId) -> Result<UploadProgress> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::ApiServer("progress store poisoned".to_string()))?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("upload {}", id)))?;

        if entry.progress.status.is_terminal() {
            return Err(Error::InvalidState {
                operation: "cancel".to_string(),
                current_state: entry.progress.status.as_str().to_string(),
            });
        }

        entry.cancel_token.cancel();
        entry.progress.cancelled = true;
        entry.progress.status = UploadStatus::Cancelled;
        entry.progress.message = "cancelled by user".to_string();
        entry.progress.error = Some("cancelled by user".to_string());
        entry.progress.error_code = Some("cancelled".to_string());
        entry.terminal_at = Some(Instant::now());

        let snapshot = entry.progress.clone();
        drop(entries);
        self.publish(id, snapshot.clone());
        Ok(snapshot)
    }

    /// Whether cancellation has been requested for an upload
    pub fn is_cancelled(&self, id: &UploadId) -> bool {
        self.entries
            .read()
            .ok()
            .and_then(|entries| {
                entries
                    .get(id)
                    .map(|e| e.cancel_token.is_cancelled())
            })
            .unwrap_or(false)
    }

    /// Current snapshot for an upload, if tracked
    pub fn get(&self, id: &UploadId) -> Option<UploadProgress> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(id).map(|e| e.progress.clone()))
    }

    /// Number of tracked uploads (all states)
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether no uploads are tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to progress events. Multiple subscribers are supported;
    /// each receives all events independently.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.event_tx.subscribe()
    }

    /// Run one sweep pass: purge expired entries and flip stalled ones to
    /// an error state.
    pub fn sweep(&self) {
        let mut stalled = Vec::new();
        {
            let Ok(mut entries) = self.entries.write() else {
                return;
            };

            entries.retain(|id, entry| {
                if entry.created.elapsed() >= self.config.entry_ttl() {
                    debug!(upload_id = %id, "sweeping expired progress entry");
                    return false;
                }
                if let Some(terminal_at) = entry.terminal_at
                    && terminal_at.elapsed() >= self.config.terminal_grace()
                {
                    debug!(upload_id = %id, "sweeping finished progress entry");
                    return false;
                }
                true
            });

            for (id, entry) in entries.iter_mut() {
                if !entry.progress.status.is_terminal()
                    && entry.last_heartbeat.elapsed() >= self.config.stall_timeout()
                {
                    warn!(upload_id = %id, "upload stalled, marking as errored");
                    entry.progress.status = UploadStatus::Error;
                    entry.progress.message =
                        "upload timed out: no progress from background task".to_string();
                    entry.progress.error = Some(entry.progress.message.clone());
                    entry.progress.error_code = Some("stalled".to_string());
                    entry.cancel_token.cancel();
                    entry.terminal_at = Some(Instant::now());
                    stalled.push((id.clone(), entry.progress.clone()));
                }
            }
        }

        for (id, snapshot) in stalled {
            self.publish(&id, snapshot);
        }
    }

    /// Spawn the periodic sweep task. Runs until the shutdown token fires.
    pub fn spawn_sweeper(
        &self,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let tracker = self.clone();
        let interval_duration = tracker.config.sweep_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        tracker.sweep();
                    }
                    _ = shutdown.cancelled() => {
                        break;
                    }
                }
            }
        })
    }

    /// Send a snapshot to subscribers; dropped silently when nobody listens
    fn publish(&self, id: &UploadId, progress: UploadProgress) {
        self.event_tx
            .send(ProgressEvent {
                id: id.clone(),
                progress,
            })
            .ok();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SecurityError;
    use std::time::Duration;

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(ProgressConfig::default())
    }

    /// Config where every lifetime is zero, so a single sweep purges/flips
    /// everything without waiting.
    fn instant_sweep_config() -> ProgressConfig {
        ProgressConfig {
            sweep_interval_secs: 1,
            entry_ttl_secs: 0,
            terminal_grace_secs: 0,
            stall_timeout_secs: 0,
        }
    }

    #[test]
    fn create_and_get_snapshot() {
        let tracker = tracker();
        let (id, token) = tracker.create();

        let snapshot = tracker.get(&id).unwrap();
        assert_eq!(snapshot.status, UploadStatus::Initializing);
        assert_eq!(snapshot.progress, 0.0);
        assert!(!snapshot.cancelled);
        assert!(!token.is_cancelled());
        assert!(tracker.get(&UploadId::from("missing")).is_none());
    }

    #[test]
    fn update_merges_fields() {
        let tracker = tracker();
        let (id, _token) = tracker.create();

        tracker.update(
            &id,
            ProgressUpdate {
                status: Some(UploadStatus::Extracting),
                progress: Some(40.0),
                message: Some("extracting entries".to_string()),
                current_file: Some(4),
                total_files: Some(10),
                ..Default::default()
            },
        );
        // Second partial update must not clobber unrelated fields.
        tracker.update(
            &id,
            ProgressUpdate {
                current_file: Some(5),
                ..Default::default()
            },
        );

        let snapshot = tracker.get(&id).unwrap();
        assert_eq!(snapshot.status, UploadStatus::Extracting);
        assert_eq!(snapshot.progress, 40.0);
        assert_eq!(snapshot.message, "extracting entries");
        assert_eq!(snapshot.current_file, Some(5));
        assert_eq!(snapshot.total_files, Some(10));
    }

    #[test]
    fn byte_counters_derive_speed() {
        let tracker = tracker();
        let (id, _token) = tracker.create();

        std::thread::sleep(Duration::from_millis(20));
        tracker.update(
            &id,
            ProgressUpdate {
                processed_bytes: Some(1_000_000),
                total_bytes: Some(2_000_000),
                ..Default::default()
            },
        );

        let snapshot = tracker.get(&id).unwrap();
        let speed = snapshot.speed_bps.unwrap();
        assert!(speed > 0);
        assert!(snapshot.eta_seconds.is_some());
    }

    #[test]
    fn updates_after_terminal_are_ignored() {
        let tracker = tracker();
        let (id, _token) = tracker.create();

        tracker.complete(&id, "done");
        tracker.update(
            &id,
            ProgressUpdate {
                status: Some(UploadStatus::Extracting),
                message: Some("zombie task update".to_string()),
                ..Default::default()
            },
        );

        let snapshot = tracker.get(&id).unwrap();
        assert_eq!(snapshot.status, UploadStatus::Complete);
        assert_eq!(snapshot.message, "done");
    }

    #[test]
    fn fail_records_code_and_message() {
        let tracker = tracker();
        let (id, _token) = tracker.create();

        let error = Error::Security(SecurityError::TooManyEntries {
            count: 1000,
            limit: 500,
        });
        tracker.fail(&id, &error);

        let snapshot = tracker.get(&id).unwrap();
        assert_eq!(snapshot.status, UploadStatus::Error);
        assert_eq!(snapshot.error_code.as_deref(), Some("too_many_entries"));
        assert!(snapshot.error.unwrap().contains("too many entries"));
    }

    #[test]
    fn cancel_flips_token_and_state() {
        let tracker = tracker();
        let (id, token) = tracker.create();

        let snapshot = tracker.cancel(&id).unwrap();
        assert_eq!(snapshot.status, UploadStatus::Cancelled);
        assert!(snapshot.cancelled);
        assert!(token.is_cancelled());
        assert!(tracker.is_cancelled(&id));
    }

    #[test]
    fn cancel_rejects_terminal_uploads() {
        let tracker = tracker();
        let (id, _token) = tracker.create();

        tracker.complete(&id, "done");
        let err = tracker.cancel(&id).unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));

        // Cancelling twice is also rejected.
        let (id2, _token2) = tracker.create();
        tracker.cancel(&id2).unwrap();
        assert!(matches!(
            tracker.cancel(&id2).unwrap_err(),
            Error::InvalidState { .. }
        ));
    }

    #[test]
    fn cancel_unknown_upload_is_not_found() {
        let tracker = tracker();
        let err = tracker.cancel(&UploadId::from("nope")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn updates_are_pushed_to_subscribers() {
        let tracker = tracker();
        let mut events = tracker.subscribe();
        let (id, _token) = tracker.create();

        tracker.update(
            &id,
            ProgressUpdate {
                status: Some(UploadStatus::Processing),
                ..Default::default()
            },
        );

        // First event: creation snapshot; second: the update.
        let created = events.recv().await.unwrap();
        assert_eq!(created.progress.status, UploadStatus::Initializing);
        let updated = events.recv().await.unwrap();
        assert_eq!(updated.id, id);
        assert_eq!(updated.progress.status, UploadStatus::Processing);
    }

    #[test]
    fn sweep_purges_expired_entries() {
        let tracker = ProgressTracker::new(instant_sweep_config());
        let (_id, _token) = tracker.create();
        assert_eq!(tracker.len(), 1);

        tracker.sweep();
        assert!(tracker.is_empty());
    }

    #[test]
    fn sweep_purges_terminal_entries_after_grace() {
        let config = ProgressConfig {
            sweep_interval_secs: 1,
            entry_ttl_secs: 3600,
            terminal_grace_secs: 0,
            stall_timeout_secs: 3600,
        };
        let tracker = ProgressTracker::new(config);
        let (done, _t1) = tracker.create();
        let (running, _t2) = tracker.create();
        tracker.complete(&done, "done");

        tracker.sweep();
        assert!(tracker.get(&done).is_none(), "terminal entry swept");
        assert!(tracker.get(&running).is_some(), "active entry kept");
    }

    #[test]
    fn sweep_flips_stalled_entries_to_error() {
        let config = ProgressConfig {
            sweep_interval_secs: 1,
            entry_ttl_secs: 3600,
            terminal_grace_secs: 3600,
            stall_timeout_secs: 0,
        };
        let tracker = ProgressTracker::new(config);
        let (id, token) = tracker.create();

        tracker.sweep();

        let snapshot = tracker.get(&id).unwrap();
        assert_eq!(snapshot.status, UploadStatus::Error);
        assert_eq!(snapshot.error_code.as_deref(), Some("stalled"));
        assert!(snapshot.message.contains("timed out"));
        assert!(token.is_cancelled(), "stalled task is asked to stop");
    }

    #[tokio::test]
    async fn sweeper_task_runs_and_stops() {
        let tracker = ProgressTracker::new(ProgressConfig {
            sweep_interval_secs: 1,
            entry_ttl_secs: 0,
            terminal_grace_secs: 0,
            stall_timeout_secs: 0,
        });
        let (_id, _token) = tracker.create();

        let shutdown = CancellationToken::new();
        let handle = tracker.spawn_sweeper(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(tracker.is_empty(), "sweeper should have purged the entry");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
