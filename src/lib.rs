//! # chapter-ingest
//!
//! Backend library for safe ingestion of chapter page archives.
//!
//! Anonymous uploaders submit compressed archives of page images; this crate
//! validates them against a hostile-input threat model, extracts and orders
//! the pages, and commits the result to durable storage atomically, while a
//! progress tracker reports the long-running work to polling clients.
//!
//! ## Design Philosophy
//!
//! - **Untrusted input first** - every archive byte is validated before it
//!   is kept; ceiling breaches and traversal attempts abort the whole upload
//! - **All-or-nothing commits** - the page files and the chapter record
//!   exist together or not at all, even across failures
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding;
//!   the bundled REST API is optional glue
//! - **Submit, poll, cancel** - expensive work runs in background tasks
//!   correlated by upload id, decoupled from any transport
//!
//! ## Quick Start
//!
//! ```no_run
//! use chapter_ingest::{ChapterIngestor, Config, UploadRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ingestor = ChapterIngestor::new(Config::default()).await?;
//!
//!     let request = UploadRequest::new("solar-saga", "12", None)?;
//!     let archive = std::fs::read("chapter-12.cbz")?;
//!     let upload_id = ingestor.submit(request, archive).await?;
//!
//!     // Poll until the background pipeline reaches a terminal state
//!     while let Some(progress) = ingestor.progress(&upload_id) {
//!         println!("{}: {:.0}% - {}", progress.status.as_str(), progress.progress, progress.message);
//!         if progress.status.is_terminal() {
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(250)).await;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Atomic staging→final commit protocol
pub mod commit;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Streaming archive extraction
pub mod extraction;
/// Core ingestion orchestrator
pub mod ingest;
/// Upload progress tracking
pub mod progress;
/// Archive entry name sanitization
pub mod sanitize;
/// Natural page ordering
pub mod sorting;
/// Library and staging file layout
pub mod storage;
/// Core types
pub mod types;
/// Container and image content validation
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use db::{ChapterStore, Database};
pub use error::{
    ApiError, CommitError, Error, ErrorDetail, ExtractionError, Result, SecurityError,
    StoreError, ToHttpStatus, ValidationError,
};
pub use ingest::{ChapterIngestor, UploadRequest};
pub use progress::{ProgressEvent, ProgressTracker, UploadProgress};
pub use sorting::{SortMetadata, SortResult};
pub use types::{ChapterId, ChapterInfo, UploadId, UploadStatus};

/// Helper function to run the ingestor with graceful signal handling.
///
/// Waits for a termination signal, then stops the ingestor's background
/// maintenance tasks.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use chapter_ingest::{ChapterIngestor, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let ingestor = ChapterIngestor::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(ingestor).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(ingestor: ChapterIngestor) -> Result<()> {
    wait_for_signal().await;
    ingestor.shutdown();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("received SIGTERM signal");
            } else {
                tracing::error!("could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C signal");
        }
    }
}
