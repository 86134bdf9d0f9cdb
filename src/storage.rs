//! Library and staging file layout
//!
//! Committed chapters live under `library_dir/<collection>/<chapter>/`,
//! in-flight extractions under `staging_dir/upload_<id>/`. Page references
//! persisted in chapter records are library-relative strings, so the library
//! root can move without rewriting records.

use crate::config::StorageConfig;
use crate::error::Result;
use crate::types::UploadId;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Served in place of a missing page so one lost file degrades a single
/// page instead of blanking the whole reading session. A 1x1 transparent
/// PNG.
pub const PLACEHOLDER_PAGE_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Bytes of a served page plus whether they are the placeholder
#[derive(Clone, Debug)]
pub struct PageContent {
    /// Raw image bytes
    pub bytes: Vec<u8>,
    /// True when the real file was missing and the placeholder was served
    pub placeholder: bool,
}

/// Resolves upload staging and committed chapter locations
#[derive(Clone, Debug)]
pub struct LibraryStorage {
    library_dir: PathBuf,
    staging_dir: PathBuf,
}

impl LibraryStorage {
    /// Create a storage layout from configuration
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            library_dir: config.library_dir.clone(),
            staging_dir: config.staging_dir.clone(),
        }
    }

    /// Create the library and staging roots if missing
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.library_dir).await?;
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        Ok(())
    }

    /// The library root
    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    /// Staging directory for one upload's extracted files
    pub fn staging_dir_for(&self, id: &UploadId) -> PathBuf {
        self.staging_dir.join(format!("upload_{}", id))
    }

    /// Spool path for one upload's raw archive bytes
    pub fn archive_path_for(&self, id: &UploadId) -> PathBuf {
        self.staging_dir.join(format!("upload_{}.zip", id))
    }

    /// Final directory for a committed chapter
    pub fn chapter_dir(&self, collection_id: &str, chapter_number: &str) -> PathBuf {
        self.library_dir.join(collection_id).join(chapter_number)
    }

    /// Library-relative reference for a committed page file
    pub fn page_reference(
        &self,
        collection_id: &str,
        chapter_number: &str,
        filename: &str,
    ) -> String {
        format!("{}/{}/{}", collection_id, chapter_number, filename)
    }

    /// Resolve a persisted page reference to an absolute path.
    ///
    /// References come from our own records, but they are still checked for
    /// traversal components before touching the filesystem.
    pub fn resolve_page(&self, reference: &str) -> Option<PathBuf> {
        let clean = reference.trim_start_matches('/');
        if clean.is_empty()
            || clean
                .split('/')
                .any(|c| c.is_empty() || c == "." || c == "..")
        {
            return None;
        }
        Some(self.library_dir.join(clean))
    }

    /// Read a page by its persisted reference.
    ///
    /// Missing or unresolvable content returns the placeholder image rather
    /// than an error.
    pub async fn read_page(&self, reference: &str) -> PageContent {
        let Some(path) = self.resolve_page(reference) else {
            warn!(reference, "unresolvable page reference, serving placeholder");
            return PageContent {
                bytes: PLACEHOLDER_PAGE_PNG.to_vec(),
                placeholder: true,
            };
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => PageContent {
                bytes,
                placeholder: false,
            },
            Err(e) => {
                warn!(reference, error = %e, "missing page content, serving placeholder");
                PageContent {
                    bytes: PLACEHOLDER_PAGE_PNG.to_vec(),
                    placeholder: true,
                }
            }
        }
    }

    /// Delete an upload's staging artifacts (spooled archive and extraction
    /// directory). Failures are logged, not surfaced — cleanup runs on error
    /// paths that already carry a primary error.
    pub async fn remove_staging(&self, id: &UploadId) {
        let archive = self.archive_path_for(id);
        if let Err(e) = tokio::fs::remove_file(&archive).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(upload_id = %id, path = ?archive, error = %e, "failed to remove spooled archive");
        }

        let staging = self.staging_dir_for(id);
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(upload_id = %id, path = ?staging, error = %e, "failed to remove staging directory");
        }
    }

    /// Delete a committed chapter's files
    pub async fn remove_chapter_dir(
        &self,
        collection_id: &str,
        chapter_number: &str,
    ) -> Result<()> {
        let dir = self.chapter_dir(collection_id, chapter_number);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
