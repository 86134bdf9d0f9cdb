//! Streaming archive extraction with hostile-input defenses
//!
//! Drives ZIP decompression entry by entry, enforcing resource ceilings and
//! validating every entry's name and content before it is allowed to stay on
//! disk. Every entry passes through the same gauntlet: count and size budget
//! checks, extension filter, path sanitization, streamed content
//! classification, and a post-write special-file check.
//!
//! Ceiling breaches and path traversal abort the whole operation, not just
//! the offending entry — they indicate adversarial input, and partial results
//! from a hostile archive are worthless. Unsupported-but-harmless entries
//! (metadata text files, unknown extensions) are skipped silently, since
//! archives legitimately contain more than page images.

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::LimitsConfig;
use crate::error::{Error, ExtractionError, Result, SecurityError, ValidationError};
use crate::sanitize::resolve_entry_name;
use crate::validation::{self, SignatureProbe};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extensions eligible for extraction; all other entries are skipped
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "avif", "bmp", "tif", "tiff",
];

/// Chunk size for streaming entry content to disk
const STREAM_CHUNK: usize = 64 * 1024;

/// A page image staged on disk, ready for sorting and commit
#[derive(Clone, Debug)]
pub struct ExtractedFile {
    /// Sanitized path inside the staging directory
    pub path: PathBuf,
    /// The entry's original archive-internal name
    pub original_name: String,
    /// Uncompressed size in bytes
    pub size: u64,
}

impl ExtractedFile {
    /// The staged filename (final path component)
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }
}

/// Check whether an entry name carries an allow-listed image extension
fn has_image_extension(name: &str) -> bool {
    let filename = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|e| *e == ext)
        }
        _ => false,
    }
}

/// Extract a container archive into `staging_dir`.
///
/// Runs synchronously and is expected to be called via `spawn_blocking` from
/// async contexts. The cancellation token is polled between entries; a
/// cancelled extraction returns [`Error::Cancelled`] and the caller runs the
/// same staging cleanup as for a failure.
///
/// `on_entry` is invoked after each entry is handled (staged or skipped)
/// with `(entries_processed, total_entries)` for progress reporting.
///
/// On success, returns the staged files in archive order. The result is
/// never empty: an archive with no valid page images is a
/// [`ValidationError::NoValidImages`].
pub fn extract_container(
    archive_path: &Path,
    staging_dir: &Path,
    limits: &LimitsConfig,
    cancel: &CancellationToken,
    mut on_entry: impl FnMut(usize, usize),
) -> Result<Vec<ExtractedFile>> {
    // Container-level magic check before any entry is touched.
    let mut archive_file = std::fs::File::open(archive_path)?;
    let mut magic = Vec::with_capacity(4);
    (&mut archive_file).take(4).read_to_end(&mut magic)?;
    if !validation::is_valid_container(&magic) {
        return Err(Error::Validation(ValidationError::UnreadableContainer(
            "leading bytes do not match a ZIP signature".to_string(),
        )));
    }

    let mut archive = zip::ZipArchive::new(archive_file).map_err(|e| {
        Error::Validation(ValidationError::UnreadableContainer(format!(
            "failed to read archive directory: {}",
            e
        )))
    })?;

    let total_entries = archive.len();
    if total_entries > limits.max_entries {
        return Err(Error::Security(SecurityError::TooManyEntries {
            count: total_entries,
            limit: limits.max_entries,
        }));
    }

    std::fs::create_dir_all(staging_dir)?;

    debug!(
        ?archive_path,
        total_entries,
        ?staging_dir,
        "starting container extraction"
    );

    let mut staged = Vec::new();
    let mut skipped = 0usize;
    let mut total_bytes: u64 = 0;

    for index in 0..total_entries {
        if cancel.is_cancelled() {
            info!(?archive_path, index, "extraction cancelled between entries");
            return Err(Error::Cancelled);
        }

        let entry = archive.by_index(index).map_err(|e| {
            Error::Extraction(ExtractionError::Decompress {
                entry: format!("#{}", index),
                reason: e.to_string(),
            })
        })?;
        let name = entry.name().to_string();

        if entry.is_dir() {
            on_entry(index + 1, total_entries);
            continue;
        }

        // Size ceilings are checked against the declared size before any
        // byte is written, and re-checked against the streamed size during
        // decompression so a lying header cannot bypass them.
        let declared = entry.size();
        if declared > limits.max_entry_bytes {
            return Err(Error::Security(SecurityError::EntryTooLarge {
                entry: name,
                size: declared,
                limit: limits.max_entry_bytes,
            }));
        }
        if total_bytes.saturating_add(declared) > limits.max_total_bytes {
            return Err(Error::Security(SecurityError::ArchiveTooLarge {
                total: total_bytes.saturating_add(declared),
                limit: limits.max_total_bytes,
            }));
        }

        if !has_image_extension(&name) {
            debug!(entry = %name, "skipping non-image entry");
            skipped += 1;
            on_entry(index + 1, total_entries);
            continue;
        }

        let dest = match resolve_entry_name(&name, staging_dir, limits.max_filename_len) {
            Ok(path) => path,
            Err(rejection) if rejection.is_hostile() => {
                warn!(entry = %name, %rejection, "aborting extraction: hostile entry name");
                return Err(Error::Security(SecurityError::PathTraversal { entry: name }));
            }
            Err(rejection) => {
                debug!(entry = %name, %rejection, "skipping unusable entry name");
                skipped += 1;
                on_entry(index + 1, total_entries);
                continue;
            }
        };

        let written = stream_entry(entry, &name, &dest, limits, total_bytes)?;
        check_staged_file(&dest)?;

        total_bytes += written;
        staged.push(ExtractedFile {
            path: dest,
            original_name: name,
            size: written,
        });
        on_entry(index + 1, total_entries);
    }

    if staged.is_empty() {
        return Err(Error::Validation(ValidationError::NoValidImages));
    }

    info!(
        ?archive_path,
        staged = staged.len(),
        skipped,
        total_bytes,
        "container extraction complete"
    );

    Ok(staged)
}

/// Stream one entry's decompressed content to `dest`, classifying the leading
/// bytes and enforcing size ceilings as bytes arrive.
///
/// Any failure deletes the partial file before returning.
fn stream_entry(
    mut entry: zip::read::ZipFile<'_>,
    name: &str,
    dest: &Path,
    limits: &LimitsConfig,
    total_so_far: u64,
) -> Result<u64> {
    let mut out = std::fs::File::create(dest).map_err(|e| {
        Error::Extraction(ExtractionError::StagingWrite {
            path: dest.to_path_buf(),
            reason: e.to_string(),
        })
    })?;

    let mut probe = SignatureProbe::new();
    let mut probe_settled = false;
    let mut written: u64 = 0;
    let mut buf = [0u8; STREAM_CHUNK];

    let result = loop {
        let n = match entry.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => {
                break Err(Error::Extraction(ExtractionError::Decompress {
                    entry: name.to_string(),
                    reason: e.to_string(),
                }));
            }
        };

        written += n as u64;
        if written > limits.max_entry_bytes {
            break Err(Error::Security(SecurityError::EntryTooLarge {
                entry: name.to_string(),
                size: written,
                limit: limits.max_entry_bytes,
            }));
        }
        if total_so_far.saturating_add(written) > limits.max_total_bytes {
            break Err(Error::Security(SecurityError::ArchiveTooLarge {
                total: total_so_far.saturating_add(written),
                limit: limits.max_total_bytes,
            }));
        }

        if !probe_settled {
            probe.push(&buf[..n]);
            if let Some(verdict) = probe.verdict() {
                if let Err(rejection) = verdict {
                    break Err(Error::Security(SecurityError::DisguisedContent {
                        entry: name.to_string(),
                        detected: rejection.detected,
                    }));
                }
                probe_settled = true;
            }
        }

        if let Err(e) = out.write_all(&buf[..n]) {
            break Err(Error::Extraction(ExtractionError::StagingWrite {
                path: dest.to_path_buf(),
                reason: e.to_string(),
            }));
        }
    };

    // Entries shorter than the probe threshold get their conclusive verdict
    // at end of content.
    let result = result.and_then(|_| {
        if !probe_settled {
            if let Err(rejection) = probe.finalize() {
                return Err(Error::Security(SecurityError::DisguisedContent {
                    entry: name.to_string(),
                    detected: rejection.detected,
                }));
            }
        }
        Ok(())
    });

    drop(out);

    match result {
        Ok(()) => Ok(written),
        Err(e) => {
            if let Err(remove_err) = std::fs::remove_file(dest) {
                warn!(path = ?dest, error = %remove_err, "failed to remove partial file");
            }
            Err(e)
        }
    }
}

/// Post-write check that the staged path is an ordinary file.
///
/// Symlinks, files with additional hard links, and anything that is not a
/// regular file are deleted and abort the operation.
fn check_staged_file(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path)?;

    let violation = if meta.file_type().is_symlink() {
        Some("symbolic link".to_string())
    } else if !meta.is_file() {
        Some("not a regular file".to_string())
    } else {
        hardlink_violation(&meta)
    };

    if let Some(reason) = violation {
        if let Err(remove_err) = std::fs::remove_file(path) {
            warn!(?path, error = %remove_err, "failed to remove special file");
        }
        return Err(Error::Security(SecurityError::SpecialFile {
            path: path.to_path_buf(),
            reason,
        }));
    }

    Ok(())
}

#[cfg(unix)]
fn hardlink_violation(meta: &std::fs::Metadata) -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    let nlink = meta.nlink();
    (nlink > 1).then(|| format!("{} hard links", nlink))
}

#[cfg(not(unix))]
fn hardlink_violation(_meta: &std::fs::Metadata) -> Option<String> {
    None
}
