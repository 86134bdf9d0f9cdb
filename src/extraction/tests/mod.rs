use crate::config::LimitsConfig;
use crate::error::{Error, SecurityError, ValidationError};
use crate::extraction::extract_container;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// JPEG-signature content padded to the requested length
fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01];
    bytes.resize(len.max(bytes.len()), 0xAB);
    bytes.truncate(len.max(12));
    bytes
}

/// PNG-signature content padded to the requested length
fn png_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    bytes.resize(len.max(bytes.len()), 0x00);
    bytes
}

/// Create a ZIP archive containing the given (name, content) entries
fn create_zip(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

/// Create a ZIP archive that also contains a directory entry
fn create_zip_with_dir(archive_path: &Path, dir: &str, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    writer.add_directory(dir, options).unwrap();
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

fn default_limits() -> LimitsConfig {
    LimitsConfig::default()
}

fn tight_limits() -> LimitsConfig {
    LimitsConfig {
        max_entries: 5,
        max_entry_bytes: 100,
        max_total_bytes: 200,
        max_filename_len: 255,
    }
}

/// Count regular files anywhere under a directory
fn file_count(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

fn extract(
    archive: &Path,
    staging: &Path,
    limits: &LimitsConfig,
) -> crate::error::Result<Vec<crate::extraction::ExtractedFile>> {
    extract_container(archive, staging, limits, &CancellationToken::new(), |_, _| {})
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[test]
fn extracts_image_entries() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("chapter.zip");
    let staging = dir.path().join("staging");
    create_zip(
        &archive,
        &[
            ("01.jpg", &jpeg_bytes(64)),
            ("02.png", &png_bytes(64)),
            ("03.jpg", &jpeg_bytes(64)),
        ],
    );

    let files = extract(&archive, &staging, &default_limits()).unwrap();

    assert_eq!(files.len(), 3);
    for f in &files {
        assert!(f.path.exists(), "{:?} should exist", f.path);
        assert!(f.path.starts_with(&staging));
        assert_eq!(f.size, 64);
    }
    assert_eq!(file_count(&staging), 3);
}

#[test]
fn reports_progress_per_entry() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("chapter.zip");
    let staging = dir.path().join("staging");
    create_zip(
        &archive,
        &[("01.jpg", &jpeg_bytes(32)), ("02.jpg", &jpeg_bytes(32))],
    );

    let mut seen = Vec::new();
    extract_container(
        &archive,
        &staging,
        &default_limits(),
        &CancellationToken::new(),
        |done, total| seen.push((done, total)),
    )
    .unwrap();

    assert_eq!(seen, vec![(1, 2), (2, 2)]);
}

#[test]
fn nested_entry_names_are_flattened() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("chapter.zip");
    let staging = dir.path().join("staging");
    create_zip(&archive, &[("scans/part1/001.jpg", &jpeg_bytes(32))]);

    let files = extract(&archive, &staging, &default_limits()).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name(), "001.jpg");
    assert_eq!(files[0].path.parent().unwrap(), staging);
    assert_eq!(files[0].original_name, "scans/part1/001.jpg");
}

#[test]
fn directory_entries_are_skipped() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("chapter.zip");
    let staging = dir.path().join("staging");
    create_zip_with_dir(&archive, "pages", &[("pages/01.jpg", &jpeg_bytes(32))]);

    let files = extract(&archive, &staging, &default_limits()).unwrap();
    assert_eq!(files.len(), 1);
    // No subdirectory was created for the directory entry.
    assert!(!staging.join("pages").exists());
}

#[test]
fn non_image_entries_are_silently_skipped() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("chapter.zip");
    let staging = dir.path().join("staging");
    create_zip(
        &archive,
        &[
            ("info.txt", b"scanned by somebody"),
            ("01.jpg", &jpeg_bytes(32)),
            ("thumbs.db", &[0u8; 16]),
        ],
    );

    let files = extract(&archive, &staging, &default_limits()).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(file_count(&staging), 1);
}

#[test]
fn short_image_is_classified_at_end_of_content() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("chapter.zip");
    let staging = dir.path().join("staging");
    // 3-byte JPEG prefix: below the probe threshold, valid at finalize.
    create_zip(&archive, &[("tiny.jpg", &[0xFF, 0xD8, 0xFF])]);

    let files = extract(&archive, &staging, &default_limits()).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].size, 3);
}

// ---------------------------------------------------------------------------
// Container validation
// ---------------------------------------------------------------------------

#[test]
fn garbage_container_is_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("not-a-zip.zip");
    std::fs::write(&archive, b"this is not an archive at all").unwrap();
    let staging = dir.path().join("staging");

    let err = extract(&archive, &staging, &default_limits()).unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::UnreadableContainer(_))
    ));
}

#[test]
fn archive_with_no_images_is_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("chapter.zip");
    let staging = dir.path().join("staging");
    create_zip(&archive, &[("readme.txt", b"no images here")]);

    let err = extract(&archive, &staging, &default_limits()).unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::NoValidImages)
    ));
}

// ---------------------------------------------------------------------------
// Security: traversal
// ---------------------------------------------------------------------------

#[test]
fn traversal_entry_aborts_whole_operation() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("evil.zip");
    let staging = dir.path().join("deep").join("staging");
    std::fs::create_dir_all(&staging).unwrap();
    create_zip(
        &archive,
        &[
            ("01.jpg", &jpeg_bytes(32)),
            ("../../escape.jpg", &jpeg_bytes(32)),
            ("03.jpg", &jpeg_bytes(32)),
        ],
    );

    let err = extract(&archive, &staging, &default_limits()).unwrap_err();
    match err {
        Error::Security(SecurityError::PathTraversal { entry }) => {
            assert_eq!(entry, "../../escape.jpg");
        }
        other => panic!("expected PathTraversal, got {other:?}"),
    }

    // Nothing escaped the staging directory: the only files anywhere under
    // the temp root are the archive itself and entries staged before the
    // attack was detected, all inside staging.
    for entry in WalkDir::new(dir.path()).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && entry.path() != archive {
            assert!(
                entry.path().starts_with(&staging),
                "file escaped staging: {:?}",
                entry.path()
            );
        }
    }
    assert!(!dir.path().join("escape.jpg").exists());
    assert!(!dir.path().join("deep").join("escape.jpg").exists());
}

// ---------------------------------------------------------------------------
// Security: resource ceilings
// ---------------------------------------------------------------------------

#[test]
fn oversized_entry_aborts_with_no_partial_file() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("bomb.zip");
    let staging = dir.path().join("staging");
    create_zip(&archive, &[("huge.jpg", &jpeg_bytes(500))]);

    let err = extract(&archive, &staging, &tight_limits()).unwrap_err();
    match err {
        Error::Security(SecurityError::EntryTooLarge { entry, size, limit }) => {
            assert_eq!(entry, "huge.jpg");
            assert_eq!(size, 500);
            assert_eq!(limit, 100);
        }
        other => panic!("expected EntryTooLarge, got {other:?}"),
    }
    assert_eq!(file_count(&staging), 0, "no partial file may remain");
}

#[test]
fn cumulative_size_ceiling_aborts() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("bomb.zip");
    let staging = dir.path().join("staging");
    create_zip(
        &archive,
        &[
            ("01.jpg", &jpeg_bytes(90)),
            ("02.jpg", &jpeg_bytes(90)),
            ("03.jpg", &jpeg_bytes(90)),
        ],
    );

    let err = extract(&archive, &staging, &tight_limits()).unwrap_err();
    assert!(matches!(
        err,
        Error::Security(SecurityError::ArchiveTooLarge { .. })
    ));
}

#[test]
fn entry_count_ceiling_aborts_before_extraction() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("many.zip");
    let staging = dir.path().join("staging");
    let contents: Vec<(String, Vec<u8>)> = (0..10)
        .map(|i| (format!("{:02}.jpg", i), jpeg_bytes(16)))
        .collect();
    let refs: Vec<(&str, &[u8])> = contents
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_slice()))
        .collect();
    create_zip(&archive, &refs);

    let err = extract(&archive, &staging, &tight_limits()).unwrap_err();
    match err {
        Error::Security(SecurityError::TooManyEntries { count, limit }) => {
            assert_eq!(count, 10);
            assert_eq!(limit, 5);
        }
        other => panic!("expected TooManyEntries, got {other:?}"),
    }
    // Rejected before staging was populated.
    assert_eq!(file_count(&staging), 0);
}

// ---------------------------------------------------------------------------
// Security: disguised content
// ---------------------------------------------------------------------------

#[test]
fn disguised_pdf_is_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("chapter.zip");
    let staging = dir.path().join("staging");
    create_zip(
        &archive,
        &[("innocent.jpg", b"%PDF-1.4\nfake image content here")],
    );

    let err = extract(&archive, &staging, &default_limits()).unwrap_err();
    match err {
        Error::Security(SecurityError::DisguisedContent { entry, detected }) => {
            assert_eq!(entry, "innocent.jpg");
            assert_eq!(detected, "PDF document");
        }
        other => panic!("expected DisguisedContent, got {other:?}"),
    }
    assert_eq!(file_count(&staging), 0, "disguised file must be deleted");
}

#[test]
fn disguised_executable_is_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("chapter.zip");
    let staging = dir.path().join("staging");
    let mut elf = vec![0x7F, 0x45, 0x4C, 0x46, 2, 1, 1, 0];
    elf.resize(64, 0);
    create_zip(&archive, &[("page01.png", &elf)]);

    let err = extract(&archive, &staging, &default_limits()).unwrap_err();
    assert!(matches!(
        err,
        Error::Security(SecurityError::DisguisedContent { .. })
    ));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn cancelled_token_stops_extraction() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("chapter.zip");
    let staging = dir.path().join("staging");
    create_zip(&archive, &[("01.jpg", &jpeg_bytes(32))]);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = extract_container(&archive, &staging, &default_limits(), &cancel, |_, _| {})
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(file_count(&staging), 0);
}
