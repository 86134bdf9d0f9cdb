//! Container and image content validation
//!
//! Uploads are untrusted bytes from anonymous clients, so nothing is taken
//! at face value: the container itself and every decompressed entry are
//! checked against known signatures before any of it is kept. When content
//! is not an image, the validator tries to name what it actually is (PDF,
//! nested archive, executable) so the rejection message is actionable.

use std::fmt;

/// Bytes buffered before an incremental probe produces a verdict
pub const MIN_PROBE_BYTES: usize = 12;

/// ZIP local file header signature
const ZIP_LOCAL_HEADER: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
/// ZIP end-of-central-directory signature (empty archives start with this)
const ZIP_EOCD: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

/// PNG signature, all eight bytes
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Image formats accepted as chapter pages
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    /// JPEG (FFD8FF)
    Jpeg,
    /// PNG (8-byte signature)
    Png,
    /// WebP (RIFF....WEBP)
    Webp,
    /// GIF87a or GIF89a
    Gif,
    /// AVIF (ISO-BMFF ftyp brand)
    Avif,
    /// Windows bitmap
    Bmp,
    /// TIFF, either byte order
    Tiff,
}

impl ImageKind {
    /// Canonical file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Webp => "webp",
            ImageKind::Gif => "gif",
            ImageKind::Avif => "avif",
            ImageKind::Bmp => "bmp",
            ImageKind::Tiff => "tiff",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageKind::Jpeg => "JPEG",
            ImageKind::Png => "PNG",
            ImageKind::Webp => "WebP",
            ImageKind::Gif => "GIF",
            ImageKind::Avif => "AVIF",
            ImageKind::Bmp => "BMP",
            ImageKind::Tiff => "TIFF",
        };
        write!(f, "{}", name)
    }
}

/// Why content was rejected, with the identified actual format when known
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentRejection {
    /// Human-readable identification of the non-image content
    pub detected: String,
}

impl fmt::Display for ContentRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detected)
    }
}

/// Check whether the uploaded bytes start with a supported container signature.
///
/// Only ZIP containers are accepted. The EOCD signature (an archive with no
/// entries) passes the magic check and is rejected later as containing no
/// valid images, which produces the more useful error message.
pub fn is_valid_container(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZIP_LOCAL_HEADER) || bytes.starts_with(&ZIP_EOCD)
}

/// Classify decompressed entry content by its leading bytes.
///
/// Signatures are checked in a fixed order; on no match the content is
/// identified as a common non-image format purely to produce an actionable
/// rejection message. Content shorter than the shortest signature is
/// conclusively rejected, never accepted.
pub fn classify_image(bytes: &[u8]) -> Result<ImageKind, ContentRejection> {
    if bytes.len() >= 3 && bytes[..3] == [0xFF, 0xD8, 0xFF] {
        return Ok(ImageKind::Jpeg);
    }
    if bytes.starts_with(&PNG_SIGNATURE) {
        return Ok(ImageKind::Png);
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Ok(ImageKind::Webp);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Ok(ImageKind::Gif);
    }
    if bytes.len() >= 12
        && &bytes[4..8] == b"ftyp"
        && (&bytes[8..12] == b"avif" || &bytes[8..12] == b"avis")
    {
        return Ok(ImageKind::Avif);
    }
    if bytes.starts_with(b"BM") && bytes.len() >= 6 {
        return Ok(ImageKind::Bmp);
    }
    if bytes.len() >= 4
        && (bytes[..4] == [0x49, 0x49, 0x2A, 0x00] || bytes[..4] == [0x4D, 0x4D, 0x00, 0x2A])
    {
        return Ok(ImageKind::Tiff);
    }

    Err(ContentRejection {
        detected: identify_non_image(bytes),
    })
}

/// Name common non-image formats for rejection messages
fn identify_non_image(bytes: &[u8]) -> String {
    if bytes.len() < 2 {
        return "content too short to identify".to_string();
    }
    if bytes.starts_with(b"%PDF") {
        return "PDF document".to_string();
    }
    if bytes.starts_with(b"PK") {
        return "nested ZIP archive".to_string();
    }
    if bytes.starts_with(b"Rar!") {
        return "nested RAR archive".to_string();
    }
    if bytes.starts_with(b"7z\xBC\xAF") {
        return "nested 7z archive".to_string();
    }
    if bytes.starts_with(b"MZ") {
        return "Windows executable".to_string();
    }
    if bytes.starts_with(&[0x7F, 0x45, 0x4C, 0x46]) {
        return "ELF executable".to_string();
    }
    if bytes.starts_with(b"#!") {
        return "executable script".to_string();
    }
    if bytes
        .iter()
        .all(|&b| b == b'\t' || b == b'\n' || b == b'\r' || (0x20..0x7F).contains(&b))
    {
        return "plain text".to_string();
    }
    "unrecognized binary data".to_string()
}

/// Incremental content probe for streamed entries.
///
/// Bytes are buffered until [`MIN_PROBE_BYTES`] are available, at which point
/// [`SignatureProbe::verdict`] yields a classification. Files that end before
/// the buffer fills are classified from whatever arrived via
/// [`SignatureProbe::finalize`]; too-short content is rejected there.
#[derive(Debug, Default)]
pub struct SignatureProbe {
    buf: Vec<u8>,
}

impl SignatureProbe {
    /// Create an empty probe
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of streamed content. Only the first [`MIN_PROBE_BYTES`]
    /// are retained.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.buf.len() < MIN_PROBE_BYTES {
            let need = MIN_PROBE_BYTES - self.buf.len();
            self.buf.extend_from_slice(&chunk[..chunk.len().min(need)]);
        }
    }

    /// Classification, once enough bytes have been buffered. Returns `None`
    /// while fewer than [`MIN_PROBE_BYTES`] have arrived.
    pub fn verdict(&self) -> Option<Result<ImageKind, ContentRejection>> {
        if self.buf.len() < MIN_PROBE_BYTES {
            return None;
        }
        Some(classify_image(&self.buf))
    }

    /// Conclusive classification at end of content, however short it was
    pub fn finalize(&self) -> Result<ImageKind, ContentRejection> {
        classify_image(&self.buf)
    }
}
