//! Archive entry name sanitization
//!
//! Entry names come straight out of attacker-controlled archive metadata, so
//! they are never used as paths directly. The resolver flattens every entry
//! to a bare filename confined to the target directory and reports rejections
//! explicitly instead of erroring, letting the extractor distinguish entries
//! that are merely unusable from names that encode an attack.

use std::path::{Path, PathBuf};

/// Why an entry name could not be resolved to a safe output path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathRejection {
    /// Name was empty after normalization
    Empty,
    /// Filename exceeds the configured maximum length
    TooLong {
        /// Actual length in bytes
        len: usize,
        /// Configured ceiling
        limit: usize,
    },
    /// Filename contains ASCII control characters
    ControlCharacters,
    /// Filename is the literal `.` or `..`
    Reserved,
    /// Name contains a parent-directory traversal component
    Traversal,
    /// Resolved path did not stay under the target directory
    EscapesTarget,
}

impl PathRejection {
    /// Whether this rejection indicates an attack rather than a merely
    /// unsupported entry. Hostile rejections abort the whole extraction;
    /// benign ones skip the entry.
    pub fn is_hostile(&self) -> bool {
        matches!(self, PathRejection::Traversal | PathRejection::EscapesTarget)
    }
}

impl std::fmt::Display for PathRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathRejection::Empty => write!(f, "empty entry name"),
            PathRejection::TooLong { len, limit } => {
                write!(f, "filename too long: {} > {} bytes", len, limit)
            }
            PathRejection::ControlCharacters => write!(f, "control characters in filename"),
            PathRejection::Reserved => write!(f, "reserved filename"),
            PathRejection::Traversal => write!(f, "path traversal sequence"),
            PathRejection::EscapesTarget => write!(f, "path escapes target directory"),
        }
    }
}

/// Resolve an archive-internal entry name to a safe output path under
/// `target_dir`.
///
/// Directory components are discarded — archives never dictate subdirectory
/// structure — and only the final filename survives. The resolved path is
/// re-checked to have `target_dir` as its parent as defense in depth against
/// normalization edge cases. This function never panics and never performs
/// I/O.
pub fn resolve_entry_name(
    entry_name: &str,
    target_dir: &Path,
    max_filename_len: usize,
) -> Result<PathBuf, PathRejection> {
    // Archives produced on Windows use backslash separators.
    let normalized = entry_name.replace('\\', "/");

    // Any parent-directory component is a zip-slip attempt, regardless of
    // where it appears; these abort the whole operation upstream.
    if normalized.split('/').any(|c| c == "..") {
        return Err(PathRejection::Traversal);
    }

    // Keep only the final filename.
    let filename = normalized
        .split('/')
        .filter(|c| !c.is_empty())
        .next_back()
        .unwrap_or("");

    if filename.is_empty() {
        return Err(PathRejection::Empty);
    }
    if filename == "." {
        return Err(PathRejection::Reserved);
    }
    if filename.len() > max_filename_len {
        return Err(PathRejection::TooLong {
            len: filename.len(),
            limit: max_filename_len,
        });
    }
    if filename
        .chars()
        .any(|c| c.is_ascii_control())
    {
        return Err(PathRejection::ControlCharacters);
    }

    let resolved = target_dir.join(filename);

    // Defense in depth: the join above cannot leave target_dir since the
    // filename holds no separators, but verify the prefix anyway.
    if resolved.parent() != Some(target_dir) {
        return Err(PathRejection::EscapesTarget);
    }

    Ok(resolved)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const MAX_LEN: usize = 255;

    fn resolve(name: &str) -> Result<PathBuf, PathRejection> {
        resolve_entry_name(name, Path::new("/staging/upload_1"), MAX_LEN)
    }

    #[test]
    fn plain_filename_resolves() {
        assert_eq!(
            resolve("01.jpg").unwrap(),
            PathBuf::from("/staging/upload_1/01.jpg")
        );
    }

    #[test]
    fn directory_components_are_discarded() {
        assert_eq!(
            resolve("chapter-05/pages/01.jpg").unwrap(),
            PathBuf::from("/staging/upload_1/01.jpg")
        );
        assert_eq!(
            resolve("deep\\windows\\path\\02.png").unwrap(),
            PathBuf::from("/staging/upload_1/02.png")
        );
    }

    #[test]
    fn traversal_is_hostile() {
        for name in [
            "../../../etc/passwd",
            "..\\..\\windows\\system32\\evil.dll",
            "pages/../../escape.jpg",
            "a/../b.jpg",
        ] {
            let rejection = resolve(name).unwrap_err();
            assert_eq!(rejection, PathRejection::Traversal, "name: {name}");
            assert!(rejection.is_hostile());
        }
    }

    #[test]
    fn empty_names_rejected_benignly() {
        for name in ["", "/", "//"] {
            let rejection = resolve(name).unwrap_err();
            assert_eq!(rejection, PathRejection::Empty, "name: {name:?}");
            assert!(!rejection.is_hostile());
        }
    }

    #[test]
    fn bare_dot_rejected_benignly() {
        let rejection = resolve("pages/.").unwrap_err();
        assert_eq!(rejection, PathRejection::Reserved);
        assert!(!rejection.is_hostile());
    }

    #[test]
    fn overlong_name_rejected() {
        let long = format!("{}.jpg", "x".repeat(300));
        match resolve(&long).unwrap_err() {
            PathRejection::TooLong { len, limit } => {
                assert_eq!(len, 304);
                assert_eq!(limit, MAX_LEN);
            }
            other => panic!("expected TooLong, got {other:?}"),
        }
    }

    #[test]
    fn control_characters_rejected() {
        let rejection = resolve("page\x001.jpg").unwrap_err();
        assert_eq!(rejection, PathRejection::ControlCharacters);
        assert!(!rejection.is_hostile());

        let rejection = resolve("new\nline.jpg").unwrap_err();
        assert_eq!(rejection, PathRejection::ControlCharacters);
    }

    #[test]
    fn leading_dot_segments_are_stripped() {
        assert_eq!(
            resolve("./cover.png").unwrap(),
            PathBuf::from("/staging/upload_1/cover.png")
        );
    }

    #[test]
    fn absolute_entry_names_are_confined() {
        assert_eq!(
            resolve("/etc/shadow").unwrap(),
            PathBuf::from("/staging/upload_1/shadow")
        );
    }

    #[test]
    fn resolved_path_always_under_target() {
        let target = Path::new("/staging/upload_9");
        for name in ["a.jpg", "x/y/z.png", "/abs.gif", "./rel.webp"] {
            let resolved = resolve_entry_name(name, target, MAX_LEN).unwrap();
            assert!(resolved.starts_with(target), "{name} -> {resolved:?}");
        }
    }
}
