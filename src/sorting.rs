//! Natural page ordering for extracted chapter files
//!
//! Filenames inside user archives follow no single convention: `01.jpg`,
//! `page-12.png`, `chapter01page05.webp`, or no numbers at all. This module
//! infers a reading order from digit runs in the filenames and scores how
//! trustworthy that order is, so uploads with ambiguous naming can be flagged
//! for human review instead of being published in a wrong order.
//!
//! Sorting is a pure function over the extracted file set: deterministic,
//! no I/O, and it never fails. Files are neither dropped nor duplicated.

use crate::extraction::ExtractedFile;
use std::cmp::Ordering;

/// Confidence below this threshold recommends manual reordering
const MANUAL_REORDER_THRESHOLD: f64 = 0.7;

/// Fraction of the numeric range that may be missing while still counting
/// as a sequential set (tolerates sparse scan numbering)
const MISSING_TOLERANCE: f64 = 0.3;

/// Fraction of adjacent gaps tolerated in a sequential set
const GAP_TOLERANCE: f64 = 0.25;

/// Statistics gathered while analyzing the inferred order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortMetadata {
    /// At least one filename contained a digit run
    pub has_numeric_sequences: bool,
    /// All primary digit runs share one character length
    pub consistent_padding: bool,
    /// The primary numbers form a (tolerably) contiguous sequence
    pub sequential_numbers: bool,
    /// Adjacent pairs whose numeric difference exceeds 1
    pub gap_count: u32,
    /// Adjacent pairs with identical primary numbers
    pub duplicate_numbers: u32,
    /// Total number of input files
    pub total_files: usize,
}

/// Outcome of ordering a set of extracted files
#[derive(Clone, Debug)]
pub struct SortResult {
    /// The input files in inferred reading order
    pub sorted_files: Vec<ExtractedFile>,
    /// Heuristic reliability of the order, in [0, 1]
    pub confidence: f64,
    /// True iff confidence falls below the manual-review threshold
    pub requires_manual_reorder: bool,
    /// Analysis detail
    pub metadata: SortMetadata,
}

/// A maximal digit run extracted from a filename stem
#[derive(Clone, Copy, Debug)]
struct DigitRun {
    /// Parsed numeric value (saturating on overflow)
    value: u64,
    /// Character length of the run, including leading zeros
    len: usize,
}

/// Per-file sort key material
#[derive(Clone, Copy, Debug)]
struct SortKey {
    /// Primary ordering number (digit run, or first-char ordinal fallback)
    primary: u64,
    /// The digit run that produced `primary`, if any
    run: Option<DigitRun>,
}

/// Order extracted files into inferred reading order with a confidence score.
///
/// Empty input returns an empty result with confidence 1.0 and no reorder
/// recommendation.
pub fn sort_pages(files: Vec<ExtractedFile>) -> SortResult {
    let total_files = files.len();

    if files.is_empty() {
        return SortResult {
            sorted_files: files,
            confidence: 1.0,
            requires_manual_reorder: false,
            metadata: SortMetadata {
                has_numeric_sequences: false,
                consistent_padding: true,
                sequential_numbers: false,
                gap_count: 0,
                duplicate_numbers: 0,
                total_files: 0,
            },
        };
    }

    let mut keyed: Vec<(SortKey, ExtractedFile)> = files
        .into_iter()
        .map(|f| (sort_key(f.file_name()), f))
        .collect();

    // Primary key is the inferred number; full-filename natural comparison
    // stabilizes ties.
    keyed.sort_by(|(ka, fa), (kb, fb)| {
        ka.primary
            .cmp(&kb.primary)
            .then_with(|| natural_compare(fa.file_name(), fb.file_name()))
    });

    let metadata = analyze_sequence(&keyed, total_files);
    let confidence = score_confidence(&metadata);

    SortResult {
        sorted_files: keyed.into_iter().map(|(_, f)| f).collect(),
        confidence,
        requires_manual_reorder: confidence < MANUAL_REORDER_THRESHOLD,
        metadata,
    }
}

/// Compute the sort key for one filename.
///
/// The no-digit fallback (first character ordinal of the lowercased stem) is
/// deterministic but best-effort only: it stabilizes ties, it does not infer
/// a true page order. Such sets are heavily penalized in the confidence score.
fn sort_key(name: &str) -> SortKey {
    let stem = strip_extension(name).to_lowercase();
    let runs = digit_runs(&stem);

    let run = match runs.len() {
        0 => None,
        1 => Some(runs[0]),
        // Multi-run names like "chapter01page05": the trailing run is the
        // page number unless it is zero, then fall back to the largest run.
        _ => {
            let last = runs[runs.len() - 1];
            if last.value >= 1 {
                Some(last)
            } else {
                runs.iter().copied().max_by_key(|r| r.value)
            }
        }
    };

    let primary = match run {
        Some(r) => r.value,
        None => stem.chars().next().map(|c| c as u64).unwrap_or(0),
    };

    SortKey { primary, run }
}

/// Strip the final extension component, if any
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Extract all maximal digit runs from a stem
fn digit_runs(stem: &str) -> Vec<DigitRun> {
    let mut runs = Vec::new();
    let mut value: u64 = 0;
    let mut len = 0usize;

    for c in stem.chars() {
        if let Some(d) = c.to_digit(10) {
            value = value.saturating_mul(10).saturating_add(d as u64);
            len += 1;
        } else if len > 0 {
            runs.push(DigitRun { value, len });
            value = 0;
            len = 0;
        }
    }
    if len > 0 {
        runs.push(DigitRun { value, len });
    }
    runs
}

/// Analyze the sorted primary numbers for gaps, duplicates, sequence shape,
/// and padding consistency.
fn analyze_sequence(keyed: &[(SortKey, ExtractedFile)], total_files: usize) -> SortMetadata {
    let numeric: Vec<DigitRun> = keyed.iter().filter_map(|(k, _)| k.run).collect();
    let has_numeric_sequences = !numeric.is_empty();

    let mut numbers: Vec<u64> = numeric.iter().map(|r| r.value).collect();
    numbers.sort_unstable();

    let mut gap_count = 0u32;
    let mut duplicate_numbers = 0u32;
    for pair in numbers.windows(2) {
        let diff = pair[1] - pair[0];
        if diff > 1 {
            gap_count += 1;
        } else if diff == 0 {
            duplicate_numbers += 1;
        }
    }

    let sequential_numbers = if numbers.is_empty() {
        false
    } else {
        let min = numbers[0];
        let max = numbers[numbers.len() - 1];
        let count = numbers.len() as u64;
        let missing = (max - min + 1).saturating_sub(count);
        let missing_budget = (MISSING_TOLERANCE * count as f64).ceil() as u64;
        let gap_budget = (GAP_TOLERANCE * count as f64).ceil() as u32;
        min <= 3 && missing <= missing_budget && gap_count <= gap_budget
    };

    // Padding is consistent when every primary run has the same character
    // length, and files sharing a numeric value agree on length.
    let consistent_padding = if numeric.is_empty() {
        true
    } else {
        let first_len = numeric[0].len;
        let uniform = numeric.iter().all(|r| r.len == first_len);
        let duplicates_agree = numeric.iter().all(|a| {
            numeric
                .iter()
                .all(|b| a.value != b.value || a.len == b.len)
        });
        uniform && duplicates_agree
    };

    SortMetadata {
        has_numeric_sequences,
        consistent_padding,
        sequential_numbers,
        gap_count,
        duplicate_numbers,
        total_files,
    }
}

/// Multiplicative confidence scoring.
///
/// Penalties are applied sequentially in a fixed order; the result is
/// clamped to [0, 1].
fn score_confidence(meta: &SortMetadata) -> f64 {
    let total = meta.total_files;
    let mut confidence = 1.0f64;

    if total < 2 {
        confidence *= 0.95;
    } else if total < 4 {
        confidence *= 0.92;
    }

    if !meta.has_numeric_sequences {
        // Ordering is essentially guesswork without numbers.
        confidence *= 0.2;
    }

    if meta.gap_count > 0 {
        let gap_ratio = meta.gap_count as f64 / total as f64;
        confidence *= if gap_ratio > 0.4 {
            0.4
        } else if gap_ratio > 0.2 {
            0.7
        } else {
            0.85
        };
    }

    if meta.duplicate_numbers > 0 {
        let dup_ratio = meta.duplicate_numbers as f64 / total as f64;
        confidence *= if dup_ratio > 0.3 {
            0.3
        } else if dup_ratio > 0.1 {
            0.6
        } else {
            0.8
        };
    }

    if !meta.consistent_padding {
        confidence *= 0.75;
    }

    if !meta.sequential_numbers {
        confidence *= 0.8;
    }

    confidence.clamp(0.0, 1.0)
}

/// Numeric-aware, case-insensitive filename comparison.
///
/// Digit chunks are compared by value, other characters by lowercased code
/// point, so "page2" sorts before "page10".
pub fn natural_compare(a: &str, b: &str) -> Ordering {
    let mut ca = a.chars().flat_map(|c| c.to_lowercase()).peekable();
    let mut cb = b.chars().flat_map(|c| c.to_lowercase()).peekable();

    loop {
        match (ca.peek().copied(), cb.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                if x.is_ascii_digit() && y.is_ascii_digit() {
                    let va = take_number(&mut ca);
                    let vb = take_number(&mut cb);
                    match va.cmp(&vb) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                match x.cmp(&y) {
                    Ordering::Equal => {
                        ca.next();
                        cb.next();
                    }
                    other => return other,
                }
            }
        }
    }
}

/// Consume a digit run from the iterator and return its value
fn take_number(chars: &mut std::iter::Peekable<impl Iterator<Item = char>>) -> u64 {
    let mut value: u64 = 0;
    while let Some(c) = chars.peek() {
        match c.to_digit(10) {
            Some(d) => {
                value = value.saturating_mul(10).saturating_add(d as u64);
                chars.next();
            }
            None => break,
        }
    }
    value
}
