//! Text normalization for index keys.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Multiplication sign marking hybrid names, e.g. `× Abies alba`.
pub const HYBRID_MARKER: char = '×';

/// Collapses runs of whitespace into single spaces and trims both ends.
pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Key of a scientific name in the name index.
///
/// Whitespace is normalized and the string is brought into NFC so that
/// precomposed and decomposed diacritics index identically.
pub fn name_key(scientific_name: &str) -> String {
    normalize_whitespace(scientific_name).nfc().collect()
}

/// Returns the hybrid-marked variant of `scientific_name`.
pub fn hybrid_variant(scientific_name: &str) -> String {
    format!("{HYBRID_MARKER} {}", name_key(scientific_name))
}

/// Normalizes a literature citation for duplicate detection.
///
/// Decomposes the text (NFKD), drops combining marks, lowercases, collapses
/// every run of non-alphanumeric characters into one space and trims.
/// Returns `None` if nothing alphanumeric remains.
pub fn normalize_citation(citation: &str) -> Option<String> {
    let mut out = String::with_capacity(citation.len());
    let mut pending_space = false;
    for c in citation.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase().filter(|c| !is_combining_mark(*c)));
        } else {
            pending_space = true;
        }
    }
    if out.is_empty() { None } else { Some(out) }
}
