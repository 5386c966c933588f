//! Canonical form for comparing OCR output against catalog keywords.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Trim, uppercase, strip diacritics and collapse whitespace runs.
///
/// OCR frequently loses umlauts and accents, so "ETUPÄÄRUSTO" and
/// "ETUPAARUSTO" must compare equal.
pub fn normalize(text: &str) -> String {
    let upper = text.trim().to_uppercase();

    let stripped: String = upper.nfd().filter(|c| !is_combining_mark(*c)).collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
