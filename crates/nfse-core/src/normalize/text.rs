//! Cleanup for text fields damaged by encoding mismatches.

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

lazy_static! {
    // Failed transliteration leaves "??" (or longer runs) in place of a character.
    static ref QUESTION_MARK_RUN: Regex = Regex::new(r"\?{2,}").unwrap();
}

const REPLACEMENT_CHARACTER: char = '\u{FFFD}';

/// Strip decoding debris and diacritics from a text field.
///
/// Combining marks go first so that a mark sitting between two `?` cannot
/// survive one pass and form a new run in the next. The result is trimmed,
/// and the function is idempotent.
pub fn sanitize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c) && *c != REPLACEMENT_CHARACTER)
        .collect();

    QUESTION_MARK_RUN
        .replace_all(&stripped, "")
        .trim()
        .to_string()
}
