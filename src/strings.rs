// src/strings.rs

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

lazy_static! {
    static ref ANY_UPPERISH_LOWER_RE: Regex = Regex::new("(.)([A-Z][0-9]*)([a-z])").unwrap();
}

lazy_static! {
    static ref LOWERISH_UPPER_RE: Regex = Regex::new("([a-z][0-9]*)([A-Z])").unwrap();
}

lazy_static! {
    static ref INVALID_RUNS_RE: Regex = Regex::new("[^a-zA-Z0-9]+").unwrap();
}

/// Normalizes the input string to ASCII kebab-case.
///
/// Non-ASCII input is decomposed (NFD) and all combining marks are dropped, so
/// the conversion is lossy. camelCase, PascalCase, snake_case and
/// SCREAMING_SNAKE_CASE are all supported; anything else working (digits mixed
/// in, say) is a happy accident. The function is idempotent: kebab-case input
/// comes back unchanged.
pub fn normalize_to_kebab_case(s: &str) -> String {
    let decomposed: String = s.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let s = ANY_UPPERISH_LOWER_RE.replace_all(&decomposed, "${1}-${2}${3}");
    let s = LOWERISH_UPPER_RE.replace_all(&s, "${1}-${2}");
    let s = INVALID_RUNS_RE.replace_all(&s, "-");
    s.trim_matches('-').to_lowercase()
}

// MARK: --- UNIT TESTS ---
