//! Line matching for URC listeners and response validation
//!
//! Patterns come from user input, so a regex that fails to compile is
//! treated as "no match" rather than an error.

use regex::Regex;

use crate::model::{MatchMode, Validation};

/// Compile a user pattern, logging and discarding invalid ones
///
/// AT response prefixes are often written unescaped (`+CREG: (\d)`), so a
/// pattern starting with a dangling repetition operator is retried with that
/// operator taken literally.
pub(crate) fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            if pattern.starts_with(['+', '*', '?']) {
                if let Ok(re) = Regex::new(&format!("\\{pattern}")) {
                    return Some(re);
                }
            }
            tracing::debug!(pattern, error = %e, "Invalid regex pattern");
            None
        }
    }
}

/// Decide whether an incoming line matches a listener pattern
pub fn check_urc_match(line: &str, pattern: &str, mode: MatchMode) -> bool {
    match mode {
        MatchMode::Contains => line.contains(pattern),
        MatchMode::Exact => line.trim() == pattern,
        MatchMode::StartsWith => line.starts_with(pattern),
        MatchMode::EndsWith => line.ends_with(pattern),
        MatchMode::Regex => compile(pattern).is_some_and(|re| re.is_match(line)),
    }
}

/// Check a response against a command's validation
///
/// `buffer` holds every line received since the command was sent, joined
/// with `\n`; `line` is the most recent one. `Equals` compares the latest
/// line so that an echoed command does not make it unsatisfiable.
pub fn validate_response(validation: &Validation, buffer: &str, line: &str) -> bool {
    match validation {
        Validation::None => true,
        Validation::Contains(expected) => buffer.contains(expected.as_str()),
        Validation::Equals(expected) => {
            line.trim() == expected.trim() || buffer.trim() == expected.trim()
        }
        Validation::Regex(pattern) => compile(pattern).is_some_and(|re| re.is_match(buffer)),
    }
}
