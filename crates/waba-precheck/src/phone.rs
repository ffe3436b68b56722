//! E.164 phone normalization (spec §4.G).

use regex::Regex;
use std::sync::OnceLock;

fn e164_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+\d{8,15}$").expect("static E.164 pattern is valid"))
}

/// Normalize a raw phone number to E.164 by stripping everything but
/// digits and re-prefixing with `+`. Returns `None` if the result doesn't
/// match `^\+\d{8,15}$` (spec §4.G, §8 invariant).
#[must_use]
pub fn normalize_e164(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let candidate = format!("+{digits}");
    if e164_pattern().is_match(&candidate) {
        Some(candidate)
    } else {
        None
    }
}
