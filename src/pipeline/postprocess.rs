//! Post-processing: deterministic cleanup of model-emitted JSON text.
//!
//! Both the bounding-box reply and the quiz reply are supposed to be bare
//! JSON, and both regularly arrive wrapped in ```` ```json ```` fences, with
//! Windows line endings, or with a stray BOM. These rules undo that before
//! anything is parsed or handed to the browser.
//!
//! ## Rule Order
//!
//! Invisible characters go first so a BOM in front of the opening fence does
//! not hide it; fences are removed before the final trim.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model reply that should contain JSON.
///
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Remove every ```` ```json ```` and ```` ``` ```` token
/// 4. Trim surrounding whitespace
pub fn clean_json_reply(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_code_fences(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").to_string()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove code fences ───────────────────────────────────────────────

/// Remove markdown fences anywhere in the text, not just around it.
pub fn strip_code_fences(input: &str) -> String {
    input.replace("```json", "").replace("```", "")
}
