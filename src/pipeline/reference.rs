//! Page-reference markers emitted by the model.
//!
//! The tutor prompt asks the model to end diagram answers with
//! `[[PAGE_REF: <page>]]`. Grammar:
//!
//! ```text
//! marker := "[[PAGE_REF:" WS* DIGIT+ "]]"
//! ```
//!
//! Only the first marker counts. The matched substring is removed from the
//! answer and nothing else is touched, so surrounding whitespace survives.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_PAGE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[PAGE_REF:\s*(\d+)\]\]").unwrap());

/// Answer text with the first page marker removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReference {
    /// Text shown to the user.
    pub text: String,
    /// Cited page (1-based), if a marker was present and fits in `u32`.
    pub page: Option<u32>,
}

/// Find and strip the first `[[PAGE_REF: n]]` marker in `answer`.
pub fn extract_page_reference(answer: &str) -> PageReference {
    let Some(caps) = RE_PAGE_REF.captures(answer) else {
        return PageReference {
            text: answer.to_string(),
            page: None,
        };
    };

    let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
    let page = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());

    let mut text = String::with_capacity(answer.len());
    text.push_str(&answer[..whole.start]);
    text.push_str(&answer[whole.end..]);

    PageReference { text, page }
}
