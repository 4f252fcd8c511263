//! Query sanitizer — strips likely personal identifiers before a question
//! leaves the process, whether bound for a search service or the model.
//!
//! This is a best-effort filter, not a guarantee. It catches the common
//! shapes (honorific + surname, dates, long identifier numbers, gendered age
//! phrases); anything it does not recognise passes through unchanged.
//! Retrieval queries and every user turn sent to the answering model are
//! sanitized. The raw question is kept only for the stored turn and the
//! memory consolidator.

use regex_lite::Regex;
use std::sync::LazyLock;

/// A compiled redaction rule.
struct Rule {
    name: &'static str,
    regex: Option<Regex>,
    replacement: &'static str,
}

macro_rules! rule {
    ($name:expr, $regex_str:expr, $replacement:expr) => {
        Rule {
            name: $name,
            regex: Regex::new($regex_str).ok(),
            replacement: $replacement,
        }
    };
}

/// Applied in order; dates run before digit runs so `12/04/1980` becomes
/// one `[DATE]` rather than fragments.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule!(
            "honorific_name",
            r"\b(?:Mr|Mrs|Ms|Miss|Mx|Dr|Prof)\.?\s+[A-Z][a-z][A-Za-z'\-]*(?:\s+[A-Z][a-z][A-Za-z'\-]*)?",
            "[NAME]"
        ),
        rule!("iso_date", r"\b\d{4}-\d{1,2}-\d{1,2}\b", "[DATE]"),
        rule!("numeric_date", r"\b\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}\b", "[DATE]"),
        rule!(
            "written_date",
            r"(?i)\b\d{1,2}(?:st|nd|rd|th)?\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?,?\s+\d{4}\b",
            "[DATE]"
        ),
        rule!("spaced_identifier", r"\b\d{3}[ \-]\d{3}[ \-]\d{4}\b", "[ID]"),
        rule!("digit_run", r"\b\d{6,}\b", "[ID]"),
        rule!(
            "gendered_age",
            r"(?i)\b(\d{1,3})[\- ]years?[\- ]old\s+(?:male|female|man|woman|boy|girl|gentleman|lady)\s+patient\b",
            "${1}-year-old patient"
        ),
    ]
});

/// Replace identifying patterns in `text` with generic placeholders.
///
/// Never fails; unmatched text is returned as-is.
pub fn sanitize_query(text: &str) -> String {
    let mut result = text.to_string();
    for rule in RULES.iter() {
        let Some(regex) = &rule.regex else {
            tracing::warn!(rule = rule.name, "Sanitizer rule failed to compile, skipping");
            continue;
        };
        if regex.is_match(&result) {
            result = regex.replace_all(&result, rule.replacement).into_owned();
        }
    }
    result
}
