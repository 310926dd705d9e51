//! Text cleanup applied to model responses.

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n?").expect("fence pattern compiles")
});
static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?[ \t]*```\s*$").expect("fence pattern compiles"));

/// Remove a leading and/or trailing fenced-code delimiter (```` ```html ````,
/// ```` ``` ````) that models wrap around otherwise raw output.
pub fn strip_code_fences(text: &str) -> String {
    let without_leading = LEADING_FENCE.replace(text, "");
    let without_trailing = TRAILING_FENCE.replace(&without_leading, "");
    without_trailing.trim().to_string()
}

const DOCTYPE_PREFIX: &str = "<!doctype html";

/// Superficial check that the document opens with an HTML5 doctype.
pub fn has_doctype(markup: &str) -> bool {
    markup
        .trim_start()
        .get(..DOCTYPE_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(DOCTYPE_PREFIX))
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
