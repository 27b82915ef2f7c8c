//! Search-string preparation: message cleaning and lexical variants.

use crate::log::formats::TIMESTAMP_PATTERN;
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_TS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(TIMESTAMP_PATTERN).expect("iso timestamp pattern"));

static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}:\d{2}:\d{2}(?:[.,]\d+)?\b").expect("clock pattern"));

// Bracketed tags in any case; bare tags only when upper-case so that words
// like "error" inside a sentence survive.
static LEVEL_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i:\[(?:TRACE|DEBUG|INFO|WARN|WARNING|ERROR|FATAL|CRITICAL)\]:?)|\b(?:TRACE|DEBUG|INFO|WARN|WARNING|ERROR|FATAL|CRITICAL)\b:?",
    )
    .expect("level tag pattern")
});

static MODULE_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_]\w*(?:::[A-Za-z_]\w*)+:\s*").expect("module prefix pattern"));

static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Strip level tags, ISO timestamps, `HH:MM:SS` clocks and a leading
/// `crate::module: ` target from a message.
pub fn clean_message(message: &str) -> String {
    let s = ISO_TS_RE.replace_all(message, " ");
    let s = CLOCK_RE.replace_all(&s, " ");
    let s = LEVEL_TAG_RE.replace_all(&s, " ");
    let s = SPACES_RE.replace_all(s.trim(), " ");
    MODULE_PREFIX_RE.replace(&s, "").trim().to_string()
}

/// Word-dropping variants of a search string, in retry order: without the
/// first word, the last word, the first two, the last two, and both ends.
/// Each is produced only when words remain; duplicates and the original
/// string are skipped.
pub fn variants(search: &str) -> Vec<String> {
    let words: Vec<&str> = search.split_whitespace().collect();
    let n = words.len();
    let mut out: Vec<String> = Vec::new();

    let mut push = |slice: &[&str]| {
        if slice.is_empty() {
            return;
        }
        let v = slice.join(" ");
        if v != search.trim() && !out.contains(&v) {
            out.push(v);
        }
    };

    if n >= 2 {
        push(&words[1..]);
        push(&words[..n - 1]);
    }
    if n >= 3 {
        push(&words[2..]);
        push(&words[..n - 2]);
        push(&words[1..n - 1]);
    }
    out
}
