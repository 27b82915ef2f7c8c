use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

// CSI sequences (colors, cursor moves) and OSC sequences (hyperlinks, titles).
static ANSI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("ansi pattern")
});

/// Remove terminal escape sequences; borrows when there is nothing to strip.
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    if !line.contains('\x1b') {
        return Cow::Borrowed(line);
    }
    ANSI_RE.replace_all(line, "")
}
