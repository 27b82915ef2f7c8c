//! Scanners for the span-chain prefix of a formatted log line.
//!
//! ```text
//! event_loop:startup:release_tag{tag=1 name="a b" v=[1, 2]}: target: message
//! \________/ \_____/ \_________/\_______________________/
//!   segment  segment   segment          field list
//! ```
//!
//! Field values may hold quoted strings and bracketed debug output, so the
//! field list is split on whitespace only at nesting depth zero.

pub type Fields = Vec<(String, String)>;

/// One `name` or `name{fields}` segment of a span chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub fields: Fields,
}

/// Scan a span chain off the front of `rest`.
///
/// Returns the segments and the remainder after the terminating `": "`.
/// `None` when `rest` does not start with a well-formed chain; a `::` is
/// never a chain separator, so module paths are rejected here.
pub fn scan_span_chain(rest: &str) -> Option<(Vec<Segment>, &str)> {
    let bytes = rest.as_bytes();
    let mut pos = 0usize;
    let mut segments = Vec::new();

    loop {
        let name_start = pos;
        while pos < bytes.len() && is_name_byte(bytes[pos], pos == name_start) {
            pos += 1;
        }
        if pos == name_start {
            return None;
        }
        let name = &rest[name_start..pos];

        let mut fields = Fields::new();
        if pos < bytes.len() && bytes[pos] == b'{' {
            let close = find_closing_brace(rest, pos)?;
            fields = split_fields(&rest[pos + 1..close]);
            pos = close + 1;
        }
        segments.push(Segment {
            name: name.to_string(),
            fields,
        });

        if pos >= bytes.len() || bytes[pos] != b':' {
            return None;
        }
        match bytes.get(pos + 1) {
            // End of chain.
            None => return Some((segments, "")),
            Some(b) if b.is_ascii_whitespace() => {
                return Some((segments, rest[pos + 1..].trim_start()));
            }
            // `a::b` is a module path, not two spans.
            Some(b':') => return None,
            Some(_) => pos += 1,
        }
    }
}

fn is_name_byte(b: u8, first: bool) -> bool {
    if first {
        b.is_ascii_alphabetic() || b == b'_'
    } else {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')
    }
}

/// Byte index of the `}` matching the `{` at `open`.
fn find_closing_brace(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;

    for (i, ch) in s[open..].char_indices() {
        if in_quote {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_quote = true,
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return if ch == '}' { Some(open + i) } else { None };
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a field list on whitespace outside quotes and brackets.
pub fn split_field_tokens(body: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    let mut start: Option<usize> = None;

    for (i, ch) in body.char_indices() {
        if in_quote {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match ch {
            c if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    tokens.push(&body[s..i]);
                }
                continue;
            }
            '"' => in_quote = true,
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&body[s..]);
    }
    tokens
}

/// Parse `key=value` tokens. Quoted values lose their surrounding quotes;
/// unquoted values are kept verbatim, embedded `=` included. A bare token
/// becomes a key with an empty value.
pub fn split_fields(body: &str) -> Fields {
    split_field_tokens(body)
        .into_iter()
        .map(|tok| match tok.split_once('=') {
            Some((k, v)) => (k.to_string(), unquote(v).to_string()),
            None => (tok.to_string(), String::new()),
        })
        .collect()
}

fn unquote(v: &str) -> &str {
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        &v[1..v.len() - 1]
    } else {
        v
    }
}
