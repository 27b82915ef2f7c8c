//! Language-agnostic classification of single source lines.
//!
//! These are regex heuristics, not a parser: they recognise the common
//! declaration, logging and import shapes across Rust, Python, JS/TS, Go,
//! the JVM and C-family languages.

use once_cell::sync::Lazy;
use regex::Regex;

static DECLARATION_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Rust
        r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe|extern(?:\s+"[^"]*")?)\s+)*fn\s+(?P<name>\w+)"#,
        // Python, Ruby, Elixir, Kotlin, Swift, Go
        r"^\s*(?:(?:public|private|protected|internal|override|open|static|suspend|inline|async)\s+)*(?:def|defp|fun|func)\s+(?:\([^)]*\)\s*)?(?:self\.)?(?P<name>\w+[?!]?)",
        // JS/TS function declarations
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>\w+)",
        // JS/TS arrow functions bound to a name
        r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>\w+)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|\w+\s*=>)",
        // JVM / C# / C++ methods with modifiers
        r"^\s*(?:(?:public|private|protected|static|final|abstract|synchronized|virtual|override|async|internal|sealed|extern|inline)\s+)+[\w<>\[\],.?*&:\s]*?\b(?P<name>\w+)\s*\([^;]*$",
        // Method shorthand: `name(args) {`
        r"^\s*(?:async\s+)?(?P<name>[A-Za-z_]\w*)\s*\([^()]*\)\s*(?::\s*[\w<>\[\]|. ]+)?\s*\{\s*$",
        // C-family typed functions: `int name(args) {`
        r"^\s*(?P<ret>(?:[\w:<>*&]+\s+)+)\*?(?P<name>[A-Za-z_]\w*)\s*\([^;]*\)\s*(?:const\s*)?\{?\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("declaration pattern"))
    .collect()
});

const NOT_A_NAME: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "else", "match", "new", "throw", "await",
    "yield", "case", "delete", "typeof", "sizeof", "do", "try", "with", "elif", "when", "loop",
];

static LOGGING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\b(?:log|logger|logging|console|tracing|slog|logrus|zap|timber|system\.out|system\.err)\s*(?:\.|::|->)\s*\w+|\b(?:print|println|eprintln|eprint|printf|fprintf|puts|info|debug|warn|warning|error|trace|fatal|critical|panic|bail|unreachable)!?\s*\(|\b(?:throw|raise)\b)",
    )
    .expect("logging pattern")
});

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:pub\s+)?(?:use\s+[\w:{]|import\s|from\s+\S+\s+import\b|#\s*include\b|extern\s+crate\b|using\s+[\w.]+\s*;|(?:const|let|var)\s+.*=\s*require\s*\(|require(?:_relative)?[\s(])",
    )
    .expect("import pattern")
});

/// Name declared on `line`, if it looks like a function or method header.
pub fn declaration_name(line: &str) -> Option<String> {
    for re in DECLARATION_RES.iter() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let Some(name) = caps.name("name") else {
            continue;
        };
        if NOT_A_NAME.contains(&name.as_str()) {
            continue;
        }
        // `return foo(x)` and friends look like typed declarations.
        if let Some(ret) = caps.name("ret") {
            let first = ret.as_str().split_whitespace().next().unwrap_or("");
            if NOT_A_NAME.contains(&first) {
                continue;
            }
        }
        return Some(name.as_str().to_string());
    }
    None
}

pub fn is_declaration(line: &str) -> bool {
    declaration_name(line).is_some()
}

pub fn is_logging(line: &str) -> bool {
    LOGGING_RE.is_match(line)
}

pub fn is_import(line: &str) -> bool {
    IMPORT_RE.is_match(line)
}

/// Drop a trailing `//` comment, or a `# ` comment, that sits outside a
/// double-quoted or backtick string.
pub fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'`' => quote = Some(b),
            b'/' if bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            b'#' if matches!(bytes.get(i + 1), None | Some(b' ') | Some(b'#'))
                && (i == 0 || bytes[i - 1].is_ascii_whitespace()) =>
            {
                return &line[..i];
            }
            _ => {}
        }
    }
    line
}
