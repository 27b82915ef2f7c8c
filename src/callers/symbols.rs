//! Symbol/reference lookups for caller discovery.
//!
//! A [`SymbolProvider`] is an external collaborator (a language server, an
//! index). When it has no answer the caller graph falls back to the text
//! scans in this module: brace/indent scanning for the enclosing function
//! and word-boundary search for references.

use crate::error::Result;
use crate::resolve::SourceResolver;
use crate::resolve::classify::{declaration_name, is_import, strip_line_comment};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upper bound on references collected by the text fallback.
pub const MAX_REFERENCES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    /// 0-based.
    pub line: usize,
    /// 0-based byte column.
    pub character: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SymbolRange {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub range: SymbolRange,
}

impl Symbol {
    pub fn position(&self) -> Position {
        Position {
            line: self.range.start_line,
            character: self.range.start_col,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceLocation {
    pub file: PathBuf,
    /// 0-based.
    pub line: usize,
}

/// `None` from either method means "no answer", not "nothing there".
pub trait SymbolProvider: Send + Sync {
    fn enclosing_symbol(&self, file: &Path, line: usize) -> Option<Symbol>;

    fn find_references(&self, file: &Path, position: Position) -> Option<Vec<ReferenceLocation>>;
}

/// Provider with no answers; everything goes through the text fallbacks.
pub struct NoSymbols;

impl SymbolProvider for NoSymbols {
    fn enclosing_symbol(&self, _file: &Path, _line: usize) -> Option<Symbol> {
        None
    }

    fn find_references(&self, _file: &Path, _position: Position) -> Option<Vec<ReferenceLocation>> {
        None
    }
}

/// Text-scanning provider over the resolver's discovered files.
pub struct TextSymbols {
    resolver: Arc<SourceResolver>,
}

impl TextSymbols {
    pub fn new(resolver: Arc<SourceResolver>) -> Self {
        Self { resolver }
    }
}

impl SymbolProvider for TextSymbols {
    fn enclosing_symbol(&self, file: &Path, line: usize) -> Option<Symbol> {
        let text = fs::read_to_string(file).ok()?;
        enclosing_in_text(&text, line)
    }

    fn find_references(&self, file: &Path, position: Position) -> Option<Vec<ReferenceLocation>> {
        let text = fs::read_to_string(file).ok()?;
        let line = text.lines().nth(position.line)?;
        let name = identifier_at(line, position.character)?;
        let files = self.resolver.files().ok()?;
        Some(references_in_files(&files, name))
    }
}

/// The function or method enclosing `line`: the line itself when it is a
/// declaration, else the nearest declaration above whose block is still
/// open at `line`.
pub fn enclosing_in_text(text: &str, line: usize) -> Option<Symbol> {
    let lines: Vec<&str> = text.lines().collect();
    let target = *lines.get(line)?;

    if let Some(name) = declaration_name(target) {
        return Some(symbol_at(&lines, line, name));
    }

    let target_indent = indent_of(target);
    let mut pending_close = 0usize;
    for i in (0..line).rev() {
        let code = strip_line_comment(lines[i]);
        let before = pending_close;
        let mut closes = false;
        let mut opens = false;
        for c in code.chars().rev() {
            match c {
                '}' => {
                    pending_close += 1;
                    closes = true;
                }
                '{' if pending_close > 0 => pending_close -= 1,
                '{' => opens = true,
                _ => {}
            }
        }
        if before > 0 || closes || pending_close > 0 {
            continue;
        }
        let Some(name) = declaration_name(code) else {
            continue;
        };
        // Brace-less headers (Python, multi-line signatures) only enclose
        // lines indented deeper than themselves.
        if opens || indent_of(code) < target_indent {
            return Some(symbol_at(&lines, i, name));
        }
    }
    None
}

fn symbol_at(lines: &[&str], start: usize, name: String) -> Symbol {
    let start_col = lines[start].find(name.as_str()).unwrap_or(0);
    Symbol {
        range: SymbolRange {
            start_line: start,
            start_col,
            end_line: block_end(lines, start),
        },
        name,
    }
}

/// Last line of the block opened at `start`: matching brace, or the last
/// line indented deeper than the header.
fn block_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i64;
    let mut seen_open = false;
    for (i, l) in lines.iter().enumerate().skip(start) {
        for c in strip_line_comment(l).chars() {
            match c {
                '{' => {
                    depth += 1;
                    seen_open = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if seen_open && depth <= 0 {
            return i;
        }
        // Header ends with `:` and no brace: indentation block.
        if !seen_open && l.trim_end().ends_with(':') {
            let indent = indent_of(lines[start]);
            let mut end = i;
            for (j, body) in lines.iter().enumerate().skip(i + 1) {
                if body.trim().is_empty() {
                    continue;
                }
                if indent_of(body) <= indent {
                    break;
                }
                end = j;
            }
            return end;
        }
    }
    start
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Identifier covering byte column `character`, if any.
pub fn identifier_at(line: &str, character: usize) -> Option<&str> {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    let at = character.min(line.len());
    if !line.is_char_boundary(at) {
        return None;
    }
    let start = line[..at]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_ident(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(at);
    let end = line[at..]
        .char_indices()
        .find(|(_, c)| !is_ident(*c))
        .map(|(i, _)| at + i)
        .unwrap_or(line.len());
    (start < end).then(|| &line[start..end])
}

/// Word-boundary occurrences of `name` outside comments and import lines,
/// in file order, capped at [`MAX_REFERENCES`].
pub fn references_in_files(files: &[PathBuf], name: &str) -> Vec<ReferenceLocation> {
    let Ok(re) = Regex::new(&format!(r"\b{}\b", regex::escape(name))) else {
        return Vec::new();
    };
    let mut found: Vec<ReferenceLocation> = files
        .par_iter()
        .flat_map_iter(|file| {
            let text = fs::read_to_string(file).unwrap_or_default();
            text.lines()
                .enumerate()
                .filter(|(_, l)| re.is_match(strip_line_comment(l)) && !is_import(l))
                .map(|(line, _)| ReferenceLocation {
                    file: file.clone(),
                    line,
                })
                .collect::<Vec<_>>()
        })
        .collect();
    found.truncate(MAX_REFERENCES);
    found
}

/// `(line, text)` pairs within `radius` of `line`, clipped to the text.
pub fn window_in_text(text: &str, line: usize, radius: usize) -> Vec<(usize, String)> {
    let first = line.saturating_sub(radius);
    text.lines()
        .enumerate()
        .skip(first)
        .take(line + radius + 1 - first)
        .map(|(i, l)| (i, l.to_string()))
        .collect()
}

pub fn code_window(file: &Path, line: usize, radius: usize) -> Result<Vec<(usize, String)>> {
    let text = fs::read_to_string(file)?;
    Ok(window_in_text(&text, line, radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RUST: &str = "\
fn helper() {
    let a = 1;
}

pub fn place_order(id: u32) {
    if id > 0 {
        log::info!(\"placing\");
    }
    helper();
}
";

    #[test]
    fn enclosing_function_in_braced_code() {
        let sym = enclosing_in_text(RUST, 6).unwrap();
        assert_eq!(sym.name, "place_order");
        assert_eq!(sym.range.start_line, 4);
        assert_eq!(sym.range.end_line, 9);
        assert_eq!(sym.range.start_col, 7);
    }

    #[test]
    fn sibling_functions_are_skipped() {
        let sym = enclosing_in_text(RUST, 8).unwrap();
        assert_eq!(sym.name, "place_order");
        assert!(enclosing_in_text(RUST, 3).is_none());
    }

    #[test]
    fn declaration_line_is_its_own_symbol() {
        assert_eq!(enclosing_in_text(RUST, 0).unwrap().name, "helper");
    }

    #[test]
    fn enclosing_function_in_python() {
        let py = "def a():\n    return 1\n\ndef b(x):\n    y = x\n    print(y)\n\nz = 2\n";
        let sym = enclosing_in_text(py, 5).unwrap();
        assert_eq!(sym.name, "b");
        assert_eq!(sym.range.end_line, 5);
        assert!(enclosing_in_text(py, 7).is_none());
    }

    #[test]
    fn identifier_under_cursor() {
        assert_eq!(identifier_at("pub fn place_order(id)", 9), Some("place_order"));
        assert_eq!(identifier_at("pub fn place_order(id)", 7), Some("place_order"));
        assert_eq!(identifier_at("a + b", 2), None);
    }

    #[test]
    fn windows_clip_to_text() {
        assert_eq!(
            window_in_text("a\nb\nc", 0, 1),
            vec![(0, "a".to_string()), (1, "b".to_string())]
        );
        assert_eq!(window_in_text("a\nb\nc", 2, 1).len(), 2);
    }

    #[test]
    fn references_skip_comments_and_imports() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.rs");
        let b = dir.path().join("b.rs");
        fs::write(&a, "use crate::helper;\nfn x() { helper(); }\n// helper here\n").unwrap();
        fs::write(&b, "fn helper_two() {}\nfn y() { helper() }\n").unwrap();

        let refs = references_in_files(&[a.clone(), b.clone()], "helper");
        assert_eq!(
            refs,
            vec![
                ReferenceLocation { file: a, line: 1 },
                ReferenceLocation { file: b, line: 1 },
            ]
        );
    }
}
