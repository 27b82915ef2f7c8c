//! Explicit code locations mentioned inside log text, and mapping of
//! foreign paths (container paths, CI paths, bare file names) onto the
//! local repository.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

// Python traceback frames: File "/app/orders.py", line 42, in place
static PY_FRAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"File "(?P<path>[^"]+)", line (?P<line>\d+)"#).expect("frame pattern"));

// path/to/file.ext:42 (optionally :col), as printed by panics, stack traces
// and compilers.
static PATH_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<path>(?:[A-Za-z]:)?[\w./\\-]*[\w-]\.[A-Za-z][A-Za-z0-9]{0,5}):(?P<line>\d+)")
        .expect("path:line pattern")
});

/// `(path, 0-based line)` pairs found in `text`, frames first.
pub fn embedded_locations(text: &str) -> Vec<(String, usize)> {
    let mut out = Vec::new();
    for re in [&*PY_FRAME_RE, &*PATH_LINE_RE] {
        for caps in re.captures_iter(text) {
            let (Some(path), Some(line)) = (caps.name("path"), caps.name("line")) else {
                continue;
            };
            let Ok(line) = line.as_str().parse::<usize>() else {
                continue;
            };
            let hit = (path.as_str().to_string(), line.saturating_sub(1));
            if !out.contains(&hit) {
                out.push(hit);
            }
        }
    }
    out
}

/// Local paths `candidate` may refer to, in preference order: itself when
/// absolute, relative to `root`, and its file name directly under `root`.
pub fn translation_candidates(root: &Path, candidate: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if candidate.is_absolute() {
        out.push(candidate.to_path_buf());
    }
    let relative = candidate.strip_prefix("/").unwrap_or(candidate);
    let relative = relative.strip_prefix("./").unwrap_or(relative);
    out.push(root.join(relative));
    if let Some(name) = candidate.file_name() {
        out.push(root.join(name));
    }
    out.dedup();
    out
}

/// First translation candidate that exists as a file.
pub fn translate_path(root: &Path, candidate: &Path) -> Option<PathBuf> {
    translation_candidates(root, candidate)
        .into_iter()
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn finds_frames_and_path_lines() {
        let text = r#"Traceback: File "/app/orders.py", line 42, in place; panicked at src/main.rs:7:5"#;
        assert_eq!(
            embedded_locations(text),
            vec![
                ("/app/orders.py".to_string(), 41),
                ("src/main.rs".to_string(), 6),
            ]
        );
    }

    #[test]
    fn times_are_not_locations() {
        assert!(embedded_locations("started at 10:04:05 after 3.5s").is_empty());
    }

    #[test]
    fn translation_prefers_repo_relative_then_basename() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("orders.py"), "x = 1").unwrap();

        assert_eq!(
            translate_path(dir.path(), Path::new("src/main.rs")),
            Some(dir.path().join("src/main.rs"))
        );
        assert_eq!(
            translate_path(dir.path(), Path::new("/app/orders.py")),
            Some(dir.path().join("orders.py"))
        );
        assert_eq!(translate_path(dir.path(), Path::new("gone.rs")), None);
    }
}
