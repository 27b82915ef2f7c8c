//! Source file discovery for repository scans.
//!
//! Walks the repository with the `ignore` crate so `.gitignore` is honoured,
//! prunes the fixed skip-list of build and dependency directories, keeps only
//! allow-listed source extensions and drops oversized files. Traversal is
//! sorted by file name, so truncation at `max_files` always keeps the same
//! prefix of the tree.

use crate::config::SearchSettings;
use crate::error::Result;
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    /// More files existed than `max_files` allowed.
    pub truncated: bool,
}

pub fn discover_source_files(root: &Path, settings: &SearchSettings) -> Result<Discovery> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("repository root is not a directory: {}", root.display()),
        )
        .into());
    }

    let skip: HashSet<String> = settings.skip_dirs.iter().cloned().collect();
    let extensions: HashSet<String> = settings
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && entry.depth() > 0 && skip.contains(entry.file_name().to_string_lossy().as_ref()))
        })
        .build();

    let mut out = Discovery::default();
    for entry in walker {
        // Unreadable entries (permissions, broken links) are skipped.
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if !has_allowed_extension(path, &extensions) {
            continue;
        }
        let too_big = entry
            .metadata()
            .map(|m| m.len() > settings.max_file_size)
            .unwrap_or(true);
        if too_big {
            debug!(path = %path.display(), "skipping oversized or unreadable file");
            continue;
        }
        if out.files.len() >= settings.max_files {
            out.truncated = true;
            break;
        }
        out.files.push(path.to_path_buf());
    }

    if out.truncated {
        warn!(
            max_files = settings.max_files,
            root = %root.display(),
            "repository scan truncated"
        );
    }
    debug!(files = out.files.len(), "discovered source files");
    Ok(out)
}

fn has_allowed_extension(path: &Path, extensions: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(&e.to_ascii_lowercase()))
        .unwrap_or(false)
}
