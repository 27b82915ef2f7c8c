use crate::cancel::CancellationToken;
use crate::config::SearchSettings;
use crate::error::{Result, TraceError};
use crate::log::formats::ROOT_SPAN;
use crate::log::{LogRecord, SourceLocation};
use crate::resolve::discovery::discover_source_files;
use crate::resolve::hints::{embedded_locations, translate_path};
use crate::resolve::score::{MatchCandidate, rank_candidates, score_line};
use crate::resolve::text::{clean_message, variants};
use globset::{GlobBuilder, GlobMatcher};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, trace};

/// Which resolver stage produced a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cache,
    Hint,
    StaticString,
    Variant,
    CleanedMessage,
    Filename,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: PathBuf,
    /// 0-based.
    pub line: usize,
    /// Match score for content stages; 0 for cache, hints and filenames.
    pub score: u32,
    pub stage: Stage,
}

impl Location {
    /// Filename matches point at line 0 of a plausible file, nothing more.
    pub fn is_low_confidence(&self) -> bool {
        self.stage == Stage::Filename
    }

    pub fn to_source_location(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Found(Location),
    NotFound,
    Cancelled,
}

impl Resolution {
    pub fn location(&self) -> Option<&Location> {
        match self {
            Resolution::Found(loc) => Some(loc),
            _ => None,
        }
    }
}

/// Maps log records onto `(file, line)` pairs inside one repository.
///
/// The discovered file list is computed on first use and reused until
/// [`SourceResolver::invalidate_files`]; `scan_count` counts content scans so
/// callers can observe cache effectiveness.
pub struct SourceResolver {
    root: PathBuf,
    settings: SearchSettings,
    files: Mutex<Option<Arc<Vec<PathBuf>>>>,
    scans: AtomicUsize,
}

impl SourceResolver {
    pub fn new(root: impl Into<PathBuf>, settings: SearchSettings) -> Self {
        Self {
            root: root.into(),
            settings,
            files: Mutex::new(None),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn files(&self) -> Result<Arc<Vec<PathBuf>>> {
        let mut guard = self.files.lock();
        if let Some(files) = guard.as_ref() {
            return Ok(Arc::clone(files));
        }
        let found = discover_source_files(&self.root, &self.settings)?;
        let files = Arc::new(found.files);
        *guard = Some(Arc::clone(&files));
        Ok(files)
    }

    pub fn invalidate_files(&self) {
        *self.files.lock() = None;
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    /// Scan every discovered file for `needle`. Ranked best first; empty
    /// when the needle is shorter than `min_search_len`.
    pub fn search(&self, needle: &str, cancel: &CancellationToken) -> Result<Vec<MatchCandidate>> {
        let needle = needle.trim();
        if needle.chars().count() < self.settings.min_search_len {
            trace!(needle, "search string too short");
            return Ok(Vec::new());
        }
        let files = self.files()?;
        self.scans.fetch_add(1, Ordering::Relaxed);

        let needle_lower = needle.to_lowercase();
        let weights = self.settings.weights;
        let min_score = self.settings.min_score.max(1);

        let mut found: Vec<MatchCandidate> = files
            .par_iter()
            .enumerate()
            .flat_map_iter(|(file_index, file)| {
                let mut hits = Vec::new();
                if cancel.is_cancelled() {
                    return hits;
                }
                // Non-UTF-8 and vanished files are skipped.
                let Ok(text) = fs::read_to_string(file) else {
                    return hits;
                };
                for (line, content) in text.lines().enumerate() {
                    let score = score_line(content, needle, &needle_lower, &weights);
                    if score >= min_score {
                        hits.push(MatchCandidate {
                            file_index,
                            file: file.clone(),
                            line,
                            score,
                        });
                    }
                }
                hits
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(TraceError::Cancelled);
        }
        rank_candidates(&mut found);
        debug!(needle, matches = found.len(), "scanned repository");
        Ok(found)
    }

    /// Run the resolution stages for `record` without touching its caches.
    pub fn resolve(&self, record: &LogRecord, cancel: &CancellationToken) -> Result<Resolution> {
        match self.run_stages(record, cancel) {
            Ok(Some(location)) => {
                info!(
                    file = %location.file.display(),
                    line = location.line,
                    stage = ?location.stage,
                    "resolved record"
                );
                Ok(Resolution::Found(location))
            }
            Ok(None) => {
                debug!(message = %record.message, "no source location found");
                Ok(Resolution::NotFound)
            }
            Err(TraceError::Cancelled) => {
                debug!("resolution cancelled");
                Ok(Resolution::Cancelled)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve and store a found location in the record's cache.
    pub fn locate(&self, record: &mut LogRecord, cancel: &CancellationToken) -> Result<Resolution> {
        let resolution = self.resolve(record, cancel)?;
        if let Resolution::Found(loc) = &resolution {
            record.source_location_cache = Some(loc.to_source_location());
        }
        Ok(resolution)
    }

    fn run_stages(&self, record: &LogRecord, cancel: &CancellationToken) -> Result<Option<Location>> {
        if let Some(loc) = self.from_cache(record) {
            return Ok(Some(loc));
        }
        if let Some(loc) = self.from_hints(record) {
            return Ok(Some(loc));
        }

        let static_string = record
            .oracle_analysis
            .as_ref()
            .map(|a| a.static_search_string.trim())
            .filter(|s| !s.is_empty());

        if let Some(search) = static_string {
            if let Some(loc) = self.best_match(search, Stage::StaticString, cancel)? {
                return Ok(Some(loc));
            }
            for variant in variants(search) {
                if let Some(loc) = self.best_match(&variant, Stage::Variant, cancel)? {
                    return Ok(Some(loc));
                }
            }
        }

        let cleaned = clean_message(&record.message);
        if !cleaned.is_empty() && Some(cleaned.as_str()) != static_string {
            if let Some(loc) = self.best_match(&cleaned, Stage::CleanedMessage, cancel)? {
                return Ok(Some(loc));
            }
        }

        if cancel.is_cancelled() {
            return Err(TraceError::Cancelled);
        }
        self.from_filename(record)
    }

    fn from_cache(&self, record: &LogRecord) -> Option<Location> {
        let cached = record.source_location_cache.as_ref()?;
        match translate_path(&self.root, &cached.file) {
            Some(file) => {
                trace!(file = %file.display(), "location cache hit");
                Some(Location {
                    file,
                    line: cached.line,
                    score: 0,
                    stage: Stage::Cache,
                })
            }
            None => {
                debug!(file = %cached.file.display(), "cached location is stale");
                None
            }
        }
    }

    fn from_hints(&self, record: &LogRecord) -> Option<Location> {
        embedded_locations(&record.message)
            .into_iter()
            .find_map(|(path, line)| {
                translate_path(&self.root, Path::new(&path)).map(|file| Location {
                    file,
                    line,
                    score: 0,
                    stage: Stage::Hint,
                })
            })
    }

    fn best_match(&self, search: &str, stage: Stage, cancel: &CancellationToken) -> Result<Option<Location>> {
        let found = self.search(search, cancel)?;
        Ok(found.into_iter().next().map(|m| Location {
            file: m.file,
            line: m.line,
            score: m.score,
            stage,
        }))
    }

    fn from_filename(&self, record: &LogRecord) -> Result<Option<Location>> {
        let stems = filename_stems(record, self.settings.min_search_len);
        if stems.is_empty() {
            return Ok(None);
        }
        let files = self.files()?;

        let exact: Vec<GlobMatcher> = stems.iter().filter_map(|s| glob(&format!("**/{}.*", s))).collect();
        let contains: Vec<GlobMatcher> = stems.iter().filter_map(|s| glob(&format!("**/*{}*", s))).collect();

        for matchers in [&exact, &contains] {
            for matcher in matchers {
                let hit = files.iter().find(|f| {
                    f.strip_prefix(&self.root)
                        .map(|rel| matcher.is_match(rel))
                        .unwrap_or(false)
                });
                if let Some(file) = hit {
                    debug!(pattern = matcher.glob().glob(), file = %file.display(), "filename heuristic hit");
                    return Ok(Some(Location {
                        file: file.clone(),
                        line: 0,
                        score: 0,
                        stage: Stage::Filename,
                    }));
                }
            }
        }
        Ok(None)
    }
}

fn glob(pattern: &str) -> Option<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .case_insensitive(true)
        .build()
        .ok()
        .map(|g| g.compile_matcher())
}

/// File-name stems derived from a record's target (or named root span):
/// the whole name normalized, then its last path segment.
fn filename_stems(record: &LogRecord, min_len: usize) -> Vec<String> {
    let source = record
        .target
        .clone()
        .or_else(|| (record.span_root.name != ROOT_SPAN).then(|| record.span_root.name.clone()));
    let Some(source) = source else {
        return Vec::new();
    };

    let mut stems = Vec::new();
    let full = normalize_name(&source);
    let last = full.rsplit('_').next().unwrap_or("").to_string();
    let tail = source
        .rsplit(|c| matches!(c, ':' | '/' | '\\' | '.'))
        .next()
        .map(normalize_name)
        .unwrap_or_default();

    for stem in [full, tail, last] {
        if stem.chars().count() >= min_len.max(1) && !stems.contains(&stem) {
            stems.push(stem);
        }
    }
    stems
}

fn normalize_name(name: &str) -> String {
    let mapped: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    mapped
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
