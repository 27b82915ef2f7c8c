//! Settings loaded from `logtrace.toml`.
//!
//! ```toml
//! [search]
//! max_files = 5000
//! max_file_size = 1048576
//! extensions = ["rs", "py", "ts"]
//! skip_dirs = ["target", "node_modules"]
//!
//! [search.weights]
//! exact = 30
//!
//! [context]
//! cap = 15
//!
//! [callers]
//! snippet_radius = 1
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const CONFIG_FILE: &str = "logtrace.toml";

pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "mjs", "cjs", "go", "java", "kt", "kts", "scala", "c",
    "h", "cc", "cpp", "cxx", "hpp", "hh", "cs", "rb", "php", "swift", "m", "mm", "ex", "exs",
    "erl", "hs", "lua", "sh", "dart", "zig",
];

pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    "dist",
    "build",
    "out",
    "vendor",
    "third_party",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".next",
    ".nuxt",
    ".gradle",
    ".idea",
    ".vscode",
    "coverage",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub context: ContextSettings,
    pub callers: CallerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Files beyond this count (in traversal order) are not scanned.
    pub max_files: usize,
    /// Bytes; larger files are skipped.
    pub max_file_size: u64,
    pub extensions: Vec<String>,
    pub skip_dirs: Vec<String>,
    /// Candidates scoring below this are discarded.
    pub min_score: u32,
    /// Search strings shorter than this (in chars) are not scanned for.
    pub min_search_len: usize,
    pub weights: ScoreWeights,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_files: 5000,
            max_file_size: 1024 * 1024,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect(),
            min_score: 1,
            min_search_len: 3,
            weights: ScoreWeights::default(),
        }
    }
}

/// Line-scoring weights. Heuristic; tune per corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub base: u32,
    pub exact: u32,
    pub declaration: u32,
    pub logging: u32,
    pub import_penalty: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            base: 10,
            exact: 30,
            declaration: 20,
            logging: 15,
            import_penalty: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Maximum log lines handed to the ranking oracle.
    pub cap: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self { cap: 15 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallerSettings {
    /// Lines of context on each side of a caller snippet.
    pub snippet_radius: usize,
    /// Depth bound when re-attaching cached descendants.
    pub max_hydrate_depth: usize,
    /// How long to wait on another thread's in-flight expansion.
    pub inflight_wait_ms: u64,
}

impl Default for CallerSettings {
    fn default() -> Self {
        Self {
            snippet_radius: 1,
            max_hydrate_depth: 32,
            inflight_wait_ms: 30_000,
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load `explicit` if given, else `<repo>/logtrace.toml` when present,
    /// else defaults.
    pub fn load(explicit: Option<&Path>, repo: Option<&Path>) -> Result<Self> {
        let path = match (explicit, repo) {
            (Some(p), _) => p.to_path_buf(),
            (None, Some(r)) if r.join(CONFIG_FILE).is_file() => r.join(CONFIG_FILE),
            _ => return Ok(Self::default()),
        };
        debug!(path = %path.display(), "loading settings");
        Self::from_toml(&fs::read_to_string(&path)?)
    }
}
