use crate::callers::CallerNode;
use crate::oracle::MessageAnalysis;
use crate::span::SpanNode;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

/// Index of a record inside the loaded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RecordId(pub usize);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "ERROR" | "ERR" | "FATAL" | "CRITICAL" => Ok(Level::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Resolved (or hinted) source position of a record. `line` is 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
    pub last_updated: SystemTime,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
            last_updated: SystemTime::now(),
        }
    }
}

/// One normalized log line.
///
/// `raw_text` is the line exactly as read, ANSI bytes included. Everything
/// below `span_root` is cache state filled in by the resolver and the caller
/// graph; it is dropped wholesale when the batch is reloaded.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: Level,
    pub message: String,
    pub target: Option<String>,
    pub span_root: SpanNode,
    pub raw_text: String,

    pub source_location_cache: Option<SourceLocation>,
    pub caller_cache: Option<CallerNode>,
    pub oracle_analysis: Option<MessageAnalysis>,
}

impl LogRecord {
    /// Grouping key: the span path for records with real scopes, else the
    /// target (or the synthetic root name).
    pub fn group_key(&self) -> String {
        if self.span_root.child.is_some() || !self.span_root.fields.is_empty() {
            self.span_root.path()
        } else {
            self.target
                .clone()
                .unwrap_or_else(|| self.span_root.name.clone())
        }
    }
}
