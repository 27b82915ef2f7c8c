use crate::error::{Result, TraceError};
use crate::log::ansi::strip_ansi;
use crate::log::formats::{
    JsonFormat, LogFormat, ParsedLine, ROOT_SPAN, SimpleFormat, SpanChainFormat, TIMESTAMP_PATTERN,
};
use crate::log::record::{Level, LogRecord, SourceLocation};
use crate::span::SpanNode;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

static EMBEDDED_TS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(TIMESTAMP_PATTERN).expect("timestamp pattern"));

/// Ordered chain of line grammars. The first grammar that accepts a line
/// wins; a line no grammar accepts becomes an INFO fallback record.
pub struct LogParser {
    formats: Vec<Box<dyn LogFormat>>,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    /// JSON, then span-chain, then simple.
    pub fn new() -> Self {
        Self {
            formats: vec![
                Box::new(JsonFormat),
                Box::new(SpanChainFormat),
                Box::new(SimpleFormat),
            ],
        }
    }

    /// A parser with no grammars: every line takes the fallback path.
    pub fn empty() -> Self {
        Self { formats: vec![] }
    }

    /// Append a grammar at the lowest priority.
    pub fn with_format(mut self, format: Box<dyn LogFormat>) -> Self {
        self.formats.push(format);
        self
    }

    /// Parse one raw line. Blank lines yield `None`; anything else yields a
    /// record, falling back to an INFO record holding the cleaned line.
    pub fn parse_line(&self, raw: &str) -> Option<LogRecord> {
        let clean = strip_ansi(raw);
        let clean = clean.trim_end_matches(['\r', '\n']);
        if clean.trim().is_empty() {
            return None;
        }

        for format in &self.formats {
            if let Some(parsed) = format.parse(clean) {
                trace!(format = format.name(), "line accepted");
                return Some(into_record(parsed, raw));
            }
        }

        trace!(line = clean, "no grammar matched; using fallback record");
        Some(fallback_record(clean, raw))
    }

    /// Parse a whole batch. Fails only when no line produced a record.
    pub fn parse_batch(&self, text: &str) -> Result<Vec<LogRecord>> {
        let records: Vec<LogRecord> = text.lines().filter_map(|l| self.parse_line(l)).collect();
        if records.is_empty() {
            return Err(TraceError::BatchEmpty);
        }
        debug!(records = records.len(), "parsed log batch");
        Ok(records)
    }

    pub fn parse_file(&self, path: &Path) -> Result<Vec<LogRecord>> {
        let text = fs::read_to_string(path)?;
        self.parse_batch(&text)
    }
}

fn into_record(parsed: ParsedLine, raw: &str) -> LogRecord {
    let ParsedLine {
        timestamp,
        level,
        message,
        target,
        span_root,
        location,
    } = parsed;

    LogRecord {
        timestamp,
        level,
        message,
        target,
        span_root,
        raw_text: raw.to_string(),
        source_location_cache: location.map(|(file, line)| SourceLocation::new(file, line)),
        caller_cache: None,
        oracle_analysis: None,
    }
}

fn fallback_record(clean: &str, raw: &str) -> LogRecord {
    let timestamp = EMBEDDED_TS_RE
        .find(clean)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    LogRecord {
        timestamp,
        level: Level::Info,
        message: clean.trim().to_string(),
        target: None,
        span_root: SpanNode::new(ROOT_SPAN),
        raw_text: raw.to_string(),
        source_location_cache: None,
        caller_cache: None,
        oracle_analysis: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_span_chain_example() {
        let line = "2025-04-20T03:16:50.160897Z TRACE event_loop:startup:release_tag{tag=1}: boomerang::sched: message";
        let rec = LogParser::new().parse_line(line).unwrap();

        assert_eq!(rec.level, Level::Trace);
        assert_eq!(rec.timestamp, "2025-04-20T03:16:50.160897Z");
        assert_eq!(rec.message, "boomerang::sched: message");
        assert_eq!(rec.target.as_deref(), Some("boomerang::sched"));

        let names: Vec<_> = rec.span_root.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["event_loop", "startup", "release_tag"]);
        assert_eq!(
            rec.span_root.leaf().fields,
            vec![("tag".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn raw_text_keeps_ansi_bytes() {
        let line = "\x1b[2m2025-04-20T03:16:50Z\x1b[0m \x1b[32m INFO\x1b[0m app::net: connected";
        let rec = LogParser::new().parse_line(line).unwrap();

        assert_eq!(rec.raw_text, line);
        assert_eq!(strip_ansi(&rec.raw_text), strip_ansi(line));
        assert_eq!(rec.level, Level::Info);
        assert_eq!(rec.message, "connected");
    }

    #[test]
    fn unparsable_lines_become_info_records() {
        let text = "garbage one\n%%% two\n<<three>>\nfour four\n   five";
        let records = LogParser::new().parse_batch(text).unwrap();

        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.level == Level::Info));
        assert_eq!(records[4].message, "five");
        assert_eq!(records[4].raw_text, "   five");
        assert_eq!(records[0].span_root.name, ROOT_SPAN);
    }

    #[test]
    fn blank_batch_is_empty_error() {
        let err = LogParser::new().parse_batch("\n   \n\n").unwrap_err();
        assert!(matches!(err, TraceError::BatchEmpty));
    }

    #[test]
    fn json_location_hint_populates_cache() {
        let line = r#"{"fields":{"message":"boot"},"filename":"src/main.rs","line_number":3}"#;
        let rec = LogParser::new().parse_line(line).unwrap();
        let loc = rec.source_location_cache.unwrap();
        assert_eq!(loc.file, Path::new("src/main.rs"));
        assert_eq!(loc.line, 2);
    }

    #[test]
    fn fallback_keeps_embedded_timestamp() {
        let rec = LogParser::empty()
            .parse_line("worker 3 died at 2025-01-02T10:00:00Z")
            .unwrap();
        assert_eq!(rec.timestamp, "2025-01-02T10:00:00Z");
    }

    #[test]
    fn module_path_before_span_chain() {
        let parser = LogParser::new();
        for line in [
            "2025-04-20T03:16:50Z INFO app::server request{id=1}:inner: handled",
            "2025-04-20T03:16:50Z INFO app::server: request{id=1}:inner: handled",
        ] {
            let rec = parser.parse_line(line).unwrap();
            assert_eq!(rec.span_root.depth(), 2);
            assert_eq!(rec.span_root.path(), "request:inner");
            assert_eq!(rec.target.as_deref(), Some("app::server"));
            assert_eq!(rec.message, "handled");
        }
    }

    #[test]
    fn appended_grammar_is_tried() {
        let parser = LogParser::empty().with_format(Box::new(SimpleFormat));
        let rec = parser
            .parse_line("2025-04-20T03:16:50Z WARN app::db: slow query")
            .unwrap();
        assert_eq!(rec.level, Level::Warn);
        assert_eq!(rec.target.as_deref(), Some("app::db"));

        let rec = parser.parse_line("no header here").unwrap();
        assert_eq!(rec.level, Level::Info);
        assert_eq!(rec.target, None);
    }
}
