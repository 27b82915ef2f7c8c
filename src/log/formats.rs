//! Line grammars, tried in priority order by [`crate::log::LogParser`].

use crate::log::fields::{Fields, scan_span_chain};
use crate::log::record::Level;
use crate::span::SpanNode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Name given to the synthetic root span of records without a target.
pub const ROOT_SPAN: &str = "root";

/// A line accepted by one grammar, before it becomes a `LogRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub timestamp: String,
    pub level: Level,
    pub message: String,
    pub target: Option<String>,
    pub span_root: SpanNode,
    /// `(file, 0-based line)` carried by the line itself.
    pub location: Option<(String, usize)>,
}

pub trait LogFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parse an ANSI-stripped line, or decline it.
    fn parse(&self, line: &str) -> Option<ParsedLine>;
}

pub(crate) const TIMESTAMP_PATTERN: &str =
    r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?";

// Optional brackets around timestamp and level cover `[ts] [LEVEL] ...`.
static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*\[?(?P<ts>{})\]?\s+\[?(?P<level>(?i:TRACE|DEBUG|INFO|WARN|WARNING|ERROR|FATAL|CRITICAL))\]?:?\s+(?P<rest>.*)$",
        TIMESTAMP_PATTERN
    ))
    .expect("header pattern")
});

static TARGET_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<target>[A-Za-z_][\w\-.]*(?:::[A-Za-z_][\w\-.]*)*):(?:\s+(?P<msg>.*)|$)")
        .expect("target pattern")
});

static MODULE_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<target>[A-Za-z_]\w*(?:::[A-Za-z_]\w*)+):\s").expect("module path pattern")
});

// `a::b chain: msg` or `a::b: chain: msg`.
static LEADING_MODULE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<target>[A-Za-z_]\w*(?:::[A-Za-z_]\w*)+)(?::\s+|\s+)(?P<rest>.*)$")
        .expect("leading module pattern")
});

fn header(line: &str) -> Option<(String, Level, &str)> {
    let caps = HEADER_RE.captures(line)?;
    let level = caps.name("level")?.as_str().parse().ok()?;
    let ts = caps.name("ts")?.as_str().to_string();
    let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("");
    Some((ts, level, rest))
}

/// `{"timestamp": .., "level": .., "fields": {"message": ..}, "target": ..}`
/// and the flatter `{"time": .., "msg": ..}` shapes.
pub struct JsonFormat;

const MESSAGE_KEYS: &[&str] = &["message", "msg"];
const LEVEL_KEYS: &[&str] = &["level", "severity", "lvl"];
const TIME_KEYS: &[&str] = &["timestamp", "time", "ts", "@timestamp"];
const TARGET_KEYS: &[&str] = &["target", "module", "module_path", "logger"];
const FILE_KEYS: &[&str] = &["filename", "file"];
const LINE_KEYS: &[&str] = &["line_number", "line", "lineno"];

impl LogFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let mut obj: Map<String, Value> = serde_json::from_str(trimmed).ok()?;

        // tracing-subscriber nests the message and event fields under "fields".
        let mut nested = match obj.remove("fields") {
            Some(Value::Object(m)) => m,
            Some(other) => {
                obj.insert("fields".to_string(), other);
                Map::new()
            }
            None => Map::new(),
        };

        let message = take_first(&mut nested, MESSAGE_KEYS)
            .or_else(|| take_first(&mut obj, MESSAGE_KEYS))
            .map(value_to_string)?;

        let level = take_first(&mut obj, LEVEL_KEYS)
            .and_then(|v| value_to_string(v).parse().ok())
            .unwrap_or(Level::Info);
        let timestamp = take_first(&mut obj, TIME_KEYS)
            .map(value_to_string)
            .unwrap_or_default();
        let target = take_first(&mut obj, TARGET_KEYS).map(value_to_string);

        let file = take_first(&mut obj, FILE_KEYS).map(value_to_string);
        let line_no = take_first(&mut obj, LINE_KEYS).and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        // Emitters count lines from 1.
        let location = match (file, line_no) {
            (Some(f), Some(n)) if !f.is_empty() => Some((f, n.saturating_sub(1) as usize)),
            (Some(f), None) if !f.is_empty() => Some((f, 0)),
            _ => None,
        };

        let mut fields: Fields = nested
            .into_iter()
            .map(|(k, v)| (k, value_to_string(v)))
            .collect();
        fields.extend(obj.into_iter().map(|(k, v)| (k, value_to_string(v))));

        let root_name = target.clone().unwrap_or_else(|| ROOT_SPAN.to_string());
        Some(ParsedLine {
            timestamp,
            level,
            message,
            target,
            span_root: SpanNode::with_fields(root_name, fields),
            location,
        })
    }
}

fn take_first(map: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|k| map.remove(*k))
}

fn value_to_string(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `TIMESTAMP LEVEL [module::path[:]] span{k=v}:span2: MESSAGE`, as printed
/// by tracing-subscriber's default formatter. A target after the chain is
/// picked up from the front of the message.
pub struct SpanChainFormat;

impl LogFormat for SpanChainFormat {
    fn name(&self) -> &'static str {
        "span-chain"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let (timestamp, level, rest) = header(line)?;
        let (leading, chain) = match LEADING_MODULE_RE.captures(rest) {
            Some(caps) => (
                caps.name("target").map(|m| m.as_str().to_string()),
                caps.name("rest").map_or("", |m| m.as_str()),
            ),
            None => (None, rest),
        };
        let (segments, message) = scan_span_chain(chain)?;

        // A lone bare name is indistinguishable from a simple `target: msg`.
        if segments.len() < 2 && segments.iter().all(|s| s.fields.is_empty()) {
            return None;
        }

        let target = leading.or_else(|| {
            MODULE_PATH_RE
                .captures(message)
                .and_then(|c| c.name("target"))
                .map(|m| m.as_str().to_string())
        });

        let span_root = SpanNode::chain(
            segments
                .into_iter()
                .map(|s| (s.name, s.fields))
                .collect(),
        )?;

        Some(ParsedLine {
            timestamp,
            level,
            message: message.to_string(),
            target,
            span_root,
            location: None,
        })
    }
}

/// `TIMESTAMP LEVEL module::path: MESSAGE`. The target is optional so that
/// `TIMESTAMP LEVEL free text` still keeps its timestamp and level.
pub struct SimpleFormat;

impl LogFormat for SimpleFormat {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let (timestamp, level, rest) = header(line)?;

        let (target, message) = match TARGET_PREFIX_RE.captures(rest) {
            Some(caps) => (
                caps.name("target").map(|m| m.as_str().to_string()),
                caps.name("msg").map(|m| m.as_str()).unwrap_or("").to_string(),
            ),
            None => (None, rest.to_string()),
        };

        let root_name = target.clone().unwrap_or_else(|| ROOT_SPAN.to_string());
        Some(ParsedLine {
            timestamp,
            level,
            message,
            target,
            span_root: SpanNode::new(root_name),
            location: None,
        })
    }
}
