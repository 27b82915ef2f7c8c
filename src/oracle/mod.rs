//! Ranking / extraction oracle.
//!
//! The oracle is an external scorer with a fixed contract:
//! - `analyze_message`: raw message -> static search string + variables
//! - `rank_callers`: candidates + log context -> ranked candidates
//!
//! Replies from a remote model are loosely shaped, so every reply is coerced
//! through `from_value` with safe defaults instead of strict deserialization.

mod lexical;

pub use lexical::LexicalOracle;

use crate::error::{Result, TraceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Confidence used when a reply omits or mangles it.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageAnalysis {
    /// Part of the message believed to be literal source text.
    pub static_search_string: String,
    pub variables: BTreeMap<String, String>,
}

impl MessageAnalysis {
    pub fn from_value(v: &Value) -> Self {
        let static_search_string = v
            .get("static_search_string")
            .or_else(|| v.get("staticSearchString"))
            .map(scalar_string)
            .unwrap_or_default();

        let variables = match v.get("variables") {
            Some(Value::Object(m)) => m
                .iter()
                .map(|(k, v)| (k.clone(), scalar_string(v)))
                .collect(),
            _ => BTreeMap::new(),
        };

        Self {
            static_search_string,
            variables,
        }
    }

    /// Coerce a free-text model reply. A reply with no JSON object in it
    /// yields the empty analysis.
    pub fn from_reply(text: &str) -> Self {
        extract_json(text)
            .map(|v| Self::from_value(&v))
            .unwrap_or_default()
    }
}

/// A probable call site offered to the oracle for ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallerCandidate {
    pub file: PathBuf,
    /// 0-based.
    pub line: usize,
    pub function: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankRequest {
    pub current_line: String,
    pub static_search_string: Option<String>,
    pub context_lines: Vec<String>,
    pub candidates: Vec<CallerCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCaller {
    pub file: PathBuf,
    pub line: usize,
    pub function: String,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub explanation: String,
}

impl RankedCaller {
    pub fn from_value(v: &Value) -> Self {
        let file = v
            .get("file")
            .or_else(|| v.get("file_path"))
            .map(scalar_string)
            .unwrap_or_default();
        let line = v
            .get("line")
            .or_else(|| v.get("line_number"))
            .and_then(|l| match l {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .unwrap_or(0) as usize;
        let function = v
            .get("function")
            .or_else(|| v.get("function_name"))
            .map(scalar_string)
            .unwrap_or_default();
        let confidence = v
            .get("confidence")
            .and_then(|c| match c {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .map(clamp_confidence)
            .unwrap_or(DEFAULT_CONFIDENCE);
        let explanation = v
            .get("explanation")
            .map(scalar_string)
            .unwrap_or_default();

        Self {
            file: PathBuf::from(file),
            line,
            function,
            confidence,
            explanation,
        }
    }

    /// Coerce a reply holding either a JSON array or `{"callers": [...]}`.
    pub fn list_from_reply(text: &str) -> Vec<Self> {
        let Some(v) = extract_json(text) else {
            return Vec::new();
        };
        let items: &[Value] = match &v {
            Value::Array(items) => items.as_slice(),
            Value::Object(m) => match m.get("callers").or_else(|| m.get("ranked")) {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            },
            _ => &[],
        };
        items
            .iter()
            .filter(|i| i.is_object())
            .map(Self::from_value)
            .collect()
    }
}

pub fn clamp_confidence(c: f64) -> f64 {
    if c.is_nan() {
        DEFAULT_CONFIDENCE
    } else {
        c.clamp(0.0, 1.0)
    }
}

fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Pull the outermost JSON object or array out of text that may wrap it in
/// prose or code fences.
fn extract_json(text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text.trim()) {
        return Some(v);
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                if let Ok(v) = serde_json::from_str::<Value>(&text[start..=end]) {
                    return Some(v);
                }
            }
        }
    }
    None
}

pub trait Oracle: Send + Sync {
    fn analyze_message(&self, raw_message: &str) -> Result<MessageAnalysis>;

    fn rank_callers(&self, request: &RankRequest) -> Result<Vec<RankedCaller>>;
}

/// Oracle used when none is configured: every call reports unavailability.
pub struct NoOracle;

impl Oracle for NoOracle {
    fn analyze_message(&self, _raw_message: &str) -> Result<MessageAnalysis> {
        Err(TraceError::OracleUnavailable("no oracle configured".into()))
    }

    fn rank_callers(&self, _request: &RankRequest) -> Result<Vec<RankedCaller>> {
        Err(TraceError::OracleUnavailable("no oracle configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn analysis_missing_fields_default() {
        let a = MessageAnalysis::from_value(&json!({"variables": "oops"}));
        assert_eq!(a, MessageAnalysis::default());

        let a = MessageAnalysis::from_value(&json!({
            "static_search_string": "order placed",
            "variables": {"id": 7, "user": "ann"}
        }));
        assert_eq!(a.static_search_string, "order placed");
        assert_eq!(a.variables.get("id").map(String::as_str), Some("7"));
    }

    #[test]
    fn ranked_confidence_is_clamped_and_defaulted() {
        let high = RankedCaller::from_value(&json!({"file": "a.rs", "line": 3, "confidence": 4.2}));
        assert_eq!(high.confidence, 1.0);

        let low = RankedCaller::from_value(&json!({"confidence": -1}));
        assert_eq!(low.confidence, 0.0);

        let junk = RankedCaller::from_value(&json!({"confidence": "very"}));
        assert_eq!(junk.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(junk.file, PathBuf::new());
        assert_eq!(junk.explanation, "");
    }

    #[test]
    fn reply_with_prose_is_coerced() {
        let reply = "Sure! Here you go:\n```json\n{\"callers\": [{\"file\": \"x.py\", \"line\": \"12\", \"confidence\": 0.9}, 3]}\n```";
        let ranked = RankedCaller::list_from_reply(reply);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].line, 12);
        assert_eq!(ranked[0].confidence, 0.9);

        assert!(RankedCaller::list_from_reply("no json here").is_empty());
        assert_eq!(MessageAnalysis::from_reply("nothing"), MessageAnalysis::default());
    }

    #[test]
    fn no_oracle_is_unavailable() {
        assert!(matches!(
            NoOracle.analyze_message("x"),
            Err(TraceError::OracleUnavailable(_))
        ));
    }
}
