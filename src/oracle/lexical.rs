use super::{CallerCandidate, MessageAnalysis, Oracle, RankRequest, RankedCaller, clamp_confidence};
use crate::error::Result;
use crate::log::formats::TIMESTAMP_PATTERN;
use crate::log::strip_ansi;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

// Order matters: earlier alternatives win at the same position.
static DYNAMIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?P<kv>\b(?P<key>[A-Za-z_][\w.]*)=(?P<val>"[^"]*"|'[^']*'|[^\s,;]+))|(?P<ts>{ts}|\b\d{{2}}:\d{{2}}:\d{{2}}(?:\.\d+)?\b)|(?P<quoted>"[^"]*"|'[^']*')|(?P<uuid>\b[0-9a-fA-F]{{8}}-[0-9a-fA-F]{{4}}-[0-9a-fA-F]{{4}}-[0-9a-fA-F]{{4}}-[0-9a-fA-F]{{12}}\b)|(?P<hex>\b0x[0-9a-fA-F]+\b|\b[0-9a-fA-F]{{12,}}\b)|(?P<num>\b\d+(?:\.\d+)?\b)"#,
        ts = TIMESTAMP_PATTERN
    ))
    .expect("dynamic content pattern")
});

const MIN_STATIC_LEN: usize = 3;

/// Offline oracle: separates literal text from interpolated values with
/// fixed patterns and ranks candidates by shared vocabulary.
#[derive(Debug, Default, Clone)]
pub struct LexicalOracle;

impl LexicalOracle {
    pub fn new() -> Self {
        Self
    }
}

impl Oracle for LexicalOracle {
    fn analyze_message(&self, raw_message: &str) -> Result<MessageAnalysis> {
        let message = strip_ansi(raw_message);
        let message = message.trim();

        let mut runs: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut variables = BTreeMap::new();
        let mut last = 0usize;
        let mut positional = 0usize;

        for caps in DYNAMIC_RE.captures_iter(message) {
            let Some(m) = caps.get(0) else { continue };
            current.push_str(&message[last..m.start()]);

            if let (Some(key), Some(val)) = (caps.name("key"), caps.name("val")) {
                // `key=` is literal format text; only the value is dynamic.
                current.push_str(&message[m.start()..val.start()]);
                variables.insert(key.as_str().to_string(), unquote(val.as_str()).to_string());
            } else {
                variables.insert(format!("value{}", positional), unquote(m.as_str()).to_string());
                positional += 1;
            }

            runs.push(std::mem::take(&mut current));
            last = m.end();
        }
        current.push_str(&message[last..]);
        runs.push(current);

        let static_search_string = runs
            .iter()
            .map(|r| trim_run(r))
            .filter(|r| r.chars().count() >= MIN_STATIC_LEN)
            .max_by(|a, b| a.chars().count().cmp(&b.chars().count()).then(Ordering::Greater))
            .map(str::to_string)
            .unwrap_or_else(|| message.to_string());

        Ok(MessageAnalysis {
            static_search_string,
            variables,
        })
    }

    fn rank_callers(&self, request: &RankRequest) -> Result<Vec<RankedCaller>> {
        let mut vocabulary = terms(&request.current_line);
        if let Some(s) = &request.static_search_string {
            vocabulary.extend(terms(s));
        }
        for line in &request.context_lines {
            vocabulary.extend(terms(line));
        }

        let mut ranked: Vec<RankedCaller> = request
            .candidates
            .iter()
            .map(|c| score_candidate(c, &vocabulary))
            .collect();
        // Stable: equal confidence keeps candidate order.
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        Ok(ranked)
    }
}

fn score_candidate(c: &CallerCandidate, vocabulary: &HashSet<String>) -> RankedCaller {
    let mut own = terms(&c.snippet);
    own.extend(terms(&c.function));

    let shared = own.iter().filter(|t| vocabulary.contains(*t)).count();
    let fraction = if own.is_empty() {
        0.0
    } else {
        shared as f64 / own.len() as f64
    };

    RankedCaller {
        file: c.file.clone(),
        line: c.line,
        function: c.function.clone(),
        confidence: clamp_confidence(0.3 + 0.6 * fraction),
        explanation: format!("shares {} of {} terms with the log context", shared, own.len()),
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}

fn trim_run(run: &str) -> &str {
    run.trim()
        .trim_matches(|c: char| matches!(c, ':' | ',' | ';' | '=' | '(' | ')' | '[' | ']'))
        .trim()
}

fn unquote(v: &str) -> &str {
    let quoted = v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')));
    if quoted { &v[1..v.len() - 1] } else { v }
}
