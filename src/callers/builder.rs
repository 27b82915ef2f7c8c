use crate::callers::cache::{CallerCache, Claim};
use crate::callers::node::{CallerKey, CallerNode};
use crate::callers::symbols::{
    ReferenceLocation, Symbol, SymbolProvider, enclosing_in_text, references_in_files, window_in_text,
};
use crate::cancel::CancellationToken;
use crate::config::CallerSettings;
use crate::error::{Result, TraceError};
use crate::oracle::{CallerCandidate, DEFAULT_CONFIDENCE, Oracle, RankRequest, RankedCaller};
use crate::resolve::SourceResolver;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const UNRANKED: &str = "unranked";
pub const NOT_RANKED_BY_ORACLE: &str = "not ranked by oracle";
pub const ENCLOSING_ONLY: &str = "no references found; enclosing function";

/// Log context handed to the ranking oracle with each expansion.
#[derive(Debug, Clone, Default)]
pub struct ExpansionContext {
    pub current_line: String,
    pub static_search_string: Option<String>,
    pub context_lines: Vec<String>,
}

enum Outcome {
    /// Oracle-ranked; safe to cache.
    Ranked(Vec<CallerNode>),
    /// Not worth caching: no candidates, or the oracle was unavailable.
    Uncached(Vec<CallerNode>),
}

/// Builds and expands caller trees.
///
/// Node state runs `unexpanded -> loading -> expanded`. Every exit from
/// [`CallerGraph::expand`] clears `loading`; failures end in `expanded([])`
/// and are never cached, so a later expansion retries.
pub struct CallerGraph {
    oracle: Arc<dyn Oracle>,
    symbols: Arc<dyn SymbolProvider>,
    resolver: Arc<SourceResolver>,
    cache: CallerCache,
    settings: CallerSettings,
}

impl CallerGraph {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        symbols: Arc<dyn SymbolProvider>,
        resolver: Arc<SourceResolver>,
        settings: CallerSettings,
    ) -> Self {
        Self {
            cache: CallerCache::new(Duration::from_millis(settings.inflight_wait_ms)),
            oracle,
            symbols,
            resolver,
            settings,
        }
    }

    pub fn cache(&self) -> &CallerCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Expand `node` in place. A no-op on already expanded nodes.
    pub fn expand(&self, node: &mut CallerNode, ctx: &ExpansionContext, cancel: &CancellationToken) {
        if node.is_expanded() {
            return;
        }
        node.loading = true;
        let key = node.key();

        match self.cache.claim(&key) {
            Claim::Ready(children) => {
                debug!(file = %key.0.display(), line = key.1, "caller cache hit");
                node.children = Some(self.hydrate(&key, &children));
            }
            Claim::Busy => {
                warn!(file = %key.0.display(), line = key.1, "expansion still in flight elsewhere");
            }
            Claim::Owner(guard) => match self.compute(node, ctx, cancel) {
                Ok(Outcome::Ranked(children)) => {
                    let stored = guard.complete(children);
                    node.children = Some(self.hydrate(&key, &stored));
                }
                Ok(Outcome::Uncached(children)) => {
                    drop(guard);
                    node.children = Some(self.hydrate(&key, &children));
                }
                Err(TraceError::Cancelled) => {
                    drop(guard);
                    debug!("expansion cancelled");
                }
                Err(e) => {
                    drop(guard);
                    warn!(file = %key.0.display(), line = key.1, error = %e, "caller expansion failed");
                    node.children = Some(Vec::new());
                }
            },
        }
        node.loading = false;
    }

    fn compute(&self, node: &CallerNode, ctx: &ExpansionContext, cancel: &CancellationToken) -> Result<Outcome> {
        let mut texts = SourceTexts::default();
        let text = texts.get(&node.file_path)?;

        let symbol = self
            .symbols
            .enclosing_symbol(&node.file_path, node.line_number)
            .or_else(|| enclosing_in_text(&text, node.line_number));
        let Some(symbol) = symbol else {
            debug!(file = %node.file_path.display(), line = node.line_number, "no enclosing function");
            return Ok(Outcome::Uncached(Vec::new()));
        };

        let references = self.references(&node.file_path, &symbol)?;
        if cancel.is_cancelled() {
            return Err(TraceError::Cancelled);
        }

        let radius = self.settings.snippet_radius;
        let mut candidates = Vec::with_capacity(references.len());
        for r in &references {
            // Files that vanished since discovery are skipped.
            let Ok(ref_text) = texts.get(&r.file) else { continue };
            let function = self
                .symbols
                .enclosing_symbol(&r.file, r.line)
                .or_else(|| enclosing_in_text(&ref_text, r.line))
                .map(|s| s.name)
                .unwrap_or_default();
            candidates.push(CallerCandidate {
                file: r.file.clone(),
                line: r.line,
                function,
                snippet: snippet(&ref_text, r.line, radius),
            });
        }

        if candidates.is_empty() {
            let line = symbol.range.start_line;
            // Already at the declaration: nothing further up.
            if node.line_number == line {
                return Ok(Outcome::Uncached(Vec::new()));
            }
            debug!(function = %symbol.name, "no references; offering the enclosing function");
            let only = CallerNode {
                file_path: node.file_path.clone(),
                line_number: line,
                code_snippet: snippet(&text, line, radius),
                function_name: symbol.name.clone(),
                confidence: DEFAULT_CONFIDENCE,
                explanation: ENCLOSING_ONLY.to_string(),
                children: None,
                loading: false,
            };
            return Ok(Outcome::Uncached(vec![only]));
        }

        let request = RankRequest {
            current_line: ctx.current_line.clone(),
            static_search_string: ctx.static_search_string.clone(),
            context_lines: ctx.context_lines.clone(),
            candidates,
        };
        match self.oracle.rank_callers(&request) {
            Ok(ranked) => {
                info!(function = %symbol.name, candidates = request.candidates.len(), "ranked callers");
                Ok(Outcome::Ranked(apply_ranking(request.candidates, &ranked)))
            }
            Err(e) => {
                warn!(error = %e, "ranking unavailable; keeping candidates unranked");
                Ok(Outcome::Uncached(
                    request
                        .candidates
                        .into_iter()
                        .map(|c| candidate_node(c, DEFAULT_CONFIDENCE, UNRANKED.to_string()))
                        .collect(),
                ))
            }
        }
    }

    fn references(&self, file: &Path, symbol: &Symbol) -> Result<Vec<ReferenceLocation>> {
        let found = match self.symbols.find_references(file, symbol.position()) {
            Some(refs) => refs,
            None => references_in_files(&self.resolver.files()?, &symbol.name),
        };
        Ok(found
            .into_iter()
            .filter(|r| !(same_file(&r.file, file) && r.line == symbol.range.start_line))
            .collect())
    }

    /// Fill `children` from the cache, descending into every cached
    /// descendant. Walks an explicit worklist bounded by
    /// `max_hydrate_depth`; keys already on the path stay unexpanded.
    fn hydrate(&self, parent: &CallerKey, children: &[CallerNode]) -> Vec<CallerNode> {
        struct Entry {
            node: CallerNode,
            kids: Option<Vec<usize>>,
        }

        let mut arena: Vec<Entry> = children
            .iter()
            .map(|c| Entry {
                node: c.shallow(),
                kids: None,
            })
            .collect();
        let roots = arena.len();
        let mut queue: VecDeque<(usize, usize, Vec<CallerKey>)> =
            (0..roots).map(|i| (i, 1, vec![parent.clone()])).collect();

        while let Some((idx, depth, path)) = queue.pop_front() {
            if depth >= self.settings.max_hydrate_depth {
                continue;
            }
            let key = arena[idx].node.key();
            if path.contains(&key) {
                continue;
            }
            let Some(cached) = self.cache.get(&key) else {
                continue;
            };
            let mut child_path = path;
            child_path.push(key);
            let mut kids = Vec::with_capacity(cached.len());
            for c in cached.iter() {
                arena.push(Entry {
                    node: c.shallow(),
                    kids: None,
                });
                let at = arena.len() - 1;
                kids.push(at);
                queue.push_back((at, depth + 1, child_path.clone()));
            }
            arena[idx].kids = Some(kids);
        }

        // Children always sit after their parent, so a reverse pass sees
        // every subtree complete before its parent is assembled.
        let mut built: Vec<Option<CallerNode>> = (0..arena.len()).map(|_| None).collect();
        for (i, entry) in arena.into_iter().enumerate().rev() {
            let mut node = entry.node;
            if let Some(kids) = entry.kids {
                node.children = Some(kids.iter().filter_map(|&k| built[k].take()).collect());
            }
            built[i] = Some(node);
        }
        built.into_iter().take(roots).flatten().collect()
    }
}

/// Pair oracle rankings with candidates by position (or function name),
/// highest confidence first. Candidates the oracle left out follow with
/// zero confidence.
fn apply_ranking(candidates: Vec<CallerCandidate>, ranked: &[RankedCaller]) -> Vec<CallerNode> {
    let mut remaining: Vec<Option<CallerCandidate>> = candidates.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(remaining.len());

    for r in ranked {
        let by_position = remaining.iter().position(|c| {
            c.as_ref()
                .is_some_and(|c| c.line == r.line && !r.file.as_os_str().is_empty() && same_file(&c.file, &r.file))
        });
        let by_name = || {
            remaining.iter().position(|c| {
                c.as_ref()
                    .is_some_and(|c| !r.function.is_empty() && c.function == r.function)
            })
        };
        let Some(i) = by_position.or_else(by_name) else {
            continue;
        };
        if let Some(c) = remaining[i].take() {
            out.push(candidate_node(c, r.confidence, r.explanation.clone()));
        }
    }
    out.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    out.extend(
        remaining
            .into_iter()
            .flatten()
            .map(|c| candidate_node(c, 0.0, NOT_RANKED_BY_ORACLE.to_string())),
    );
    out
}

fn candidate_node(c: CallerCandidate, confidence: f64, explanation: String) -> CallerNode {
    CallerNode {
        file_path: c.file,
        line_number: c.line,
        code_snippet: c.snippet,
        function_name: c.function,
        confidence,
        explanation,
        children: None,
        loading: false,
    }
}

/// Oracle replies often carry repository-relative paths.
fn same_file(a: &Path, b: &Path) -> bool {
    a == b || a.ends_with(b) || b.ends_with(a)
}

fn snippet(text: &str, line: usize, radius: usize) -> String {
    window_in_text(text, line, radius)
        .into_iter()
        .map(|(_, l)| l)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-expansion file text cache.
#[derive(Default)]
struct SourceTexts {
    texts: HashMap<PathBuf, Arc<str>>,
}

impl SourceTexts {
    fn get(&mut self, file: &Path) -> Result<Arc<str>> {
        if let Some(t) = self.texts.get(file) {
            return Ok(Arc::clone(t));
        }
        let text: Arc<str> = fs::read_to_string(file)?.into();
        self.texts.insert(file.to_path_buf(), Arc::clone(&text));
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(file: &str, line: usize, function: &str) -> CallerCandidate {
        CallerCandidate {
            file: PathBuf::from(file),
            line,
            function: function.to_string(),
            snippet: String::new(),
        }
    }

    fn ranked(file: &str, line: usize, function: &str, confidence: f64) -> RankedCaller {
        RankedCaller {
            file: PathBuf::from(file),
            line,
            function: function.to_string(),
            confidence,
            explanation: "because".to_string(),
        }
    }

    #[test]
    fn ranking_matches_relative_paths_and_names() {
        let candidates = vec![
            cand("/repo/src/a.rs", 3, "alpha"),
            cand("/repo/src/b.rs", 7, "beta"),
            cand("/repo/src/c.rs", 1, "gamma"),
        ];
        let reply = vec![
            ranked("src/b.rs", 7, "", 0.9),
            ranked("", 0, "alpha", 0.4),
            ranked("src/zzz.rs", 1, "nobody", 1.0),
        ];
        let nodes = apply_ranking(candidates, &reply);
        let order: Vec<_> = nodes
            .iter()
            .map(|n| (n.function_name.as_str(), n.confidence))
            .collect();
        assert_eq!(order, vec![("beta", 0.9), ("alpha", 0.4), ("gamma", 0.0)]);
        assert_eq!(nodes[2].explanation, NOT_RANKED_BY_ORACLE);
    }

    #[test]
    fn snippets_are_joined_lines() {
        assert_eq!(snippet("a\nb\nc\nd", 1, 1), "a\nb\nc");
    }
}
