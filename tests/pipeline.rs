use logtrace::callers::{CallerGraph, CallerNode, ExpansionContext, NoSymbols};
use logtrace::config::{CallerSettings, SearchSettings};
use logtrace::oracle::{MessageAnalysis, Oracle, RankRequest, RankedCaller};
use logtrace::resolve::{Resolution, SourceResolver, Stage};
use logtrace::{CancellationToken, RecordId, Session, Settings, TraceError};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const ORDERS: &str = "\
fn place_order() {
    log::info!(\"order placed\");
}

fn checkout() {
    place_order();
}

fn retry() {
    place_order();
}

fn main() { checkout(); }
";

const WALK: &str = "\
fn report(n: u32) {
    log::info!(\"step {}\", n);
}

fn walk(n: u32) {
    report(n);
    if n > 0 {
        walk(n - 1);
    }
}

fn main() { walk(3); }
";

/// Ranks candidates in the order given, optionally failing the first
/// `failures` calls.
#[derive(Default)]
struct ScriptedOracle {
    calls: AtomicUsize,
    failures: AtomicUsize,
    delay: Duration,
    last_request: Mutex<Option<RankRequest>>,
}

impl ScriptedOracle {
    fn failing(times: usize) -> Self {
        Self {
            failures: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Oracle for ScriptedOracle {
    fn analyze_message(&self, raw_message: &str) -> logtrace::Result<MessageAnalysis> {
        Ok(MessageAnalysis {
            static_search_string: raw_message.to_string(),
            ..MessageAnalysis::default()
        })
    }

    fn rank_callers(&self, request: &RankRequest) -> logtrace::Result<Vec<RankedCaller>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        *self.last_request.lock().unwrap() = Some(request.clone());

        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(TraceError::OracleUnavailable("scripted outage".into()));
        }
        Ok(request
            .candidates
            .iter()
            .enumerate()
            .map(|(i, c)| RankedCaller {
                file: c.file.clone(),
                line: c.line,
                function: c.function.clone(),
                confidence: 0.9 - 0.1 * i as f64,
                explanation: format!("scripted #{}", i),
            })
            .collect())
    }
}

fn repo() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    let file = dir.path().join("src/orders.rs");
    fs::write(&file, ORDERS).unwrap();
    (dir, file)
}

fn graph(root: &Path, oracle: Arc<dyn Oracle>) -> CallerGraph {
    graph_with(root, oracle, CallerSettings::default())
}

fn graph_with(root: &Path, oracle: Arc<dyn Oracle>, settings: CallerSettings) -> CallerGraph {
    let resolver = Arc::new(SourceResolver::new(root, SearchSettings::default()));
    CallerGraph::new(oracle, Arc::new(NoSymbols), resolver, settings)
}

fn names(node: &CallerNode) -> Vec<String> {
    node.children
        .iter()
        .flatten()
        .map(|c| c.function_name.clone())
        .collect()
}

#[test]
fn expansion_ranks_text_references() {
    let (dir, file) = repo();
    let oracle = Arc::new(ScriptedOracle::default());
    let g = graph(dir.path(), oracle.clone());

    let mut root = CallerNode::root(&file, 1);
    g.expand(&mut root, &ExpansionContext::default(), &CancellationToken::new());

    assert!(!root.loading);
    assert_eq!(names(&root), vec!["checkout", "retry"]);
    let first = &root.children.as_ref().unwrap()[0];
    assert_eq!(first.line_number, 5);
    assert_eq!(first.code_snippet, "fn checkout() {\n    place_order();\n}");
    assert_eq!(first.confidence, 0.9);
    assert_eq!(oracle.calls(), 1);
    assert_eq!(g.cache().len(), 1);
}

#[test]
fn oracle_outage_never_leaves_node_loading_and_is_retryable() {
    let (dir, file) = repo();
    let oracle = Arc::new(ScriptedOracle::failing(1));
    let g = graph(dir.path(), oracle.clone());
    let ctx = ExpansionContext::default();

    let mut first = CallerNode::root(&file, 1);
    g.expand(&mut first, &ctx, &CancellationToken::new());
    assert!(!first.loading);
    let unranked = first.children.as_ref().unwrap();
    assert_eq!(unranked.len(), 2);
    assert!(unranked.iter().all(|c| c.confidence == 0.5 && c.explanation == "unranked"));
    assert!(g.cache().is_empty());

    let mut second = CallerNode::root(&file, 1);
    g.expand(&mut second, &ctx, &CancellationToken::new());
    assert_eq!(oracle.calls(), 2);
    assert_eq!(second.children.as_ref().unwrap()[0].explanation, "scripted #0");
    assert_eq!(g.cache().len(), 1);
}

#[test]
fn unreadable_file_expands_to_empty() {
    let (dir, _) = repo();
    let g = graph(dir.path(), Arc::new(ScriptedOracle::default()));
    let mut node = CallerNode::root(dir.path().join("src/missing.rs"), 3);
    g.expand(&mut node, &ExpansionContext::default(), &CancellationToken::new());
    assert!(!node.loading);
    assert_eq!(node.children, Some(Vec::new()));
}

#[test]
fn tree_positions_share_cached_subtrees() {
    let (dir, file) = repo();
    let oracle = Arc::new(ScriptedOracle::default());
    let g = graph(dir.path(), oracle.clone());
    let ctx = ExpansionContext::default();
    let cancel = CancellationToken::new();

    let mut root = CallerNode::root(&file, 1);
    g.expand(&mut root, &ctx, &cancel);
    let checkout = &mut root.children.as_mut().unwrap()[0];
    g.expand(checkout, &ctx, &cancel);
    assert_eq!(names(checkout), vec!["main"]);
    assert_eq!(oracle.calls(), 2);

    // A second tree over the same location is hydrated from the cache,
    // grandchildren included, without asking the oracle again.
    let mut other = CallerNode::root(&file, 1);
    g.expand(&mut other, &ctx, &cancel);
    assert_eq!(oracle.calls(), 2);
    let children = other.children.as_ref().unwrap();
    assert_eq!(names(&children[0]), vec!["main"]);
    assert_eq!(children[1].children, None);
    assert_eq!(other, root);
}

#[test]
fn recursive_caller_is_not_hydrated_into_itself() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("walk.rs");
    fs::write(&file, WALK).unwrap();
    let oracle = Arc::new(ScriptedOracle::default());
    let g = graph(dir.path(), oracle.clone());
    let ctx = ExpansionContext::default();
    let cancel = CancellationToken::new();

    let mut root = CallerNode::root(&file, 1);
    g.expand(&mut root, &ctx, &cancel);
    assert_eq!(names(&root), vec!["walk"]);
    let walk = &mut root.children.as_mut().unwrap()[0];
    g.expand(walk, &ctx, &cancel);
    let lines: Vec<_> = walk.children.iter().flatten().map(|c| c.line_number).collect();
    assert_eq!(lines, vec![7, 11]);

    // walk@7 is its own caller.
    let recursive = &mut walk.children.as_mut().unwrap()[0];
    g.expand(recursive, &ctx, &cancel);
    assert_eq!(recursive.children.as_ref().unwrap()[0].key(), recursive.key());
    assert_eq!(recursive.children.as_ref().unwrap()[0].children, None);
    assert_eq!(oracle.calls(), 3);

    let mut fresh = CallerNode::root(&file, 1);
    g.expand(&mut fresh, &ctx, &cancel);
    assert_eq!(oracle.calls(), 3);
    let again = fresh.descendant(&[0, 0]).unwrap();
    assert_eq!(again.line_number, 7);
    assert_eq!(again.children.as_ref().map(Vec::len), Some(2));
    assert_eq!(fresh.descendant(&[0, 0, 0]).unwrap().children, None);
    assert_eq!(fresh.descendant(&[0, 0, 1]).unwrap().children, None);
}

#[test]
fn hydration_stops_at_depth_bound() {
    let (dir, file) = repo();
    let oracle = Arc::new(ScriptedOracle::default());
    let settings = CallerSettings {
        max_hydrate_depth: 1,
        ..CallerSettings::default()
    };
    let g = graph_with(dir.path(), oracle.clone(), settings);
    let ctx = ExpansionContext::default();
    let cancel = CancellationToken::new();

    let mut root = CallerNode::root(&file, 1);
    g.expand(&mut root, &ctx, &cancel);
    let checkout = &mut root.children.as_mut().unwrap()[0];
    g.expand(checkout, &ctx, &cancel);
    assert_eq!(names(checkout), vec!["main"]);

    let mut other = CallerNode::root(&file, 1);
    g.expand(&mut other, &ctx, &cancel);
    assert_eq!(oracle.calls(), 2);
    assert_eq!(names(&other), vec!["checkout", "retry"]);
    assert!(other.children.iter().flatten().all(|c| c.children.is_none()));
}

#[test]
fn concurrent_expansions_share_one_oracle_call() {
    let (dir, file) = repo();
    let oracle = Arc::new(ScriptedOracle::slow(Duration::from_millis(50)));
    let g = graph(dir.path(), oracle.clone());

    let results: Vec<CallerNode> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(|| {
                    let mut node = CallerNode::root(&file, 1);
                    g.expand(&mut node, &ExpansionContext::default(), &CancellationToken::new());
                    node
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(oracle.calls(), 1);
    assert_eq!(results[0], results[1]);
    assert_eq!(names(&results[0]), vec!["checkout", "retry"]);
}

#[test]
fn session_locates_then_walks_callers() {
    let (dir, file) = repo();
    let mut session = Session::offline(dir.path(), Settings::default());
    session
        .load("2025-04-20T03:16:50Z INFO app::orders: order placed\n")
        .unwrap();
    let id = RecordId(0);

    let first = session.locate(id).unwrap();
    let scans = session.resolver().scan_count();
    let again = session.locate(id).unwrap();
    assert_eq!(session.resolver().scan_count(), scans);
    let (a, b) = (first.location().unwrap(), again.location().unwrap());
    assert_eq!((&a.file, a.line), (&file, 1));
    assert_eq!((&b.file, b.line, b.stage), (&file, 1, Stage::Cache));

    let root = session.callers(id).unwrap();
    let mut found = names(root);
    found.sort();
    assert_eq!(found, vec!["checkout", "retry"]);

    let at = names(root).iter().position(|n| n == "checkout").unwrap();
    let child = session.expand(id, &[at]).unwrap().unwrap();
    assert_eq!(names(child), vec!["main"]);
    assert!(session.expand(id, &[9, 9]).unwrap().is_none());

    assert_eq!(session.graph().cache().len(), 2);
    session
        .load("2025-04-20T03:16:50Z INFO app::orders: order placed\n")
        .unwrap();
    assert!(session.graph().cache().is_empty());
    assert!(session.store().get(id).unwrap().caller_cache.is_none());
}

#[test]
fn ranking_request_carries_log_context() {
    let (dir, _) = repo();
    let mut settings = Settings::default();
    settings.context.cap = 10;
    let oracle = Arc::new(ScriptedOracle::default());
    let resolver = Arc::new(SourceResolver::new(dir.path(), settings.search.clone()));
    let mut session = Session::new(resolver, oracle.clone(), Arc::new(NoSymbols), settings);

    let mut text = String::new();
    for i in 0..30 {
        if i == 10 {
            text.push_str("INFO order placed\n");
        } else {
            text.push_str(&format!("tick {}\n", i));
        }
    }
    session.load(&text).unwrap();
    session.analyze(RecordId(10)).unwrap();
    assert!(matches!(session.locate(RecordId(10)).unwrap(), Resolution::Found(_)));
    session.callers(RecordId(10)).unwrap();

    let request = oracle.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.current_line, "INFO order placed");
    assert_eq!(request.static_search_string.as_deref(), Some("INFO order placed"));
    assert_eq!(request.context_lines.len(), 10);
    assert_eq!(request.context_lines[0], "tick 7");
    assert_eq!(request.context_lines[9], "tick 17");
}
