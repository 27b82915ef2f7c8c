//! Pipeline wiring: one loaded batch, one repository, and the collaborators
//! used to resolve and explore its records.
//!
//! Collaborators are passed in at construction. Resolution of the selected
//! record is split into [`Session::begin_locate`], [`PendingLocate::run`]
//! (which may run on any thread) and [`Session::finish`], so a front end can
//! move on to another record while a scan is running; results for a
//! selection that is no longer current are dropped.

use crate::callers::{CallerGraph, CallerNode, ExpansionContext, SymbolProvider, TextSymbols};
use crate::cancel::CancellationToken;
use crate::config::Settings;
use crate::context::context_lines;
use crate::error::{Result, TraceError};
use crate::log::{LogParser, LogRecord, RecordId};
use crate::oracle::{LexicalOracle, MessageAnalysis, Oracle};
use crate::resolve::{Resolution, SourceResolver};
use crate::store::RecordStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

struct Selection {
    ticket: u64,
    id: RecordId,
    cancel: CancellationToken,
    /// Alive while the `PendingLocate` (or its `CompletedLocate`) exists.
    running: Weak<()>,
}

impl Selection {
    fn in_flight(&self) -> bool {
        !self.cancel.is_cancelled() && self.running.strong_count() > 0
    }
}

pub struct Session {
    parser: LogParser,
    store: RecordStore,
    resolver: Arc<SourceResolver>,
    graph: CallerGraph,
    oracle: Arc<dyn Oracle>,
    settings: Settings,
    generation: u64,
    next_ticket: u64,
    selection: Option<Selection>,
}

impl Session {
    pub fn new(
        resolver: Arc<SourceResolver>,
        oracle: Arc<dyn Oracle>,
        symbols: Arc<dyn SymbolProvider>,
        settings: Settings,
    ) -> Self {
        let graph = CallerGraph::new(
            Arc::clone(&oracle),
            symbols,
            Arc::clone(&resolver),
            settings.callers.clone(),
        );
        Self {
            parser: LogParser::new(),
            store: RecordStore::new(),
            resolver,
            graph,
            oracle,
            settings,
            generation: 0,
            next_ticket: 0,
            selection: None,
        }
    }

    /// Session backed by the lexical oracle and text symbol search only.
    pub fn offline(repo: impl Into<PathBuf>, settings: Settings) -> Self {
        let resolver = Arc::new(SourceResolver::new(repo, settings.search.clone()));
        let symbols = Arc::new(TextSymbols::new(Arc::clone(&resolver)));
        Self::new(resolver, Arc::new(LexicalOracle::new()), symbols, settings)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    pub fn graph(&self) -> &CallerGraph {
        &self.graph
    }

    /// Replace the batch. Every per-record cache, the caller cache and the
    /// discovered file list are dropped, and pending selections go stale.
    pub fn load(&mut self, text: &str) -> Result<usize> {
        let count = self.store.load(&self.parser, text)?;
        self.graph.clear_cache();
        self.resolver.invalidate_files();
        self.generation += 1;
        if let Some(sel) = self.selection.take() {
            sel.cancel.cancel();
        }
        info!(records = count, generation = self.generation, "batch loaded");
        Ok(count)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let text = fs::read_to_string(path)?;
        self.load(&text)
    }

    /// Ask the oracle which part of the message is literal source text.
    /// Oracle failures leave the record unanalyzed.
    pub fn analyze(&mut self, id: RecordId) -> Result<Option<&MessageAnalysis>> {
        let record = self.store.get_mut(id)?;
        if record.oracle_analysis.is_none() {
            match self.oracle.analyze_message(&record.message) {
                Ok(analysis) => record.oracle_analysis = Some(analysis),
                Err(e) => warn!(record = %id, error = %e, "message analysis unavailable"),
            }
        }
        Ok(record.oracle_analysis.as_ref())
    }

    /// Start resolving `id` as the current selection, cancelling any other
    /// selection in flight. `None` when `id` is already being resolved; its
    /// pending result is the one to wait for. A dropped `PendingLocate` or
    /// `CompletedLocate` frees the record for a new attempt.
    pub fn begin_locate(&mut self, id: RecordId) -> Result<Option<PendingLocate>> {
        let record = self.store.get(id)?.clone();
        if let Some(sel) = &self.selection {
            if sel.id == id && sel.in_flight() {
                debug!(record = %id, "resolution already in flight");
                return Ok(None);
            }
            sel.cancel.cancel();
        }

        self.next_ticket += 1;
        let cancel = CancellationToken::new();
        let running = Arc::new(());
        self.selection = Some(Selection {
            ticket: self.next_ticket,
            id,
            cancel: cancel.clone(),
            running: Arc::downgrade(&running),
        });
        Ok(Some(PendingLocate {
            ticket: self.next_ticket,
            generation: self.generation,
            id,
            record,
            resolver: Arc::clone(&self.resolver),
            cancel,
            _running: running,
        }))
    }

    /// Apply a finished resolution if it still belongs to the current
    /// selection of the current batch; `None` when it was superseded.
    pub fn finish(&mut self, done: CompletedLocate) -> Result<Option<Resolution>> {
        let current = self
            .selection
            .as_ref()
            .is_some_and(|s| s.ticket == done.ticket);
        if done.generation != self.generation || !current {
            debug!(record = %done.id, "discarding stale resolution");
            return Ok(None);
        }
        self.selection = None;

        let resolution = done.result?;
        if let Resolution::Found(loc) = &resolution {
            self.store.get_mut(done.id)?.source_location_cache = Some(loc.to_source_location());
        }
        Ok(Some(resolution))
    }

    /// Resolve `id` inline, outside selection tracking.
    pub fn locate(&mut self, id: RecordId) -> Result<Resolution> {
        let record = self.store.get_mut(id)?;
        self.resolver.locate(record, &CancellationToken::new())
    }

    /// Caller tree rooted at the record's location, expanded one level.
    /// Locates the record first when it has no cached location.
    pub fn callers(&mut self, id: RecordId) -> Result<&CallerNode> {
        let location = match self.store.get(id)?.source_location_cache.clone() {
            Some(loc) => loc,
            None => match self.locate(id)? {
                Resolution::Found(loc) => loc.to_source_location(),
                _ => return Err(TraceError::Unresolved(id)),
            },
        };
        // Structured-log hints may carry paths from another machine.
        let file = crate::resolve::translate_path(self.resolver.root(), &location.file)
            .ok_or(TraceError::Unresolved(id))?;

        let reuse = self
            .store
            .get(id)?
            .caller_cache
            .as_ref()
            .is_some_and(|root| root.file_path == file && root.line_number == location.line);
        if !reuse {
            let ctx = self.expansion_context(id)?;
            let mut root = CallerNode::root(file, location.line);
            self.graph.expand(&mut root, &ctx, &CancellationToken::new());
            self.store.get_mut(id)?.caller_cache = Some(root);
        }

        self.store
            .get(id)?
            .caller_cache
            .as_ref()
            .ok_or(TraceError::Unresolved(id))
    }

    /// Expand the node at `path` (child indices from the root) in the
    /// record's caller tree. `None` when the path leads nowhere.
    pub fn expand(&mut self, id: RecordId, path: &[usize]) -> Result<Option<&CallerNode>> {
        let ctx = self.expansion_context(id)?;
        let record = self.store.get_mut(id)?;
        let root = record.caller_cache.as_mut().ok_or(TraceError::Unresolved(id))?;
        let Some(node) = root.descendant_mut(path) else {
            return Ok(None);
        };
        self.graph.expand(node, &ctx, &CancellationToken::new());
        Ok(Some(&*node))
    }

    fn expansion_context(&self, id: RecordId) -> Result<ExpansionContext> {
        let record = self.store.get(id)?;
        let lines = self.store.lines();
        Ok(ExpansionContext {
            current_line: lines.get(id.0).cloned().unwrap_or_default(),
            static_search_string: record
                .oracle_analysis
                .as_ref()
                .map(|a| a.static_search_string.clone())
                .filter(|s| !s.is_empty()),
            context_lines: context_lines(&lines, id.0, self.settings.context.cap),
        })
    }
}

/// A resolution detached from the session, ready to run.
pub struct PendingLocate {
    ticket: u64,
    generation: u64,
    id: RecordId,
    record: LogRecord,
    resolver: Arc<SourceResolver>,
    cancel: CancellationToken,
    _running: Arc<()>,
}

impl PendingLocate {
    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn run(self) -> CompletedLocate {
        let result = self.resolver.resolve(&self.record, &self.cancel);
        CompletedLocate {
            ticket: self.ticket,
            generation: self.generation,
            id: self.id,
            result,
            _running: self._running,
        }
    }
}

pub struct CompletedLocate {
    ticket: u64,
    generation: u64,
    id: RecordId,
    result: Result<Resolution>,
    _running: Arc<()>,
}

impl CompletedLocate {
    pub fn id(&self) -> RecordId {
        self.id
    }
}
