//! logtrace: from log lines to the source that emitted them, and on to the
//! code that called it.
//!
//! Raw text is parsed into [`LogRecord`]s (with their span chains), a
//! [`SourceResolver`] maps a record onto a `(file, line)` in a repository,
//! and a [`CallerGraph`] grows a cached, lazily expanded tree of probable
//! callers from there. [`Session`] wires the pieces together.

pub mod callers;
pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod log;
pub mod oracle;
pub mod resolve;
pub mod session;
pub mod span;
pub mod store;

pub use callers::{CallerGraph, CallerNode, SymbolProvider, TextSymbols};
pub use cancel::CancellationToken;
pub use config::Settings;
pub use error::{Result, TraceError};
pub use log::{Level, LogParser, LogRecord, RecordId, SourceLocation};
pub use oracle::{LexicalOracle, NoOracle, Oracle};
pub use resolve::{Resolution, SourceResolver};
pub use session::Session;
pub use span::SpanNode;
pub use store::RecordStore;
