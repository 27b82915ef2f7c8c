//! Log parsing: raw text lines into normalized `LogRecord`s.

pub mod ansi;
pub mod fields;
pub mod formats;
pub mod parse;
pub mod record;

pub use ansi::strip_ansi;
pub use formats::{JsonFormat, LogFormat, ParsedLine, SimpleFormat, SpanChainFormat};
pub use parse::LogParser;
pub use record::{Level, LogRecord, RecordId, SourceLocation};
