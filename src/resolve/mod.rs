//! Source resolution: log record -> `(file, line)` in a repository.
//!
//! Stages run in order and stop at the first hit: the record's location
//! cache, locations embedded in the message, the oracle's static search
//! string and its word-dropping variants, the cleaned message, and finally
//! a file-name guess from the record's target.

pub mod classify;
pub mod discovery;
pub mod hints;
pub mod resolver;
pub mod score;
pub mod text;

pub use discovery::{Discovery, discover_source_files};
pub use hints::translate_path;
pub use resolver::{Location, Resolution, SourceResolver, Stage};
pub use score::{MatchCandidate, calculate_match_score, rank_candidates};
pub use text::{clean_message, variants};
