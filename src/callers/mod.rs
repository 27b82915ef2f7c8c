//! Caller graph: a lazily expanded, cached tree of probable call sites for a
//! resolved source line.

pub mod builder;
pub mod cache;
pub mod node;
pub mod symbols;

pub use builder::{CallerGraph, ExpansionContext};
pub use cache::CallerCache;
pub use node::{CallerKey, CallerNode};
pub use symbols::{
    NoSymbols, Position, ReferenceLocation, Symbol, SymbolProvider, SymbolRange, TextSymbols, code_window,
};
