//! Tree-sitter integration.
//!
//! Parsing is the only thing this module does: a [`SourceParser`] turns text
//! into a concrete syntax tree for one registered [`Language`](crate::Language),
//! and [`ParsedSource`] exposes the ERROR/MISSING nodes that the validator
//! and indexer care about. Comments and formatting survive because the tree
//! is never printed back; all edits are byte-span splices.

pub mod errors;
pub mod parser;

pub use errors::TreeSitterError;
pub use parser::{ErrorNode, ParsedSource, SourceParser};
