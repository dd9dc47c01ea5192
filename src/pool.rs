//! Thread-local parser pooling.
//!
//! Keeps one parser per language per thread. The parser is reused, the tree
//! is not: every call still parses from scratch, so pooling never turns into
//! an index cache.

use crate::language::Language;
use crate::ts::{SourceParser, TreeSitterError};
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static PARSERS: RefCell<HashMap<Language, SourceParser>> = RefCell::new(HashMap::new());
}

/// Execute `f` with the pooled parser for `language`.
///
/// The first call per thread and language creates the parser.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use surgical_edit::pool::with_parser;
/// use surgical_edit::Language;
///
/// let has_errors = with_parser(Language::Python, |parser| {
///     parser.parse_with_source("def f():\n    pass\n").map(|p| p.has_errors())
/// })??;
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(language: Language, f: F) -> Result<R, TreeSitterError>
where
    F: FnOnce(&mut SourceParser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(language) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(SourceParser::new(language)?)
            }
        };
        Ok(f(parser))
    })
}
