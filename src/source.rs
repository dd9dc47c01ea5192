//! Immutable source snapshots.

use crate::diagnostic::Diagnostic;
use crate::language::Language;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One file's text plus its declared language.
///
/// Cloning is cheap; the text is shared. Edits never touch a unit in place,
/// they produce a new one through [`SourceUnit::with_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    path: Option<PathBuf>,
    text: Arc<str>,
    language: String,
}

impl SourceUnit {
    /// Create a unit with an explicit language tag (name or extension).
    pub fn new(text: impl Into<Arc<str>>, language: impl Into<String>) -> Self {
        Self {
            path: None,
            text: text.into(),
            language: language.into(),
        }
    }

    /// Create a unit for a file, declaring its language by extension.
    pub fn for_path(path: impl Into<PathBuf>, text: impl Into<Arc<str>>) -> Self {
        let path = path.into();
        let language = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_string();
        Self {
            path: Some(path),
            text: text.into(),
            language,
        }
    }

    /// Attach a path, keeping the declared language.
    pub fn at_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The declared language tag, as given by the caller.
    pub fn declared_language(&self) -> &str {
        &self.language
    }

    /// Resolve the declared language to a registered grammar.
    pub fn language(&self) -> Result<Language, Diagnostic> {
        self.language
            .parse::<Language>()
            .map_err(|_| Diagnostic::unsupported_language(&self.language))
    }

    /// A new unit with the same path and language but different text.
    pub fn with_text(&self, text: impl Into<Arc<str>>) -> Self {
        Self {
            path: self.path.clone(),
            text: text.into(),
            language: self.language.clone(),
        }
    }
}
