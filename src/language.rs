//! Registered grammars.
//!
//! Grammars come from ast-grep-language's built-in `SupportLang` table rather
//! than individual `tree-sitter-*` crates, so every language shares the one
//! tree-sitter version that ast-grep pins.

use ast_grep_language::{LanguageExt, SupportLang};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Languages with a registered grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Rust,
    TypeScript,
    Tsx,
    JavaScript,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported language: '{0}'")]
pub struct UnsupportedLanguage(pub String);

impl Language {
    /// Detect a language from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" | "pyi" => Some(Language::Python),
            "rs" => Some(Language::Rust),
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "js" | "mjs" | "cjs" | "jsx" => Some(Language::JavaScript),
            _ => None,
        }
    }

    /// Detect a language from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
        }
    }

    pub const fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::Rust,
            Language::TypeScript,
            Language::Tsx,
            Language::JavaScript,
        ]
    }

    /// Tree-sitter grammar for this language.
    pub fn tree_sitter_language(self) -> tree_sitter::Language {
        self.support_lang().get_ts_language()
    }

    fn support_lang(self) -> SupportLang {
        match self {
            Language::Python => SupportLang::Python,
            Language::Rust => SupportLang::Rust,
            Language::TypeScript => SupportLang::TypeScript,
            Language::Tsx => SupportLang::Tsx,
            Language::JavaScript => SupportLang::JavaScript,
        }
    }

    /// Block structure is expressed by indentation rather than delimiters.
    pub const fn is_indentation_sensitive(self) -> bool {
        matches!(self, Language::Python)
    }

    /// Blank lines between top-level definitions when the file offers no
    /// adjacent pair to sample.
    pub const fn default_top_level_blank_lines(self) -> usize {
        match self {
            Language::Python => 2,
            _ => 1,
        }
    }

    /// Blank lines between members of a class when there is nothing to sample.
    pub const fn default_member_blank_lines(self) -> usize {
        1
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    /// Accepts language names and their common file extensions.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalised = input.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalised.as_str() {
            "python" => Ok(Language::Python),
            "rust" => Ok(Language::Rust),
            "typescript" => Ok(Language::TypeScript),
            "javascript" => Ok(Language::JavaScript),
            other => {
                Language::from_extension(other).ok_or_else(|| UnsupportedLanguage(other.to_string()))
            }
        }
    }
}
