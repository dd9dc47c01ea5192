//! Structural indexing.
//!
//! [`index`] parses a [`SourceUnit`] from scratch and flattens the tree into
//! a [`StructuralIndex`]: functions, methods, classes and imports with byte
//! and line ranges and their owning scope. The index is a read-only view;
//! it is rebuilt on every call and never cached.

mod extract;
pub mod placement;

use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::language::Language;
use crate::pool;
use crate::source::SourceUnit;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub use placement::LayoutOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Function,
    AsyncFunction,
    Method,
    Class,
    Import,
}

impl EntityKind {
    /// Functions, async functions and methods.
    pub fn is_callable(self) -> bool {
        matches!(
            self,
            EntityKind::Function | EntityKind::AsyncFunction | EntityKind::Method
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Function => "function",
            EntityKind::AsyncFunction => "async function",
            EntityKind::Method => "method",
            EntityKind::Class => "class",
            EntityKind::Import => "import",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, range-bounded structural unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    /// Start of the whole construct, including decorators, attributes,
    /// doc comments and `export`.
    pub byte_start: usize,
    /// Exclusive end, trailing whitespace excluded.
    pub byte_end: usize,
    /// Start of the definition keyword (`def`, `fn`, `class`, ...).
    pub definition_start: usize,
    /// 1-based, inclusive.
    pub line_start: usize,
    pub line_end: usize,
    /// Name of the owning scope; `None` at top level.
    pub parent: Option<String>,
    /// First line of the definition.
    pub signature: String,
    /// Leading whitespace of the entity's first line.
    pub indent: String,
}

impl Entity {
    /// `Parent.name` for nested entities, plain name otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{parent}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    pub fn contains(&self, other: &Entity) -> bool {
        self.byte_start <= other.byte_start && other.byte_end <= self.byte_end
    }

    /// Modules this import statement brings in. `import a, b` yields both.
    pub fn imported_modules(&self) -> impl Iterator<Item = &str> {
        self.name.split(", ")
    }
}

/// Flat, document-ordered view of one parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralIndex {
    pub language: Language,
    pub entities: Vec<Entity>,
    /// End of the last statement in the contiguous leading import block.
    pub leading_imports_end: Option<usize>,
    /// Line boundary after shebangs, module docstrings, inner attributes and
    /// header comments.
    pub preamble_end: usize,
}

impl StructuralIndex {
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn callables(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.kind.is_callable())
    }

    pub fn classes(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.kind == EntityKind::Class)
    }

    pub fn imports(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.kind == EntityKind::Import)
    }

    /// Direct children of the scope named `parent`.
    pub fn members_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities
            .iter()
            .filter(move |e| e.parent.as_deref() == Some(parent))
    }

    /// Callables matching `name`, which may be qualified as `Parent.name`.
    pub fn find_callables(&self, name: &str) -> Vec<&Entity> {
        let exact: Vec<&Entity> = self.callables().filter(|e| e.name == name).collect();
        if !exact.is_empty() {
            return exact;
        }
        match name.rsplit_once('.') {
            Some((parent, short)) => self
                .callables()
                .filter(|e| e.name == short && e.parent.as_deref() == Some(parent))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn find_class(&self, name: &str) -> Option<&Entity> {
        self.classes().find(|e| e.name == name)
    }

    /// Import statements bringing in `module`.
    pub fn find_imports(&self, module: &str) -> Vec<&Entity> {
        self.imports()
            .filter(|e| e.imported_modules().any(|m| m == module))
            .collect()
    }

    /// Siblings must not overlap; children must sit inside their parent.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (i, a) in self.entities.iter().enumerate() {
            for b in &self.entities[i + 1..] {
                if a.parent == b.parent && a.byte_start < b.byte_end && b.byte_start < a.byte_end {
                    return Err(format!(
                        "sibling entities '{}' and '{}' overlap",
                        a.name, b.name
                    ));
                }
            }
        }
        for child in &self.entities {
            let Some(parent) = &child.parent else { continue };
            let enclosing = self
                .entities
                .iter()
                .filter(|e| &e.name == parent && e.contains(child) && *e != child)
                .count();
            let scope_is_entity = self.entities.iter().any(|e| &e.name == parent);
            if scope_is_entity && enclosing == 0 {
                return Err(format!(
                    "entity '{}' is not contained in its parent '{parent}'",
                    child.name
                ));
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("unsupported language: '{language}'")]
    UnsupportedLanguage { language: String },

    #[error("tree-sitter error: {0}")]
    TreeSitter(#[from] crate::ts::TreeSitterError),
}

impl IndexError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            IndexError::UnsupportedLanguage { language } => {
                Diagnostic::unsupported_language(language)
            }
            IndexError::TreeSitter(err) => Diagnostic::new(
                DiagnosticCode::SyntaxError,
                err.to_string(),
                "The file could not be parsed at all; check that it is text in the declared language.",
            ),
        }
    }
}

impl From<IndexError> for Diagnostic {
    fn from(err: IndexError) -> Self {
        err.to_diagnostic()
    }
}

/// Build the structural index of `unit`.
pub fn index(unit: &SourceUnit) -> Result<StructuralIndex, IndexError> {
    let language = unit
        .declared_language()
        .parse::<Language>()
        .map_err(|_| IndexError::UnsupportedLanguage {
            language: unit.declared_language().to_string(),
        })?;
    index_text(unit.text(), language)
}

/// Build the structural index of raw text in a known language.
pub fn index_text(text: &str, language: Language) -> Result<StructuralIndex, IndexError> {
    let index = pool::with_parser(language, |parser| {
        let parsed = parser.parse_with_source(text)?;
        Ok::<_, crate::ts::TreeSitterError>(extract::extract(&parsed))
    })??;

    tracing::debug!(
        language = %language,
        entities = index.entities.len(),
        "indexed source"
    );
    Ok(index)
}
