//! The mutation engine.
//!
//! Turns one [`EditOperation`] into candidate text. Every operation compiles
//! to byte-span [`Edit`]s against the original text; nothing outside those
//! spans changes. The engine is pure: it neither validates the result nor
//! writes anything to disk.

mod operation;
mod removal;

pub use operation::{EditOperation, OperationKind, OperationRequest};

use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::edit::Edit;
use crate::index::placement::{self, LayoutOptions};
use crate::index::{self, Entity, EntityKind, StructuralIndex};
use crate::language::Language;
use crate::layout;
use crate::source::SourceUnit;
use serde::Serialize;

/// Successful outcome of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub new_text: String,
    /// The splices that produced `new_text`, in ascending offset order.
    pub edits: Vec<Edit>,
}

/// Wire form of an engine outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl From<Result<Mutation, Diagnostic>> for MutationResult {
    fn from(result: Result<Mutation, Diagnostic>) -> Self {
        match result {
            Ok(mutation) => Self {
                success: true,
                new_text: Some(mutation.new_text),
                diagnostic: None,
            },
            Err(diagnostic) => Self {
                success: false,
                new_text: None,
                diagnostic: Some(diagnostic),
            },
        }
    }
}

/// Applies operations using one set of layout options.
#[derive(Debug, Clone, Default)]
pub struct MutationEngine {
    layout: LayoutOptions,
}

/// Apply `op` with default layout options.
pub fn apply(
    unit: &SourceUnit,
    index: &StructuralIndex,
    op: &EditOperation,
) -> Result<Mutation, Diagnostic> {
    MutationEngine::default().apply(unit, index, op)
}

impl MutationEngine {
    pub fn new(layout: LayoutOptions) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LayoutOptions {
        &self.layout
    }

    /// Apply `op` to `unit`, whose structure is described by `index`.
    pub fn apply(
        &self,
        unit: &SourceUnit,
        index: &StructuralIndex,
        op: &EditOperation,
    ) -> Result<Mutation, Diagnostic> {
        let language = unit.language()?;
        let text = unit.text();

        let result = match op {
            EditOperation::AddFunction { code, class } => {
                self.add_function(text, language, index, code, class.as_deref())
            }
            EditOperation::RemoveFunction { name } => remove_function(text, index, name),
            EditOperation::ModifyFunction { name, code } => {
                modify_function(text, language, index, name, code)
            }
            EditOperation::AddImport { statement } => {
                self.add_import(text, language, index, statement)
            }
            EditOperation::RemoveImport { module } => remove_import(text, index, module),
        };

        match &result {
            Ok(mutation) => tracing::debug!(
                operation = %op.describe(),
                edits = mutation.edits.len(),
                "mutation applied"
            ),
            Err(diagnostic) => diagnostic.record(),
        }
        result
    }

    fn add_function(
        &self,
        text: &str,
        language: Language,
        index: &StructuralIndex,
        code: &str,
        class: Option<&str>,
    ) -> Result<Mutation, Diagnostic> {
        let payload = PayloadDefinition::parse(code, language, class.is_some())?;

        let edit = match class {
            Some(class_name) => {
                let class = index.find_class(class_name).ok_or_else(|| {
                    not_found("class", class_name, index.classes().map(|c| c.name.as_str()))
                })?;
                if let Some(existing) = index
                    .members_of(&class.name)
                    .find(|e| e.kind.is_callable() && e.name == payload.name && class.contains(e))
                {
                    return Err(duplicate(existing));
                }
                placement::append_member(text, index, class, code, &self.layout).map_err(|err| {
                    Diagnostic::new(
                        DiagnosticCode::InvalidOperation,
                        err.to_string(),
                        "Check that the class body is complete before adding members to it.",
                    )
                })?
            }
            None => {
                if let Some(existing) = index
                    .callables()
                    .find(|e| e.is_top_level() && e.name == payload.name)
                {
                    return Err(duplicate(existing));
                }
                placement::append_top_level(text, index, code, &self.layout)
            }
        };
        splice(text, vec![edit])
    }

    fn add_import(
        &self,
        text: &str,
        language: Language,
        index: &StructuralIndex,
        statement: &str,
    ) -> Result<Mutation, Diagnostic> {
        let trimmed = layout::trim_payload(statement);
        let parsed = index::index_text(trimmed, language).map_err(Diagnostic::from)?;
        let Some(import) = parsed.imports().next() else {
            return Err(Diagnostic::new(
                DiagnosticCode::InvalidOperation,
                format!("'{}' is not an import statement", trimmed.lines().next().unwrap_or("")),
                format!("Pass a complete {language} import statement as the payload."),
            ));
        };

        let statement_text = &trimmed[import.byte_start..import.byte_end];
        let wanted = normalise_statement(statement_text);
        let existing = if is_module_import(language, statement_text) {
            // `import os` duplicates any `import ...` that already binds `os`.
            index.imports().find(|e| {
                is_module_import(language, &text[e.byte_start..e.byte_end])
                    && e.imported_modules()
                        .any(|m| import.imported_modules().any(|added| added == m))
            })
        } else {
            index.imports().find(|e| {
                e.name == import.name
                    && normalise_statement(&text[e.byte_start..e.byte_end]) == wanted
            })
        };
        if let Some(existing) = existing {
            return Err(duplicate(existing));
        }

        splice(
            text,
            vec![placement::insert_import(text, index, trimmed, &self.layout)],
        )
    }
}

fn remove_function(text: &str, index: &StructuralIndex, name: &str) -> Result<Mutation, Diagnostic> {
    let entity = resolve_callable(index, name)?;
    let range = removal::removal_range(text, entity);
    let edit = Edit::delete(range.clone(), &text[range]);
    splice(text, vec![edit])
}

fn modify_function(
    text: &str,
    language: Language,
    index: &StructuralIndex,
    name: &str,
    code: &str,
) -> Result<Mutation, Diagnostic> {
    let entity = resolve_callable(index, name)?;
    let in_class = entity
        .parent
        .as_deref()
        .is_some_and(|parent| index.find_class(parent).is_some());
    let payload = PayloadDefinition::parse(code, language, in_class)?;

    // Decorators, attributes and `export` stay unless the payload brings its own.
    let start = if payload.has_prefix {
        entity.byte_start
    } else {
        entity.definition_start
    };
    let newline = layout::newline_style(text);
    let indent = layout::indentation(layout::line_at(text, start));
    let positioned = layout::position_payload(code, indent, newline);
    let replacement = positioned.trim_start_matches([' ', '\t']);

    let range = start..entity.byte_end;
    let edit = Edit::replace(range.clone(), replacement, &text[range]);
    splice(text, vec![edit])
}

fn remove_import(text: &str, index: &StructuralIndex, module: &str) -> Result<Mutation, Diagnostic> {
    let matches = index.find_imports(module);
    if matches.is_empty() {
        let mut modules: Vec<&str> = index.imports().flat_map(|e| e.imported_modules()).collect();
        modules.dedup();
        return Err(not_found("import", module, modules.into_iter()));
    }

    let mut edits = Vec::with_capacity(matches.len());
    for entity in matches {
        let others: Vec<&str> = entity.imported_modules().filter(|m| *m != module).collect();
        if others.is_empty() {
            let range = removal::removal_range(text, entity);
            edits.push(Edit::delete(range.clone(), &text[range]));
        } else {
            edits.push(drop_module(text, entity, module)?);
        }
    }
    edits.sort_by_key(|edit| edit.byte_start);
    merge_overlapping(&mut edits, text);
    splice(text, edits)
}

/// Rewrite `import a, b` to drop one module.
fn drop_module(text: &str, entity: &Entity, module: &str) -> Result<Edit, Diagnostic> {
    let range = entity.byte_start..entity.byte_end;
    let statement = &text[range.clone()];
    let body = statement.strip_prefix("import ").filter(|_| !statement.contains('\n'));
    let Some(body) = body else {
        return Err(Diagnostic::new(
            DiagnosticCode::InvalidOperation,
            format!("cannot drop '{module}' from a multi-line import"),
            "Rewrite the import statement with modify_function-style whole replacement, or split it first.",
        )
        .at_line(entity.line_start));
    };

    let kept: Vec<&str> = body
        .split(',')
        .map(str::trim)
        .filter(|part| part.split_whitespace().next() != Some(module))
        .collect();
    Ok(Edit::replace(
        range,
        format!("import {}", kept.join(", ")),
        statement,
    ))
}

/// Join deletions whose blank-line cleanup reaches into each other.
fn merge_overlapping(edits: &mut Vec<Edit>, text: &str) {
    let mut merged: Vec<Edit> = Vec::with_capacity(edits.len());
    for edit in edits.drain(..) {
        match merged.last_mut() {
            Some(last)
                if last.new_text.is_empty()
                    && edit.new_text.is_empty()
                    && edit.byte_start < last.byte_end =>
            {
                let end = last.byte_end.max(edit.byte_end);
                *last = Edit::delete(last.byte_start..end, &text[last.byte_start..end]);
            }
            _ => merged.push(edit),
        }
    }
    *edits = merged;
}

fn splice(text: &str, edits: Vec<Edit>) -> Result<Mutation, Diagnostic> {
    let new_text = Edit::apply_all(text, edits.clone()).map_err(|err| {
        Diagnostic::new(
            DiagnosticCode::InvalidOperation,
            err.to_string(),
            "Re-index the file and retry; the text changed under the operation.",
        )
    })?;
    Ok(Mutation { new_text, edits })
}

/// Resolve a possibly qualified callable name to exactly one entity.
fn resolve_callable<'a>(index: &'a StructuralIndex, name: &str) -> Result<&'a Entity, Diagnostic> {
    let found = index.find_callables(name);
    match found.as_slice() {
        [entity] => Ok(entity),
        [] => Err(not_found(
            "function",
            name,
            index.callables().map(|e| e.name.as_str()),
        )),
        many => {
            let qualified: Vec<String> = many.iter().map(|e| e.qualified_name()).collect();
            Err(Diagnostic::new(
                DiagnosticCode::AmbiguousTarget,
                format!("'{name}' matches {} definitions: {}", many.len(), qualified.join(", ")),
                format!("Qualify the name, for example '{}'.", qualified[0]),
            )
            .at_line(many[0].line_start))
        }
    }
}

/// The function a caller-supplied payload defines.
struct PayloadDefinition {
    name: String,
    /// Decorators, attributes, doc comments or `export` precede the definition.
    has_prefix: bool,
}

impl PayloadDefinition {
    fn parse(code: &str, language: Language, as_member: bool) -> Result<Self, Diagnostic> {
        let body = layout::trim_payload(code);

        // TS/JS methods only parse inside a class body.
        let wrap = as_member
            && matches!(
                language,
                Language::TypeScript | Language::Tsx | Language::JavaScript
            );
        let candidate = if wrap {
            format!("class __Payload {{\n{body}\n}}\n")
        } else {
            body.to_string()
        };

        let parsed = index::index_text(&candidate, language).map_err(Diagnostic::from)?;
        let definition = parsed.callables().find(|e| {
            if wrap {
                e.parent.as_deref() == Some("__Payload")
            } else {
                e.is_top_level()
            }
        });

        match definition {
            Some(entity) => Ok(Self {
                name: entity.name.clone(),
                has_prefix: entity.byte_start < entity.definition_start,
            }),
            None => Err(Diagnostic::new(
                DiagnosticCode::InvalidOperation,
                "payload does not define a function",
                format!("Pass the complete {language} function definition, signature through body."),
            )),
        }
    }
}

fn duplicate(existing: &Entity) -> Diagnostic {
    let noun = if existing.kind == EntityKind::Import {
        "import"
    } else {
        existing.kind.as_str()
    };
    let suggestion = match existing.kind {
        EntityKind::Import => format!(
            "'{}' is already imported; leave it or use remove_import first.",
            existing.name
        ),
        _ => format!(
            "Use modify_function on '{}' to change the existing definition.",
            existing.qualified_name()
        ),
    };
    Diagnostic::new(
        DiagnosticCode::DuplicateTarget,
        format!(
            "{noun} '{}' already exists at line {}",
            existing.name, existing.line_start
        ),
        suggestion,
    )
    .at_line(existing.line_start)
}

const MAX_LISTED: usize = 10;

fn not_found<'a>(noun: &str, wanted: &str, candidates: impl Iterator<Item = &'a str>) -> Diagnostic {
    let candidates: Vec<&str> = candidates.collect();
    let nearest = nearest_match(wanted, &candidates);

    let suggestion = match (&nearest, candidates.is_empty()) {
        (_, true) => format!("The file has no {noun}s; re-index it and check the target."),
        (Some(nearest), false) => {
            let listed: Vec<&str> = candidates.iter().take(MAX_LISTED).copied().collect();
            format!(
                "Did you mean '{nearest}'? Available: {}.",
                listed.join(", ")
            )
        }
        (None, false) => String::new(),
    };

    let diagnostic = Diagnostic::new(
        DiagnosticCode::TargetNotFound,
        format!("{noun} '{wanted}' not found"),
        suggestion,
    );
    match nearest {
        Some(nearest) => diagnostic.with_nearest_match(nearest),
        None => diagnostic,
    }
}

/// Closest candidate by Levenshtein distance; ties go to the earliest.
fn nearest_match(wanted: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(position, candidate)| (strsim::levenshtein(wanted, candidate), *position))
        .map(|(_, candidate)| candidate.to_string())
}

/// Whole-module Python imports (`import a, b`), as opposed to `from` forms.
fn is_module_import(language: Language, statement: &str) -> bool {
    language == Language::Python && statement.trim_start().starts_with("import ")
}

fn normalise_statement(statement: &str) -> String {
    statement
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(';')
        .to_string()
}
