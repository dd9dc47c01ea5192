//! Integrity validation of candidate text.
//!
//! # Hard Rules (Never Violate)
//!
//! 1. **Full re-parse**: every candidate is parsed from scratch; a tree with
//!    ERROR or MISSING nodes is never written.
//! 2. **Python blocks line up**: every statement of a block starts in the
//!    same column, even where the grammar's error recovery would accept it.
//!
//! Failures that look like indentation mistakes are diagnosed as such, with
//! the exact correction; everything else reports the parser's view.

use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::language::Language;
use crate::layout::Indentation;
use crate::pool;
use crate::source::SourceUnit;
use crate::ts::{ErrorNode, TreeSitterError};
use std::fmt::Write as _;
use thiserror::Error;
use tree_sitter::Node;

/// Lines shown on either side of the failing line.
const CONTEXT_RADIUS: usize = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("indentation error at line {}: {}", .0.line, .0.summary())]
    Indentation(IndentationDiagnosis),

    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
        context: String,
    },

    #[error("tree-sitter error: {0}")]
    TreeSitter(#[from] TreeSitterError),
}

/// Expected versus observed indentation at one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentationDiagnosis {
    /// 1-based.
    pub line: usize,
    pub expected: Indentation,
    pub got: Indentation,
    pub context: String,
}

impl IndentationDiagnosis {
    /// `remove 8 spaces`, `add 1 tabs`, or a full replacement when tabs and
    /// spaces are mixed.
    pub fn correction(&self) -> String {
        let (expected, got) = (self.expected, self.got);
        if expected.tabs == 0 && got.tabs == 0 {
            delta_text(expected.spaces, got.spaces, "spaces")
        } else if expected.spaces == 0 && got.spaces == 0 {
            delta_text(expected.tabs, got.tabs, "tabs")
        } else {
            format!("replace the indentation with {expected}")
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Expected: {}... Got: {}... {}.",
            self.expected,
            self.got,
            self.correction()
        )
    }
}

fn delta_text(expected: usize, got: usize, unit: &str) -> String {
    if got > expected {
        format!("remove {} {unit}", got - expected)
    } else {
        format!("add {} {unit}", expected - got)
    }
}

impl ValidationError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ValidationError::Indentation(diagnosis) => Diagnostic::new(
                DiagnosticCode::SyntaxError,
                format!("indentation error: {}", diagnosis.summary()),
                format!(
                    "At line {}, {} so the line matches its block.",
                    diagnosis.line,
                    diagnosis.correction()
                ),
            )
            .at_line(diagnosis.line)
            .with_context(diagnosis.context.clone()),
            ValidationError::Syntax {
                line,
                column,
                message,
                context,
            } => Diagnostic::new(
                DiagnosticCode::SyntaxError,
                format!("syntax error at line {line}, column {column}: {message}"),
                format!(
                    "Re-inspect lines {}-{} of the edited region; the parser reported {message}.",
                    line.saturating_sub(CONTEXT_RADIUS).max(1),
                    line + CONTEXT_RADIUS
                ),
            )
            .at_line(*line)
            .with_context(context.clone()),
            ValidationError::TreeSitter(err) => Diagnostic::new(
                DiagnosticCode::SyntaxError,
                err.to_string(),
                "The text could not be parsed at all; check that it is source code in the declared language.",
            ),
        }
    }
}

impl From<ValidationError> for Diagnostic {
    fn from(err: ValidationError) -> Self {
        err.to_diagnostic()
    }
}

/// Validate `text` as `language` source.
pub fn validate(text: &str, language: Language) -> Result<(), ValidationError> {
    pool::with_parser(language, |parser| {
        let parsed = parser.parse_with_source(text)?;
        let errors = parsed.error_nodes();

        if language.is_indentation_sensitive() {
            if let Some(diagnosis) = misaligned_statement(parsed.root_node(), text) {
                return Err(ValidationError::Indentation(diagnosis));
            }
        }

        let Some(first) = errors.first() else {
            return Ok(());
        };

        if language.is_indentation_sensitive() {
            if let Some(diagnosis) = indentation_near(text, first.start_point.row) {
                return Err(ValidationError::Indentation(diagnosis));
            }
        }
        Err(syntax_error(text, first))
    })?
}

/// Validate a source unit, resolving its language first.
pub fn validate_unit(unit: &SourceUnit) -> Result<(), Diagnostic> {
    let language = unit.language()?;
    validate(unit.text(), language).map_err(|err| {
        let diagnostic = err.to_diagnostic();
        diagnostic.record();
        diagnostic
    })
}

fn syntax_error(text: &str, error: &ErrorNode) -> ValidationError {
    ValidationError::Syntax {
        line: error.start_point.row + 1,
        column: error.start_point.column + 1,
        message: error.message(),
        context: annotate_context(text, error.start_point.row),
    }
}

fn is_comment(node: Node<'_>) -> bool {
    node.kind() == "comment"
}

/// First statement whose column differs from its block's first statement.
fn misaligned_statement(node: Node<'_>, text: &str) -> Option<IndentationDiagnosis> {
    if matches!(node.kind(), "module" | "block") {
        if let Some(diagnosis) = check_block(node, text) {
            return Some(diagnosis);
        }
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(|child| misaligned_statement(child, text))
}

fn check_block(block: Node<'_>, text: &str) -> Option<IndentationDiagnosis> {
    let mut cursor = block.walk();
    let statements: Vec<Node<'_>> = block
        .named_children(&mut cursor)
        .filter(|child| !is_comment(*child) && !child.is_error())
        .collect();
    let first = statements.first()?;

    // Single-line suites (`if x: pass`) share the header's row.
    let header_row = block.parent().map(|parent| parent.start_position().row);
    if block.kind() == "block" && header_row == Some(first.start_position().row) {
        return None;
    }

    let expected_column = if block.kind() == "module" {
        0
    } else {
        first.start_position().column
    };
    let expected_line = if block.kind() == "module" {
        ""
    } else {
        line_text(text, first.start_position().row)
    };

    let mut previous_end_row: Option<usize> = None;
    for statement in &statements {
        let row = statement.start_position().row;
        let on_new_row = previous_end_row.map_or(true, |end| row > end);
        if on_new_row && statement.start_position().column != expected_column {
            return Some(IndentationDiagnosis {
                line: row + 1,
                expected: Indentation::of(expected_line),
                got: Indentation::of(line_text(text, row)),
                context: annotate_context(text, row),
            });
        }
        previous_end_row = Some(statement.end_position().row);
    }
    None
}

/// Look for an indentation-shaped mistake within a few lines of a parse error.
fn indentation_near(text: &str, error_row: usize) -> Option<IndentationDiagnosis> {
    let lines: Vec<&str> = text.lines().collect();
    let unit = indent_unit(&lines);
    let first = error_row.saturating_sub(CONTEXT_RADIUS);
    let last = (error_row + CONTEXT_RADIUS).min(lines.len().saturating_sub(1));

    (first..=last).find_map(|row| {
        let expected = expected_indentation(&lines, row, unit)?;
        let got = Indentation::of(lines[row]);
        (got != expected).then(|| IndentationDiagnosis {
            line: row + 1,
            expected,
            got,
            context: annotate_context(text, row),
        })
    })
}

/// Indentation `row` should have given the code lines above it, or `None`
/// when the line is not a statement start worth judging.
fn expected_indentation(lines: &[&str], row: usize, unit: Indentation) -> Option<Indentation> {
    let line = *lines.get(row)?;
    if !is_code_line(line) || line.trim_start().starts_with([')', ']', '}']) {
        return None;
    }

    let Some(previous_row) = (0..row).rev().find(|r| is_code_line(lines[*r])) else {
        return Some(Indentation::default());
    };
    let previous = lines[previous_row];
    let previous_trimmed = previous.trim_end();
    if previous_trimmed.ends_with(['(', '[', '{', ',', '\\']) {
        return None;
    }

    let previous_indent = Indentation::of(previous);
    let got = Indentation::of(line);

    if previous_trimmed.ends_with(':') {
        let expected = Indentation {
            spaces: previous_indent.spaces + unit.spaces,
            tabs: previous_indent.tabs + unit.tabs,
        };
        return (got.width(4) <= previous_indent.width(4)).then_some(expected);
    }

    if got.width(4) > previous_indent.width(4) {
        return Some(previous_indent);
    }

    // A dedent must land on an enclosing level.
    let levels = enclosing_levels(lines, previous_row);
    if levels.contains(&got) {
        None
    } else {
        levels
            .into_iter()
            .min_by_key(|level| level.width(4).abs_diff(got.width(4)))
    }
}

/// Indentation of `row` and of every line that opens a scope around it.
fn enclosing_levels(lines: &[&str], row: usize) -> Vec<Indentation> {
    let mut levels = vec![Indentation::of(lines[row])];
    let mut current = levels[0].width(4);
    for line in lines[..row].iter().rev().filter(|line| is_code_line(line)) {
        let indent = Indentation::of(line);
        if indent.width(4) < current {
            levels.push(indent);
            current = indent.width(4);
        }
        if current == 0 {
            break;
        }
    }
    levels
}

/// The file's indent step, from its first indented code line.
fn indent_unit(lines: &[&str]) -> Indentation {
    lines
        .iter()
        .filter(|line| is_code_line(line))
        .map(|line| Indentation::of(line))
        .find(|indent| indent.width(4) > 0)
        .unwrap_or(Indentation::from_columns(4))
}

fn is_code_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

fn line_text(text: &str, row: usize) -> &str {
    text.lines().nth(row).unwrap_or("")
}

/// `±2` lines around `row`, each tagged with its indentation.
///
/// ```text
///   1 [ 0] | def foo():
///   2 [ 4] |     x = 1
/// > 3 [12] |             return x
/// ```
pub fn annotate_context(text: &str, row: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let row = row.min(lines.len() - 1);
    let first = row.saturating_sub(CONTEXT_RADIUS);
    let last = (row + CONTEXT_RADIUS).min(lines.len() - 1);
    let width = (last + 1).to_string().len();

    let mut out = String::new();
    for (offset, line) in lines[first..=last].iter().enumerate() {
        let current = first + offset;
        let marker = if current == row { '>' } else { ' ' };
        let indent = Indentation::of(line);
        let count = if indent.tabs == 0 {
            indent.spaces.to_string()
        } else {
            format!("{}t{}", indent.tabs, indent.spaces)
        };
        let _ = writeln!(
            out,
            "{marker} {:>width$} [{count:>2}] | {line}",
            current + 1
        );
    }
    out.truncate(out.trim_end_matches('\n').len());
    out
}
