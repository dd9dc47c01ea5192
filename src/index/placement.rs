//! Where new code goes, and how much blank space surrounds it.
//!
//! Blank-line separation is sampled from the file itself: the gap between
//! the first adjacent pair of sibling definitions wins. Only when nothing can
//! be sampled does the configured (or per-language) default apply.

use super::{Entity, EntityKind, StructuralIndex};
use crate::edit::Edit;
use crate::layout::{self, newline_style};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Formatting knobs for inserted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Blank lines between definitions when the file offers none to sample.
    /// `None` uses the language default.
    pub blank_lines: Option<usize>,
    /// Indent unit for members of an empty class.
    pub indent_width: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            blank_lines: None,
            indent_width: 4,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("class '{class}' has no closing brace to insert before")]
    UnterminatedBody { class: String },
}

/// Blank lines between adjacent top-level definitions, if any pair exists.
pub fn sample_top_level_gap(index: &StructuralIndex, text: &str) -> Option<usize> {
    let definitions: Vec<&Entity> = index
        .iter()
        .filter(|e| e.is_top_level() && e.kind != EntityKind::Import)
        .collect();
    sample_gap(&definitions, text)
}

/// Blank lines between adjacent members of `class`.
pub fn sample_member_gap(index: &StructuralIndex, text: &str, class: &Entity) -> Option<usize> {
    let members = class_members(index, class);
    sample_gap(&members, text)
}

fn sample_gap(siblings: &[&Entity], text: &str) -> Option<usize> {
    siblings
        .windows(2)
        .find_map(|pair| layout::blank_gap(text, pair[0].byte_end, pair[1].byte_start))
}

fn class_members<'a>(index: &'a StructuralIndex, class: &'a Entity) -> Vec<&'a Entity> {
    index
        .members_of(&class.name)
        .filter(|member| class.contains(member) && member != &class)
        .collect()
}

fn top_level_blank_lines(index: &StructuralIndex, text: &str, options: &LayoutOptions) -> usize {
    sample_top_level_gap(index, text)
        .or(options.blank_lines)
        .unwrap_or_else(|| index.language.default_top_level_blank_lines())
}

/// Insert a top-level definition after the last line of the file.
pub fn append_top_level(
    text: &str,
    index: &StructuralIndex,
    code: &str,
    options: &LayoutOptions,
) -> Edit {
    let newline = newline_style(text);
    let payload = layout::position_payload(code, "", newline);

    if text.trim().is_empty() {
        return Edit::insert(text.len(), format!("{payload}{newline}"));
    }

    let blanks = top_level_blank_lines(index, text, options);
    let trailing = &text[text.trim_end().len()..];
    let trailing_newlines = trailing.matches('\n').count();

    let insertion = if trailing_newlines == 0 {
        format!("{}{payload}", newline.repeat(blanks + 1))
    } else {
        let needed = (blanks + 1).saturating_sub(trailing_newlines);
        format!("{}{payload}{newline}", newline.repeat(needed))
    };
    Edit::insert(text.len(), insertion)
}

/// Insert a member definition at the end of `class`'s body.
pub fn append_member(
    text: &str,
    index: &StructuralIndex,
    class: &Entity,
    code: &str,
    options: &LayoutOptions,
) -> Result<Edit, PlacementError> {
    let newline = newline_style(text);
    let members = class_members(index, class);
    let indent = member_indent(text, class, &members, options);
    let payload = layout::position_payload(code, &indent, newline);
    let blanks = sample_member_gap(index, text, class)
        .or(options.blank_lines)
        .unwrap_or_else(|| index.language.default_member_blank_lines());

    if index.language.is_indentation_sensitive() {
        let insertion = format!("{}{payload}", newline.repeat(blanks + 1));
        return Ok(Edit::insert(class.byte_end, insertion));
    }

    if !text[..class.byte_end].ends_with('}') {
        return Err(PlacementError::UnterminatedBody {
            class: class.name.clone(),
        });
    }
    let close = class.byte_end - 1;

    if layout::only_indentation_before(text, close) {
        let blanks = if members.is_empty() { 0 } else { blanks };
        let insertion = format!("{}{payload}{newline}", newline.repeat(blanks));
        Ok(Edit::insert(layout::line_start(text, close), insertion))
    } else {
        let insertion = format!("{newline}{payload}{newline}{}", class.indent);
        Ok(Edit::insert(close, insertion))
    }
}

/// Indentation of the class body, from existing members when possible.
fn member_indent(text: &str, class: &Entity, members: &[&Entity], options: &LayoutOptions) -> String {
    if let Some(member) = members.first() {
        return member.indent.clone();
    }

    let body_start = layout::next_line_start(text, class.definition_start);
    if body_start < class.byte_end {
        let body_line = text[body_start..class.byte_end]
            .lines()
            .find(|line| !layout::is_blank(line));
        if let Some(line) = body_line {
            let indent = layout::indentation(line);
            if indent.len() > class.indent.len() {
                return indent.to_string();
            }
        }
    }

    if class.indent.contains('\t') {
        format!("{}\t", class.indent)
    } else {
        format!("{}{}", class.indent, " ".repeat(options.indent_width))
    }
}

/// Insert an import after the leading import block, or at the top of the
/// file below its header when there is no block.
pub fn insert_import(
    text: &str,
    index: &StructuralIndex,
    statement: &str,
    options: &LayoutOptions,
) -> Edit {
    let newline = newline_style(text);
    let statement = layout::position_payload(statement, "", newline);

    if let Some(end) = index.leading_imports_end {
        return Edit::insert(end, format!("{newline}{statement}"));
    }

    let offset = index.preamble_end;
    if offset > 0 && !text[..offset].ends_with('\n') {
        return Edit::insert(offset, format!("{newline}{statement}{newline}"));
    }

    let rest = &text[offset..];
    if rest.trim().is_empty() {
        return Edit::insert(offset, format!("{statement}{newline}"));
    }

    let blanks = top_level_blank_lines(index, text, options);
    let (existing, _) = layout::blank_lines_after(text, offset);
    let separation = newline.repeat(blanks.saturating_sub(existing));
    Edit::insert(offset, format!("{statement}{newline}{separation}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::index_text;
    use crate::language::Language;

    fn apply(text: &str, edit: Edit) -> String {
        edit.apply_to(text).unwrap()
    }

    #[test]
    fn top_level_append_uses_python_default() {
        let text = "def foo():\n    return 1\n";
        let index = index_text(text, Language::Python).unwrap();
        let edit = append_top_level(text, &index, "def bar():\n    return 2", &LayoutOptions::default());
        assert_eq!(
            apply(text, edit),
            "def foo():\n    return 1\n\n\ndef bar():\n    return 2\n"
        );
    }

    #[test]
    fn top_level_append_samples_existing_gap() {
        let text = "def a():\n    pass\n\ndef b():\n    pass\n";
        let index = index_text(text, Language::Python).unwrap();
        assert_eq!(sample_top_level_gap(&index, text), Some(1));

        let edit = append_top_level(text, &index, "def c():\n    pass\n", &LayoutOptions::default());
        assert!(apply(text, edit).ends_with("    pass\n\ndef c():\n    pass\n"));
    }

    #[test]
    fn top_level_append_without_trailing_newline() {
        let text = "fn a() {}";
        let index = index_text(text, Language::Rust).unwrap();
        let edit = append_top_level(text, &index, "fn b() {}", &LayoutOptions::default());
        assert_eq!(apply(text, edit), "fn a() {}\n\nfn b() {}");
    }

    #[test]
    fn configured_default_applies_when_nothing_to_sample() {
        let text = "def a():\n    pass\n";
        let index = index_text(text, Language::Python).unwrap();
        let options = LayoutOptions {
            blank_lines: Some(1),
            ..LayoutOptions::default()
        };
        let edit = append_top_level(text, &index, "def b():\n    pass", &options);
        assert_eq!(apply(text, edit), "def a():\n    pass\n\ndef b():\n    pass\n");
    }

    #[test]
    fn empty_file_gets_just_the_payload() {
        let index = index_text("", Language::Python).unwrap();
        let edit = append_top_level("", &index, "def f():\n    pass", &LayoutOptions::default());
        assert_eq!(apply("", edit), "def f():\n    pass\n");
    }

    #[test]
    fn python_member_lands_inside_class() {
        let text = "class A:\n    def one(self):\n        pass\n\n\nx = 1\n";
        let index = index_text(text, Language::Python).unwrap();
        let class = index.find_class("A").unwrap();
        let edit = append_member(text, &index, class, "def two(self):\n    pass", &LayoutOptions::default())
            .unwrap();
        assert_eq!(
            apply(text, edit),
            "class A:\n    def one(self):\n        pass\n\n    def two(self):\n        pass\n\n\nx = 1\n"
        );
    }

    #[test]
    fn rust_member_goes_before_closing_brace() {
        let text = "impl A {\n    fn one(&self) {}\n}\n";
        let index = index_text(text, Language::Rust).unwrap();
        let class = index.find_class("A").unwrap();
        let edit = append_member(text, &index, class, "fn two(&self) {}", &LayoutOptions::default()).unwrap();
        assert_eq!(
            apply(text, edit),
            "impl A {\n    fn one(&self) {}\n\n    fn two(&self) {}\n}\n"
        );
    }

    #[test]
    fn empty_inline_body_is_opened_up() {
        let text = "impl A {}\n";
        let index = index_text(text, Language::Rust).unwrap();
        let class = index.find_class("A").unwrap();
        let edit = append_member(text, &index, class, "fn new() {}", &LayoutOptions::default()).unwrap();
        assert_eq!(apply(text, edit), "impl A {\n    fn new() {}\n}\n");
    }

    #[test]
    fn import_joins_leading_block() {
        let text = "import os\nimport sys\n\n\ndef f():\n    pass\n";
        let index = index_text(text, Language::Python).unwrap();
        let edit = insert_import(text, &index, "import json", &LayoutOptions::default());
        assert_eq!(
            apply(text, edit),
            "import os\nimport sys\nimport json\n\n\ndef f():\n    pass\n"
        );
    }

    #[test]
    fn import_lands_after_trailing_comment() {
        let text = "import os  # system\n\n\ndef f():\n    pass\n";
        let index = index_text(text, Language::Python).unwrap();
        let edit = insert_import(text, &index, "import json", &LayoutOptions::default());
        assert_eq!(
            apply(text, edit),
            "import os  # system\nimport json\n\n\ndef f():\n    pass\n"
        );

        let text = "use std::fs; // files\n\nfn main() {}\n";
        let index = index_text(text, Language::Rust).unwrap();
        let edit = insert_import(text, &index, "use std::io;", &LayoutOptions::default());
        assert_eq!(
            apply(text, edit),
            "use std::fs; // files\nuse std::io;\n\nfn main() {}\n"
        );
    }

    #[test]
    fn import_goes_below_docstring_when_no_block() {
        let text = "\"\"\"Docs.\"\"\"\n\n\ndef f():\n    pass\n";
        let index = index_text(text, Language::Python).unwrap();
        let edit = insert_import(text, &index, "import os\n", &LayoutOptions::default());
        assert_eq!(
            apply(text, edit),
            "\"\"\"Docs.\"\"\"\nimport os\n\n\ndef f():\n    pass\n"
        );
    }

    #[test]
    fn import_at_top_separates_from_code() {
        let text = "fn main() {}\n";
        let index = index_text(text, Language::Rust).unwrap();
        let edit = insert_import(text, &index, "use std::fs;", &LayoutOptions::default());
        assert_eq!(apply(text, edit), "use std::fs;\n\nfn main() {}\n");
    }
}
