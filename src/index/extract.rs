use super::{Entity, EntityKind, StructuralIndex};
use crate::language::Language;
use crate::layout;
use crate::ts::ParsedSource;
use tree_sitter::Node;

/// Flatten a parse tree into a [`StructuralIndex`].
pub(super) fn extract(parsed: &ParsedSource<'_>) -> StructuralIndex {
    let root = parsed.root_node();
    let mut extractor = Extractor {
        source: parsed.source,
        language: parsed.language,
        entities: Vec::new(),
    };
    extractor.walk(root, &Scope::default());

    StructuralIndex {
        language: parsed.language,
        leading_imports_end: leading_imports_end(root, parsed.language, parsed.source),
        preamble_end: preamble_end(root, parsed.source),
        entities: extractor.entities,
    }
}

#[derive(Debug, Clone, Default)]
struct Scope {
    name: Option<String>,
    in_class: bool,
}

/// Structural meaning of a syntax node.
enum Shape<'t> {
    /// `outer` spans decorators/export; `definition` is the bare definition.
    Callable {
        outer: Node<'t>,
        definition: Node<'t>,
    },
    Class {
        outer: Node<'t>,
        definition: Node<'t>,
        name: String,
    },
    Import {
        node: Node<'t>,
        name: String,
    },
    /// `const f = () => {}`: a single declarator bound to a function value.
    Binding {
        outer: Node<'t>,
        declaration: Node<'t>,
        name: Node<'t>,
        value: Node<'t>,
    },
    /// A named scope that is not an entity itself, like a Rust inline `mod`.
    Scope { name: String, body: Node<'t> },
}

struct Extractor<'s> {
    source: &'s str,
    language: Language,
    entities: Vec<Entity>,
}

impl<'s> Extractor<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        self.source.get(node.byte_range()).unwrap_or("")
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> Option<&'s str> {
        node.child_by_field_name(field).map(|child| self.text(child))
    }

    fn walk(&mut self, node: Node<'_>, scope: &Scope) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, scope);
        }
    }

    fn visit(&mut self, node: Node<'_>, scope: &Scope) {
        match self.shape(node) {
            Some(Shape::Callable { outer, definition }) => {
                let Some(name_node) = definition.child_by_field_name("name") else {
                    self.walk(node, scope);
                    return;
                };
                let name = self.text(name_node).to_string();
                let kind = if self.declares_async(definition, name_node) {
                    EntityKind::AsyncFunction
                } else if scope.in_class {
                    EntityKind::Method
                } else {
                    EntityKind::Function
                };
                self.push(name.clone(), kind, outer, definition, scope);
                if let Some(body) = definition.child_by_field_name("body") {
                    let inner = Scope {
                        name: Some(name),
                        in_class: false,
                    };
                    self.walk(body, &inner);
                }
            }
            Some(Shape::Class {
                outer,
                definition,
                name,
            }) => {
                self.push(name.clone(), EntityKind::Class, outer, definition, scope);
                if let Some(body) = definition.child_by_field_name("body") {
                    let inner = Scope {
                        name: Some(name),
                        in_class: true,
                    };
                    self.walk(body, &inner);
                }
            }
            Some(Shape::Import { node, name }) => {
                self.push(name, EntityKind::Import, node, node, scope);
            }
            Some(Shape::Binding {
                outer,
                declaration,
                name,
                value,
            }) => {
                let name = self.text(name).to_string();
                let kind = if self.text(value).starts_with("async") {
                    EntityKind::AsyncFunction
                } else {
                    EntityKind::Function
                };
                self.push(name.clone(), kind, outer, declaration, scope);
                if let Some(body) = value.child_by_field_name("body") {
                    let inner = Scope {
                        name: Some(name),
                        in_class: false,
                    };
                    self.walk(body, &inner);
                }
            }
            Some(Shape::Scope { name, body }) => {
                let inner = Scope {
                    name: Some(name),
                    in_class: false,
                };
                self.walk(body, &inner);
            }
            None => self.walk(node, scope),
        }
    }

    fn shape<'t>(&self, node: Node<'t>) -> Option<Shape<'t>> {
        if is_import(node, self.language) {
            return Some(Shape::Import {
                node,
                name: self.import_name(node),
            });
        }

        match (self.language, node.kind()) {
            (Language::Python, "decorated_definition") => {
                let definition = node.child_by_field_name("definition")?;
                self.definition_shape(node, definition)
            }
            (Language::TypeScript | Language::Tsx | Language::JavaScript, "export_statement") => {
                let definition = node.child_by_field_name("declaration")?;
                self.definition_shape(node, definition)
            }
            (Language::Rust, "mod_item") => Some(Shape::Scope {
                name: self.field_text(node, "name")?.to_string(),
                body: node.child_by_field_name("body")?,
            }),
            _ => self.definition_shape(node, node),
        }
    }

    fn definition_shape<'t>(&self, outer: Node<'t>, definition: Node<'t>) -> Option<Shape<'t>> {
        let callable = matches!(
            (self.language, definition.kind()),
            (Language::Python, "function_definition")
                | (Language::Rust, "function_item" | "function_signature_item")
                | (
                    Language::TypeScript | Language::Tsx | Language::JavaScript,
                    "function_declaration" | "generator_function_declaration" | "method_definition"
                )
        );
        if callable {
            return Some(Shape::Callable { outer, definition });
        }

        let name = match (self.language, definition.kind()) {
            (Language::Python, "class_definition") | (Language::Rust, "trait_item") => {
                self.field_text(definition, "name")?.to_string()
            }
            (Language::Rust, "impl_item") => {
                let type_name = strip_generics(self.field_text(definition, "type")?);
                match self.field_text(definition, "trait") {
                    Some(trait_name) => format!("{} for {type_name}", strip_generics(trait_name)),
                    None => type_name.to_string(),
                }
            }
            (
                Language::TypeScript | Language::Tsx | Language::JavaScript,
                "class_declaration" | "abstract_class_declaration",
            ) => self.field_text(definition, "name")?.to_string(),
            (
                Language::TypeScript | Language::Tsx | Language::JavaScript,
                "lexical_declaration" | "variable_declaration",
            ) => return function_binding(outer, definition),
            _ => return None,
        };
        Some(Shape::Class {
            outer,
            definition,
            name,
        })
    }

    fn import_name(&self, node: Node<'_>) -> String {
        let name = match (self.language, node.kind()) {
            (Language::Python, "import_statement") => {
                let mut cursor = node.walk();
                let modules: Vec<&str> = node
                    .children_by_field_name("name", &mut cursor)
                    .map(|child| match child.kind() {
                        "aliased_import" => self.field_text(child, "name").unwrap_or(""),
                        _ => self.text(child),
                    })
                    .collect();
                Some(modules.join(", "))
            }
            (Language::Python, "import_from_statement") => {
                self.field_text(node, "module_name").map(str::to_string)
            }
            (Language::Python, "future_import_statement") => Some("__future__".to_string()),
            (Language::Rust, "use_declaration") => {
                self.field_text(node, "argument").map(str::to_string)
            }
            (Language::Rust, "extern_crate_declaration") => {
                self.field_text(node, "name").map(str::to_string)
            }
            _ => self
                .field_text(node, "source")
                .map(|source| source.trim_matches(['"', '\'', '`']).to_string()),
        };
        name.unwrap_or_else(|| self.text(node).trim().to_string())
    }

    /// `async` appears among the modifiers before the name.
    fn declares_async(&self, definition: Node<'_>, name: Node<'_>) -> bool {
        self.source
            .get(definition.start_byte()..name.start_byte())
            .unwrap_or("")
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .any(|token| token == "async")
    }

    fn push(
        &mut self,
        name: String,
        kind: EntityKind,
        outer: Node<'_>,
        definition: Node<'_>,
        scope: &Scope,
    ) {
        let byte_start = self.leading_start(outer);
        let byte_end = trim_trailing_whitespace(self.source, byte_start, outer.end_byte());
        let definition_start = definition.start_byte();

        let signature = self.source[definition_start..byte_end]
            .lines()
            .next()
            .unwrap_or("")
            .trim_end();
        let signature = match self.language {
            Language::Python => signature,
            _ => signature
                .strip_suffix("{}")
                .or_else(|| signature.strip_suffix('{'))
                .unwrap_or(signature)
                .trim_end(),
        };

        self.entities.push(Entity {
            name,
            kind,
            byte_start,
            byte_end,
            definition_start,
            line_start: layout::line_index(self.source, byte_start) + 1,
            line_end: layout::line_index(self.source, byte_end.saturating_sub(1).max(byte_start))
                + 1,
            parent: scope.name.clone(),
            signature: signature.to_string(),
            indent: layout::indentation(layout::line_at(self.source, byte_start)).to_string(),
        });
    }

    /// Pull attributes and doc comments directly above `node` into its range.
    fn leading_start(&self, node: Node<'_>) -> usize {
        let mut start = node.start_byte();
        let mut previous = node.prev_named_sibling();
        while let Some(sibling) = previous {
            let attached = layout::blank_gap(self.source, sibling.end_byte(), start) == Some(0)
                && self.is_leading_trivia(sibling);
            if !attached {
                break;
            }
            start = sibling.start_byte();
            previous = sibling.prev_named_sibling();
        }
        start
    }

    fn is_leading_trivia(&self, node: Node<'_>) -> bool {
        let text = self.text(node);
        match (self.language, node.kind()) {
            (Language::Rust, "attribute_item") => true,
            (Language::Rust, "line_comment") => text.starts_with("///") && !text.starts_with("////"),
            (Language::Rust, "block_comment") => text.starts_with("/**"),
            (Language::TypeScript | Language::Tsx | Language::JavaScript, "comment") => {
                text.starts_with("/**")
            }
            _ => false,
        }
    }
}

/// A declaration with exactly one declarator whose value is a function.
fn function_binding<'t>(outer: Node<'t>, declaration: Node<'t>) -> Option<Shape<'t>> {
    let mut cursor = declaration.walk();
    let mut declarators = declaration
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "variable_declarator");
    let declarator = declarators.next()?;
    if declarators.next().is_some() {
        return None;
    }

    let name = declarator.child_by_field_name("name")?;
    let value = declarator.child_by_field_name("value")?;
    let is_function = name.kind() == "identifier"
        && matches!(
            value.kind(),
            "arrow_function" | "function_expression" | "function" | "generator_function"
        );
    is_function.then_some(Shape::Binding {
        outer,
        declaration,
        name,
        value,
    })
}

fn is_import(node: Node<'_>, language: Language) -> bool {
    matches!(
        (language, node.kind()),
        (
            Language::Python,
            "import_statement" | "import_from_statement" | "future_import_statement"
        ) | (Language::Rust, "use_declaration" | "extern_crate_declaration")
            | (
                Language::TypeScript | Language::Tsx | Language::JavaScript,
                "import_statement"
            )
    )
}

fn is_comment(node: Node<'_>) -> bool {
    matches!(node.kind(), "comment" | "line_comment" | "block_comment")
}

/// Nodes that must stay above any import: docstrings, directives, shebangs
/// and crate-level attributes.
fn is_preamble_node(node: Node<'_>, source: &str) -> bool {
    match node.kind() {
        "inner_attribute_item" | "shebang" | "hash_bang_line" => true,
        "expression_statement" => {
            node.named_child_count() == 1
                && node
                    .named_child(0)
                    .is_some_and(|child| matches!(child.kind(), "string" | "concatenated_string"))
        }
        kind if matches!(kind, "comment" | "line_comment" | "block_comment") => {
            let text = source.get(node.byte_range()).unwrap_or("");
            text.starts_with("#!")
                || text.starts_with("//!")
                || text.starts_with("/*!")
                || text.contains("-*- coding")
        }
        _ => false,
    }
}

fn leading_imports_end(root: Node<'_>, language: Language, source: &str) -> Option<usize> {
    let mut end = None;
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if is_import(child, language) {
            // Trailing comments on the import's line stay with it.
            let line_end = layout::line_end(source, child.end_byte());
            end = Some(trim_trailing_whitespace(source, child.start_byte(), line_end));
        } else if end.is_some() {
            if !is_comment(child) {
                break;
            }
        } else if !(is_comment(child) || is_preamble_node(child, source)) {
            break;
        }
    }
    end
}

/// Line boundary after the file header.
///
/// Ordinary comments only count as header when a blank line separates them
/// from whatever follows; otherwise they document the next item.
fn preamble_end(root: Node<'_>, source: &str) -> usize {
    let mut end = 0;
    let mut pending_comment: Option<usize> = None;
    let mut first_item: Option<usize> = None;

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if let Some(comment_end) = pending_comment.take() {
            if detached(source, comment_end, child.start_byte()) {
                end = comment_end;
            }
        }
        if is_preamble_node(child, source) {
            end = child.end_byte();
        } else if is_comment(child) {
            pending_comment = Some(child.end_byte());
        } else {
            first_item = Some(child.start_byte());
            break;
        }
    }
    if let Some(comment_end) = pending_comment {
        if first_item.is_none() {
            end = comment_end;
        }
    }

    if end == 0 {
        0
    } else {
        layout::next_line_start(source, end)
    }
}

fn detached(source: &str, end: usize, next_start: usize) -> bool {
    layout::blank_gap(source, end, next_start).is_some_and(|blanks| blanks > 0)
}

fn trim_trailing_whitespace(source: &str, start: usize, end: usize) -> usize {
    let trimmed = source[start..end].trim_end();
    start + trimmed.len()
}

fn strip_generics(name: &str) -> &str {
    name.split('<').next().unwrap_or(name).trim()
}
