use crate::language::Language;
use crate::ts::errors::TreeSitterError;
use tree_sitter::{Node, Parser, Tree};

/// Tree-sitter parser bound to one registered language.
pub struct SourceParser {
    parser: Parser,
    language: Language,
}

impl SourceParser {
    /// Create a parser for `language`.
    pub fn new(language: Language) -> Result<Self, TreeSitterError> {
        let mut parser = Parser::new();
        parser
            .set_language(&language.tree_sitter_language())
            .map_err(|_| TreeSitterError::LanguageSet { language })?;

        Ok(Self { parser, language })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Parse source code into a tree-sitter Tree.
    ///
    /// Always a fresh parse; no old tree is handed to tree-sitter.
    pub fn parse(&mut self, source: &str) -> Result<Tree, TreeSitterError> {
        self.parser
            .parse(source, None)
            .ok_or(TreeSitterError::ParseFailed {
                language: self.language,
            })
    }

    /// Parse source code and return the tree along with the source.
    pub fn parse_with_source<'a>(
        &mut self,
        source: &'a str,
    ) -> Result<ParsedSource<'a>, TreeSitterError> {
        let tree = self.parse(source)?;
        Ok(ParsedSource {
            source,
            tree,
            language: self.language,
        })
    }
}

/// A parsed source file with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
    pub language: Language,
}

impl<'a> ParsedSource<'a> {
    /// Get the root node of the tree.
    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Check if the tree contains any ERROR or MISSING nodes.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// All ERROR and MISSING nodes, in document order.
    pub fn error_nodes(&self) -> Vec<ErrorNode> {
        let mut errors = Vec::new();
        collect_error_nodes(self.tree.root_node(), self.source, &mut errors);
        errors
    }
}

/// Information about an ERROR or MISSING node in the parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNode {
    pub byte_start: usize,
    pub byte_end: usize,
    pub start_point: tree_sitter::Point,
    pub end_point: tree_sitter::Point,
    /// Node inserted by error recovery (e.g. a missing `)`).
    pub missing: bool,
    /// Token kind for MISSING nodes, offending text for ERROR nodes.
    pub token: String,
}

impl ErrorNode {
    /// Parser message in the style of "unexpected ..." / "missing ...".
    pub fn message(&self) -> String {
        if self.missing {
            format!("missing \"{}\"", self.token)
        } else if self.token.is_empty() {
            "unexpected end of input".to_string()
        } else {
            format!("unexpected \"{}\"", self.token)
        }
    }
}

const MAX_TOKEN_PREVIEW: usize = 40;

fn collect_error_nodes(node: Node<'_>, source: &str, errors: &mut Vec<ErrorNode>) {
    if node.is_error() || node.is_missing() {
        let token = if node.is_missing() {
            node.kind().to_string()
        } else {
            preview(source.get(node.byte_range()).unwrap_or(""))
        };
        errors.push(ErrorNode {
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            start_point: node.start_position(),
            end_point: node.end_position(),
            missing: node.is_missing(),
            token,
        });
    }

    // Subtrees without errors need no descent.
    if !node.has_error() {
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, source, errors);
    }
}

fn preview(text: &str) -> String {
    let first_line = text.trim().lines().next().unwrap_or("");
    if first_line.chars().count() > MAX_TOKEN_PREVIEW {
        let truncated: String = first_line.chars().take(MAX_TOKEN_PREVIEW).collect();
        format!("{truncated}...")
    } else {
        first_line.to_string()
    }
}
