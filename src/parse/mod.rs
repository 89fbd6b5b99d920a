//! Parse phase: TypeScript source → tree-sitter AST + lexical scope tree.

pub mod flow_class;
pub mod scope;
pub mod syntax;

pub use flow_class::{ClassMethod, FlowClass, find_flow_classes};
pub use scope::{IdCounter, Scope, ScopeId, ScopeInfo, ScopeKind, ScopeTree, Variable};

use std::collections::HashMap;

use tree_sitter::{Node, Parser, Tree};

use crate::error::FlowError;

/// One parse of one source revision: the text, its syntax tree and scope tree.
///
/// Nothing in here is mutated after construction; edits produce a new
/// `ParsedSource` through a full re-parse.
pub struct ParsedSource {
    source: String,
    tree: Tree,
    scopes: ScopeTree,
}

impl std::fmt::Debug for ParsedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedSource")
            .field("bytes", &self.source.len())
            .field("scopes", &self.scopes.scopes().len())
            .field("variables", &self.scopes.variables().len())
            .finish()
    }
}

impl ParsedSource {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    /// Source text covered by `node`.
    pub fn text(&self, node: Node<'_>) -> &str {
        node_text(node, &self.source)
    }

    pub fn line_count(&self) -> usize {
        line_count(&self.source)
    }
}

/// Parse source text and build its scope tree with a fresh id counter, so
/// unchanged text always yields the same variable ids.
pub fn parse_source(source: &str) -> Result<ParsedSource, Vec<FlowError>> {
    let tree = parse_tree(source)?;
    if let Some(err) = first_syntax_error(tree.root_node(), source) {
        return Err(vec![err]);
    }
    let mut ids = IdCounter::new();
    let scopes = ScopeTree::build(tree.root_node(), source, &mut ids);
    tracing::debug!(
        scopes = scopes.scopes().len(),
        variables = scopes.variables().len(),
        "parsed flow source"
    );
    Ok(ParsedSource {
        source: source.to_string(),
        tree,
        scopes,
    })
}

fn parse_tree(source: &str) -> Result<Tree, Vec<FlowError>> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
        .map_err(|e| vec![FlowError::syntax(format!("Failed to load TypeScript grammar: {}", e), 1)])?;
    parser
        .parse(source, None)
        .ok_or_else(|| vec![FlowError::syntax("TypeScript parser produced no tree", 1)])
}

/// First `ERROR` or `MISSING` node in document order, as a line-tagged error.
fn first_syntax_error(root: Node<'_>, source: &str) -> Option<FlowError> {
    if !root.has_error() {
        return None;
    }
    let node = find_error_node(root)?;
    let line = node.start_position().row + 1;
    let message = if node.is_missing() {
        format!("Syntax error: missing '{}'", node.kind())
    } else {
        let snippet: String = node_text(node, source)
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(40)
            .collect();
        if snippet.trim().is_empty() {
            "Syntax error: unexpected token".to_string()
        } else {
            format!("Syntax error: unexpected '{}'", snippet.trim())
        }
    };
    Some(FlowError::syntax(message, line))
}

fn find_error_node(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = find_error_node(child) {
            return Some(found);
        }
    }
    None
}

/// Extract text content from a tree-sitter node; empty if the range is not valid UTF-8.
pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or_else(|e| {
        tracing::debug!(
            "UTF-8 extraction failed at {}:{}: {}",
            node.start_position().row + 1,
            node.start_position().column,
            e
        );
        ""
    })
}

/// Named children, skipping comments.
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

/// Pre-order visit of `node` and every descendant.
pub fn walk_descendants<'t>(node: Node<'t>, mut visit: impl FnMut(Node<'t>)) {
    let mut cursor = node.walk();
    loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

/// Local name → exported name for each value imported from `package`, so
/// `import { SlackBubble as Slack }` maps `Slack` to `SlackBubble`.
pub fn package_imports(root: Node<'_>, source: &str, package: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for stmt in named_children(root) {
        if stmt.kind() != "import_statement" {
            continue;
        }
        let Some(from) = stmt.child_by_field_name("source") else {
            continue;
        };
        let module = node_text(from, source).trim_matches(|c| matches!(c, '\'' | '"' | '`'));
        if module != package {
            continue;
        }
        walk_descendants(stmt, |node| {
            if node.kind() != "import_specifier" {
                return;
            }
            let Some(name) = node.child_by_field_name("name") else {
                return;
            };
            let original = node_text(name, source).to_string();
            let local = node
                .child_by_field_name("alias")
                .map(|a| node_text(a, source).to_string())
                .unwrap_or_else(|| original.clone());
            out.insert(local, original);
        });
    }
    out
}

/// All children including anonymous tokens.
pub fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub fn line_count(source: &str) -> usize {
    source.lines().count().max(1)
}
