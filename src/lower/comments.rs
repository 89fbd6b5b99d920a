//! Description harvesting from comments directly above a statement.

use tree_sitter::Node;

use crate::parse::node_text;

/// Parents whose children are statement-like list items.
const LIST_PARENTS: &[&str] = &[
    "program",
    "statement_block",
    "class_body",
    "switch_case",
    "switch_default",
    "array",
    "object",
    "object_type",
    "interface_body",
];

/// Text of the contiguous comment run directly above `node`'s enclosing
/// statement, with comment markers stripped and lines joined by spaces.
/// A blank line between comment and statement breaks the run.
pub fn preceding_comment(node: Node<'_>, source: &str) -> Option<String> {
    let anchor = anchor_of(node);
    let mut boundary = anchor.start_position().row;
    let mut run: Vec<Node<'_>> = Vec::new();
    let mut current = anchor.prev_sibling();
    while let Some(sibling) = current {
        if !sibling.is_named() {
            // separators between list items
            current = sibling.prev_sibling();
            continue;
        }
        if sibling.kind() != "comment" {
            break;
        }
        if sibling.end_position().row + 1 < boundary {
            break;
        }
        if is_trailing(sibling) {
            break;
        }
        boundary = sibling.start_position().row;
        run.push(sibling);
        current = sibling.prev_sibling();
    }
    if run.is_empty() {
        return None;
    }
    run.reverse();
    let text = run
        .iter()
        .map(|c| clean_comment(node_text(*c, source)))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() { None } else { Some(text) }
}

/// The first ancestor-or-self that sits directly in a statement list.
fn anchor_of(node: Node<'_>) -> Node<'_> {
    let mut current = node;
    while let Some(parent) = current.parent() {
        if LIST_PARENTS.contains(&parent.kind()) {
            return current;
        }
        current = parent;
    }
    current
}

/// A comment on the same line as the code before it belongs to that code.
fn is_trailing(comment: Node<'_>) -> bool {
    let mut prev = comment.prev_sibling();
    while let Some(p) = prev {
        if p.is_named() {
            return p.kind() != "comment" && p.end_position().row == comment.start_position().row;
        }
        if p.end_position().row != comment.start_position().row {
            return false;
        }
        prev = p.prev_sibling();
    }
    false
}

/// Strip `//`, `/* */`, `/** */` markers and leading `*` on each line.
pub fn clean_comment(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(line) = raw.strip_prefix("//") {
        return line.trim_start_matches('/').trim().to_string();
    }
    let inner = raw
        .strip_prefix("/*")
        .map(|s| s.strip_suffix("*/").unwrap_or(s))
        .unwrap_or(raw);
    inner
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{named_children, parse_source};

    fn description_of_statement(src: &str, index: usize) -> Option<String> {
        let parsed = parse_source(src).unwrap();
        let stmt = named_children(parsed.root()).into_iter().nth(index).unwrap();
        preceding_comment(stmt, parsed.source())
    }

    #[test]
    fn joins_line_comment_run() {
        let src = "// Send the report\n// to the team channel\nconst a = 1;\n";
        assert_eq!(
            description_of_statement(src, 0).as_deref(),
            Some("Send the report to the team channel")
        );
    }

    #[test]
    fn strips_block_comment_stars() {
        let src = "/**\n * Fetch rows\n * from postgres\n */\nconst a = 1;\n";
        assert_eq!(description_of_statement(src, 0).as_deref(), Some("Fetch rows from postgres"));
    }

    #[test]
    fn blank_line_breaks_run() {
        let src = "// unrelated\n\nconst a = 1;\n";
        assert_eq!(description_of_statement(src, 0), None);
    }

    #[test]
    fn trailing_comment_belongs_to_previous_statement() {
        let src = "const a = 1; // about a\nconst b = 2;\n";
        assert_eq!(description_of_statement(src, 1), None);
    }

    #[test]
    fn nested_expression_uses_statement_comment() {
        let parsed = parse_source("// Post it\nawait new X({}).action();\n").unwrap();
        let stmt = named_children(parsed.root()).into_iter().next().unwrap();
        let expr = named_children(stmt).into_iter().next().unwrap();
        assert_eq!(preceding_comment(expr, parsed.source()).as_deref(), Some("Post it"));
    }
}
