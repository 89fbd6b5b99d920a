//! Closed classification of the statement and expression shapes the analyzer
//! understands. Anything else lands in an explicit `Other` arm and is treated
//! as opaque text by later phases.

use tree_sitter::Node;

use super::{named_children, node_text};

/// Statement shapes recognised by the workflow builder.
#[derive(Debug, Clone, Copy)]
pub enum Statement<'t> {
    If {
        node: Node<'t>,
        condition: Option<Node<'t>>,
        consequence: Option<Node<'t>>,
        /// The statement inside the `else` clause.
        alternative: Option<Node<'t>>,
    },
    For {
        node: Node<'t>,
        body: Option<Node<'t>>,
    },
    ForIn {
        node: Node<'t>,
        body: Option<Node<'t>>,
    },
    While {
        node: Node<'t>,
        condition: Option<Node<'t>>,
        body: Option<Node<'t>>,
    },
    Try {
        node: Node<'t>,
        body: Option<Node<'t>>,
        catch_body: Option<Node<'t>>,
        finally_body: Option<Node<'t>>,
    },
    Declaration {
        node: Node<'t>,
    },
    Expression {
        node: Node<'t>,
        expression: Option<Node<'t>>,
    },
    Return {
        node: Node<'t>,
        argument: Option<Node<'t>>,
    },
    Block {
        node: Node<'t>,
    },
    Other(Node<'t>),
}

impl<'t> Statement<'t> {
    pub fn classify(node: Node<'t>) -> Self {
        match node.kind() {
            "if_statement" => Statement::If {
                node,
                condition: node.child_by_field_name("condition"),
                consequence: node.child_by_field_name("consequence"),
                alternative: node
                    .child_by_field_name("alternative")
                    .and_then(|clause| named_children(clause).into_iter().next()),
            },
            "for_statement" => Statement::For {
                node,
                body: node.child_by_field_name("body"),
            },
            "for_in_statement" => Statement::ForIn {
                node,
                body: node.child_by_field_name("body"),
            },
            "while_statement" | "do_statement" => Statement::While {
                node,
                condition: node.child_by_field_name("condition"),
                body: node.child_by_field_name("body"),
            },
            "try_statement" => Statement::Try {
                node,
                body: node.child_by_field_name("body"),
                catch_body: node
                    .child_by_field_name("handler")
                    .and_then(|h| h.child_by_field_name("body")),
                finally_body: node
                    .child_by_field_name("finalizer")
                    .and_then(|f| f.child_by_field_name("body")),
            },
            "lexical_declaration" | "variable_declaration" => Statement::Declaration { node },
            "expression_statement" => Statement::Expression {
                node,
                expression: named_children(node).into_iter().next(),
            },
            "return_statement" => Statement::Return {
                node,
                argument: named_children(node).into_iter().next(),
            },
            "statement_block" => Statement::Block { node },
            _ => Statement::Other(node),
        }
    }

    pub fn node(&self) -> Node<'t> {
        match *self {
            Statement::If { node, .. }
            | Statement::For { node, .. }
            | Statement::ForIn { node, .. }
            | Statement::While { node, .. }
            | Statement::Try { node, .. }
            | Statement::Declaration { node }
            | Statement::Expression { node, .. }
            | Statement::Return { node, .. }
            | Statement::Block { node } => node,
            Statement::Other(node) => node,
        }
    }
}

/// Expression shapes the parameter extractor distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprKind {
    Identifier,
    Member,
    Subscript,
    String,
    Template,
    Number,
    Boolean,
    Array,
    Object,
    Other,
}

impl ExprKind {
    pub fn of(node: Node<'_>) -> Self {
        match node.kind() {
            "identifier" | "shorthand_property_identifier" => ExprKind::Identifier,
            "member_expression" => ExprKind::Member,
            "subscript_expression" => ExprKind::Subscript,
            "string" => ExprKind::String,
            "template_string" => ExprKind::Template,
            "number" => ExprKind::Number,
            "true" | "false" => ExprKind::Boolean,
            "array" => ExprKind::Array,
            "object" => ExprKind::Object,
            _ => ExprKind::Other,
        }
    }
}

/// A `new ClassName(args)` expression, optionally awaited and/or chained with
/// `.action()`.
#[derive(Debug, Clone, Copy)]
pub struct CtorExpr<'t> {
    /// The outermost node of the whole shape.
    pub outer: Node<'t>,
    pub new_expr: Node<'t>,
    pub arguments: Option<Node<'t>>,
    pub has_await: bool,
    pub has_action_call: bool,
}

impl<'t> CtorExpr<'t> {
    pub fn match_node(node: Node<'t>, source: &str) -> Option<Self> {
        let outer = node;
        let mut current = strip_parens(node);
        let mut has_await = false;
        let mut has_action_call = false;

        if current.kind() == "await_expression" {
            has_await = true;
            current = strip_parens(named_children(current).into_iter().next()?);
        }

        if current.kind() == "call_expression" {
            let function = current.child_by_field_name("function")?;
            if function.kind() != "member_expression" {
                return None;
            }
            let property = function.child_by_field_name("property")?;
            if node_text(property, source) != "action" {
                return None;
            }
            has_action_call = true;
            current = strip_parens(function.child_by_field_name("object")?);
            // `(await new X()).action()`
            if current.kind() == "await_expression" {
                has_await = true;
                current = strip_parens(named_children(current).into_iter().next()?);
            }
        }

        if current.kind() != "new_expression" {
            return None;
        }
        Some(CtorExpr {
            outer,
            new_expr: current,
            arguments: current.child_by_field_name("arguments"),
            has_await,
            has_action_call,
        })
    }

    /// The constructor identifier, e.g. `SlackBubble`.
    pub fn class_name<'s>(&self, source: &'s str) -> Option<&'s str> {
        let ctor = self.new_expr.child_by_field_name("constructor")?;
        if ctor.kind() != "identifier" {
            return None;
        }
        Some(node_text(ctor, source))
    }
}

pub fn strip_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match named_children(node).into_iter().next() {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Strip `await` and parentheses.
pub fn strip_await(node: Node<'_>) -> Node<'_> {
    let mut node = strip_parens(node);
    while node.kind() == "await_expression" {
        match named_children(node).into_iter().next() {
            Some(inner) => node = strip_parens(inner),
            None => break,
        }
    }
    node
}

/// A call `Promise.all([...])` / `Promise.allSettled([...])`; returns its first argument.
pub fn promise_all_argument<'t>(node: Node<'t>, source: &str) -> Option<Node<'t>> {
    let call = strip_await(node);
    if call.kind() != "call_expression" {
        return None;
    }
    let function = call.child_by_field_name("function")?;
    let callee = node_text(function, source);
    if callee != "Promise.all" && callee != "Promise.allSettled" {
        return None;
    }
    let args = call.child_by_field_name("arguments")?;
    named_children(args).into_iter().next()
}

/// Names bound by a binding pattern, in source order.
pub fn pattern_names<'t>(pattern: Node<'t>) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    collect_pattern_names(pattern, &mut out);
    out
}

fn collect_pattern_names<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => out.push(node),
        "pair_pattern" => {
            if let Some(value) = node.child_by_field_name("value") {
                collect_pattern_names(value, out);
            }
        }
        "object_assignment_pattern" | "assignment_pattern" => {
            if let Some(left) = node.child_by_field_name("left") {
                collect_pattern_names(left, out);
            }
        }
        "object_pattern" | "array_pattern" | "rest_pattern" => {
            for child in named_children(node) {
                collect_pattern_names(child, out);
            }
        }
        _ => {}
    }
}

/// Whether a function-like node carries the `async` keyword.
pub fn is_async(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == "async");
    found
}

/// Parameter names of a function-like node, as written (patterns kept verbatim).
pub fn parameter_names(node: Node<'_>, source: &str) -> Vec<String> {
    if let Some(single) = node.child_by_field_name("parameter") {
        return vec![node_text(single, source).to_string()];
    }
    let Some(params) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    named_children(params)
        .into_iter()
        .map(|p| {
            let pattern = p.child_by_field_name("pattern").unwrap_or(p);
            node_text(pattern, source).to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_source;

    fn first_statement_expr<'t>(root: Node<'t>) -> Node<'t> {
        let stmt = named_children(root).into_iter().next().unwrap();
        match Statement::classify(stmt) {
            Statement::Expression { expression, .. } => expression.unwrap(),
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn ctor_with_await_and_action() {
        let src = "async function f() {}\nawait new SlackBubble({ channel: 'x' }).action();\n";
        let parsed = parse_source(src).unwrap();
        let stmt = named_children(parsed.root()).into_iter().nth(1).unwrap();
        let expr = match Statement::classify(stmt) {
            Statement::Expression { expression, .. } => expression.unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        let ctor = CtorExpr::match_node(expr, parsed.source()).unwrap();
        assert!(ctor.has_await);
        assert!(ctor.has_action_call);
        assert_eq!(ctor.class_name(parsed.source()), Some("SlackBubble"));
    }

    #[test]
    fn bare_ctor() {
        let parsed = parse_source("new HttpBubble({ url: 'https://x' });\n").unwrap();
        let ctor = CtorExpr::match_node(first_statement_expr(parsed.root()), parsed.source()).unwrap();
        assert!(!ctor.has_await);
        assert!(!ctor.has_action_call);
    }

    #[test]
    fn other_method_is_not_action() {
        let parsed = parse_source("new HttpBubble({}).run();\n").unwrap();
        assert!(CtorExpr::match_node(first_statement_expr(parsed.root()), parsed.source()).is_none());
    }

    #[test]
    fn destructuring_names() {
        let parsed = parse_source("const { a, b: c, d = 1, ...rest } = obj;\n").unwrap();
        let decl = named_children(parsed.root()).into_iter().next().unwrap();
        let declarator = named_children(decl).into_iter().next().unwrap();
        let pattern = declarator.child_by_field_name("name").unwrap();
        let names: Vec<&str> = pattern_names(pattern)
            .into_iter()
            .map(|n| node_text(n, parsed.source()))
            .collect();
        assert_eq!(names, vec!["a", "c", "d", "rest"]);
    }
}
