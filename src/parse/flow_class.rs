//! Discovery of the flow class: the top-level class extending the flow base
//! class, its generic trigger argument, its members and its `handle` method.

use tree_sitter::Node;

use super::syntax::{is_async, strip_parens};
use super::{named_children, node_text};

/// A top-level class whose `extends` clause names the flow base class.
#[derive(Debug, Clone, Copy)]
pub struct FlowClass<'t> {
    pub node: Node<'t>,
    pub name: Node<'t>,
    pub exported: bool,
    /// First generic argument of the base class, e.g. `'webhook/http'`.
    pub type_argument: Option<Node<'t>>,
    pub body: Node<'t>,
}

/// A callable class member: a method, or a field initialised with an arrow
/// function or function expression.
#[derive(Debug, Clone, Copy)]
pub struct ClassMethod<'t> {
    pub name: Node<'t>,
    /// The member declaration (`method_definition` or field definition).
    pub member: Node<'t>,
    /// The function-like node that owns parameters and body.
    pub function: Node<'t>,
    pub body: Option<Node<'t>>,
    pub is_async: bool,
}

impl<'t> FlowClass<'t> {
    pub fn name<'s>(&self, source: &'s str) -> &'s str {
        node_text(self.name, source)
    }

    pub fn line(&self) -> usize {
        self.node.start_position().row + 1
    }

    /// Callable members in declaration order.
    pub fn methods(&self, source: &str) -> Vec<ClassMethod<'t>> {
        let mut out = Vec::new();
        for member in named_children(self.body) {
            let Some(name) = member.child_by_field_name("name") else {
                continue;
            };
            match member.kind() {
                "method_definition" => {
                    if node_text(name, source) == "constructor" {
                        continue;
                    }
                    out.push(ClassMethod {
                        name,
                        member,
                        function: member,
                        body: member.child_by_field_name("body"),
                        is_async: is_async(member),
                    });
                }
                "public_field_definition" | "field_definition" => {
                    let Some(value) = member.child_by_field_name("value").map(strip_parens) else {
                        continue;
                    };
                    if matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                        out.push(ClassMethod {
                            name,
                            member,
                            function: value,
                            body: value.child_by_field_name("body"),
                            is_async: is_async(value),
                        });
                    }
                }
                _ => {}
            }
        }
        out
    }

    pub fn method(&self, name: &str, source: &str) -> Option<ClassMethod<'t>> {
        self.methods(source)
            .into_iter()
            .find(|m| node_text(m.name, source) == name)
    }

    pub fn handle(&self, source: &str) -> Option<ClassMethod<'t>> {
        self.method("handle", source)
    }

    /// Initialiser of a non-function class field, e.g. `cronSchedule`.
    pub fn field_value(&self, name: &str, source: &str) -> Option<Node<'t>> {
        named_children(self.body)
            .into_iter()
            .filter(|m| matches!(m.kind(), "public_field_definition" | "field_definition"))
            .find(|m| {
                m.child_by_field_name("name")
                    .is_some_and(|n| node_text(n, source) == name)
            })
            .and_then(|m| m.child_by_field_name("value"))
    }
}

impl<'t> ClassMethod<'t> {
    pub fn name<'s>(&self, source: &'s str) -> &'s str {
        node_text(self.name, source)
    }

    /// Formal parameter nodes (`required_parameter` / `optional_parameter`,
    /// or the bare identifier of a single-parameter arrow).
    pub fn parameters(&self) -> Vec<Node<'t>> {
        if let Some(single) = self.function.child_by_field_name("parameter") {
            return vec![single];
        }
        self.function
            .child_by_field_name("parameters")
            .map(named_children)
            .unwrap_or_default()
    }

    /// Declared return type annotation text, without the leading colon.
    pub fn return_type<'s>(&self, source: &'s str) -> Option<&'s str> {
        let annotation = self.function.child_by_field_name("return_type")?;
        let text = node_text(annotation, source).trim_start();
        Some(text.strip_prefix(':').unwrap_or(text).trim())
    }
}

/// Every top-level class whose `extends` clause names `base_class`, in source order.
pub fn find_flow_classes<'t>(root: Node<'t>, source: &str, base_class: &str) -> Vec<FlowClass<'t>> {
    let mut out = Vec::new();
    for stmt in named_children(root) {
        let (class, exported) = match stmt.kind() {
            "export_statement" => match stmt.child_by_field_name("declaration") {
                Some(decl) => (decl, true),
                None => continue,
            },
            _ => (stmt, false),
        };
        if !matches!(class.kind(), "class_declaration" | "abstract_class_declaration") {
            continue;
        }
        let (Some(name), Some(body)) = (
            class.child_by_field_name("name"),
            class.child_by_field_name("body"),
        ) else {
            continue;
        };
        let Some(type_argument) = extends_base(class, source, base_class) else {
            continue;
        };
        out.push(FlowClass {
            node: class,
            name,
            exported,
            type_argument,
            body,
        });
    }
    out
}

/// `Some(first_type_argument)` when `class` extends `base_class`.
fn extends_base<'t>(class: Node<'t>, source: &str, base_class: &str) -> Option<Option<Node<'t>>> {
    let heritage = named_children(class)
        .into_iter()
        .find(|c| c.kind() == "class_heritage")?;
    let extends = named_children(heritage)
        .into_iter()
        .find(|c| c.kind() == "extends_clause")?;
    let value = extends.child_by_field_name("value")?;
    if node_text(value, source) != base_class {
        return None;
    }
    let type_argument = extends
        .child_by_field_name("type_arguments")
        .and_then(|args| named_children(args).into_iter().next());
    Some(type_argument)
}
