//! Bubble Locator: one pre-order pass over the AST that records every
//! instantiation of a registered bubble class.
//!
//! Recognised shapes:
//! - `const name = <ctor>` (named, id from the scope tree)
//! - `<ctor>;` expression statements
//! - `(...) => <ctor>` concise arrow bodies
//! - `return <ctor>;`
//! - `Promise.all([<ctor>, ...])` elements
//! - `target = <ctor>` assignments
//!
//! Everything except the first shape gets a synthetic negative id.

use std::collections::{BTreeMap, HashMap};

use tree_sitter::Node;

use super::comments::preceding_comment;
use super::params::{extract_parameters, resolve_references};
use crate::config::AnalyzerOptions;
use crate::error::FlowError;
use crate::ir::types::{Location, ParsedBubble, VariableId};
use crate::parse::syntax::{CtorExpr, promise_all_argument};
use crate::parse::{ParsedSource, named_children, node_text, package_imports};
use crate::registry::{BubbleDescriptor, CapabilityRegistry};

/// How a located constructor is bound.
enum Binding<'t> {
    /// `const name = ...`: resolved through the scope tree.
    Named(Node<'t>),
    /// Anonymous, optionally labelled by an assignment target or pattern.
    Anonymous(Option<String>),
}

struct Locator<'a, 't> {
    parsed: &'t ParsedSource,
    registry: &'a dyn CapabilityRegistry,
    /// Local names of classes imported from the bubble package.
    imports: HashMap<String, String>,
    next_anonymous: VariableId,
    bubbles: BTreeMap<VariableId, ParsedBubble>,
}

/// Locate every registered bubble instantiation in `parsed`.
///
/// A named binding the scope tree cannot resolve is fatal (`X001`): every
/// located bubble must carry a valid id.
pub fn locate_bubbles(
    parsed: &ParsedSource,
    registry: &dyn CapabilityRegistry,
    options: &AnalyzerOptions,
) -> Result<BTreeMap<VariableId, ParsedBubble>, Vec<FlowError>> {
    let mut locator = Locator {
        parsed,
        registry,
        imports: package_imports(parsed.root(), parsed.source(), &options.bubble_package),
        next_anonymous: -1,
        bubbles: BTreeMap::new(),
    };

    let mut cursor = parsed.root().walk();
    loop {
        let node = cursor.node();
        locator.visit(node).map_err(|e| vec![e])?;
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                tracing::debug!(bubbles = locator.bubbles.len(), "located bubbles");
                return Ok(locator.bubbles);
            }
        }
    }
}

impl<'t> Locator<'_, 't> {
    fn source(&self) -> &'t str {
        self.parsed.source()
    }

    fn visit(&mut self, node: Node<'t>) -> Result<(), FlowError> {
        let source = self.source();
        match node.kind() {
            "variable_declarator" => {
                let (Some(name), Some(value)) = (
                    node.child_by_field_name("name"),
                    node.child_by_field_name("value"),
                ) else {
                    return Ok(());
                };
                let binding = if name.kind() == "identifier" {
                    Binding::Named(name)
                } else {
                    Binding::Anonymous(None)
                };
                self.record(value, binding)
            }
            "expression_statement" | "return_statement" => {
                match named_children(node).into_iter().next() {
                    Some(expr) => self.record(expr, Binding::Anonymous(None)),
                    None => Ok(()),
                }
            }
            "arrow_function" => match node.child_by_field_name("body") {
                Some(body) if body.kind() != "statement_block" => {
                    self.record(body, Binding::Anonymous(None))
                }
                _ => Ok(()),
            },
            "assignment_expression" => {
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return Ok(());
                };
                let target = node_text(left, source).to_string();
                self.record(right, Binding::Anonymous(Some(target)))
            }
            "call_expression" => {
                let Some(array) = promise_all_argument(node, source) else {
                    return Ok(());
                };
                if array.kind() != "array" {
                    return Ok(());
                }
                for element in named_children(array) {
                    self.record(element, Binding::Anonymous(None))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn record(&mut self, expr: Node<'t>, binding: Binding<'t>) -> Result<(), FlowError> {
        let source = self.source();
        let Some(ctor) = CtorExpr::match_node(expr, source) else {
            return Ok(());
        };
        let Some(local) = ctor.class_name(source) else {
            return Ok(());
        };
        let Some((class_name, descriptor)) = resolve_class(local, &self.imports, self.registry) else {
            return Ok(());
        };

        let line = expr.start_position().row + 1;
        let (variable_id, variable_name) = match binding {
            Binding::Named(name_node) => {
                let name = node_text(name_node, source);
                let scopes = self.parsed.scopes();
                let id = scopes
                    .variable_at(name, Location::of(name_node))
                    .map(|v| v.id)
                    .or_else(|| scopes.resolve_variable(name, name_node.start_position().row + 1))
                    .ok_or_else(|| {
                        FlowError::extract(
                            "X001",
                            format!(
                                "Bubble variable '{}' has no binding in the scope tree",
                                name
                            ),
                            Some(line),
                        )
                    })?;
                (id, name.to_string())
            }
            Binding::Anonymous(label) => {
                let id = self.next_anonymous;
                self.next_anonymous -= 1;
                let name = label.unwrap_or_else(|| format!("_anonymous_{}_{}", class_name, -id));
                (id, name)
            }
        };

        let mut parameters = extract_parameters(ctor.arguments, source);
        resolve_references(&mut parameters, self.parsed.scopes(), line);

        tracing::trace!(
            variable_id,
            class = %class_name,
            line,
            "located bubble"
        );
        self.bubbles.insert(
            variable_id,
            ParsedBubble {
                variable_id,
                variable_name,
                bubble_name: descriptor.name.clone(),
                class_name,
                parameters,
                has_await: ctor.has_await,
                has_action_call: ctor.has_action_call,
                node_type: descriptor.node_type,
                location: Location::of(ctor.outer),
                description: preceding_comment(expr, source),
                dependencies: None,
                dependency_graph: None,
            },
        );
        Ok(())
    }
}

/// Registered class behind a constructor name, following import aliases
/// first. Returns the registered class name with its descriptor.
pub fn resolve_class<'r>(
    local: &str,
    imports: &HashMap<String, String>,
    registry: &'r dyn CapabilityRegistry,
) -> Option<(String, &'r BubbleDescriptor)> {
    if let Some(original) = imports.get(local) {
        if let Some(descriptor) = registry.bubble_for_class(original) {
            return Some((original.clone(), descriptor));
        }
    }
    registry
        .bubble_for_class(local)
        .map(|descriptor| (local.to_string(), descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{BubbleNodeType, ParameterType};
    use crate::parse::parse_source;
    use crate::registry::{BubbleDescriptor, BubbleRegistry};

    fn registry() -> BubbleRegistry {
        BubbleRegistry::from_descriptors([
            BubbleDescriptor::new("slack", "SlackBubble", BubbleNodeType::Service),
            BubbleDescriptor::new("http", "HttpBubble", BubbleNodeType::Service),
        ])
    }

    fn locate(src: &str) -> BTreeMap<VariableId, ParsedBubble> {
        let parsed = parse_source(src).unwrap();
        locate_bubbles(&parsed, &registry(), &AnalyzerOptions::default()).unwrap()
    }

    #[test]
    fn anonymous_statement_gets_minus_one() {
        let bubbles = locate("await new SlackBubble({ channel: 'general' }).action();\n");
        let bubble = &bubbles[&-1];
        assert!(bubble.has_await);
        assert!(bubble.has_action_call);
        assert_eq!(bubble.variable_name, "_anonymous_SlackBubble_1");
        assert_eq!(bubble.bubble_name, "slack");
    }

    #[test]
    fn named_binding_uses_scope_id() {
        let src = "const channel = 'general';\n// Notify the team\nconst post = new SlackBubble({ channel });\n";
        let parsed = parse_source(src).unwrap();
        let bubbles = locate_bubbles(&parsed, &registry(), &AnalyzerOptions::default()).unwrap();
        let post_id = parsed.scopes().resolve_variable("post", 3).unwrap();
        let channel_id = parsed.scopes().resolve_variable("channel", 3).unwrap();
        let bubble = &bubbles[&post_id];
        assert_eq!(bubble.variable_name, "post");
        assert!(!bubble.has_await);
        assert_eq!(bubble.description.as_deref(), Some("Notify the team"));
        let param = bubble.parameter("channel").unwrap();
        assert_eq!(param.param_type, ParameterType::Variable);
        assert_eq!(param.variable_id, Some(channel_id));
    }

    #[test]
    fn all_shapes_are_found_in_source_order() {
        let src = r#"const make = () => new HttpBubble({ url: 'a' });
function f() {
  return new HttpBubble({ url: 'b' });
}
let later;
later = new SlackBubble({ channel: 'c' });
await Promise.all([new HttpBubble({ url: 'd' }).action(), new HttpBubble({ url: 'e' }).action()]);
new Unregistered({});
"#;
        let bubbles = locate(src);
        let ids: Vec<VariableId> = bubbles.keys().rev().copied().collect();
        assert_eq!(ids, vec![-1, -2, -3, -4, -5]);
        assert_eq!(bubbles[&-3].variable_name, "later");
        let urls: Vec<_> = [-1, -2, -4, -5]
            .iter()
            .map(|id| bubbles[id].parameter("url").unwrap().value.clone())
            .collect();
        assert_eq!(urls, vec!["a", "b", "d", "e"]);
    }

    #[test]
    fn aliased_import_resolves_to_registered_class() {
        let src = "import { SlackBubble as Slack } from '@bubblelab/bubble-core';\nawait new Slack({ operation: 'send_message' }).action();\n";
        let bubbles = locate(src);
        let bubble = &bubbles[&-1];
        assert_eq!(bubble.class_name, "SlackBubble");
        assert_eq!(bubble.bubble_name, "slack");
        assert_eq!(bubble.variable_name, "_anonymous_SlackBubble_1");
    }

    #[test]
    fn alias_from_another_package_is_not_followed() {
        let src = "import { SlackBubble as Slack } from 'some-other-lib';\nnew Slack({});\n";
        assert!(locate(src).is_empty());
    }

    #[test]
    fn location_spans_await_and_action() {
        let bubbles = locate("const r = await new HttpBubble({}).action();\n");
        let bubble = bubbles.values().next().unwrap();
        assert_eq!(bubble.location.start_col, 10);
        assert_eq!(bubble.location.end_col, 43);
    }
}
