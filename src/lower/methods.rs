//! Callable table for the flow class plus a petgraph call graph between its
//! methods and module-level functions.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use tree_sitter::Node;

use crate::ir::types::{InstanceMethodLocation, Location, ParsedBubble, VariableId};
use crate::parse::syntax::{is_async, parameter_names, strip_parens};
use crate::parse::{FlowClass, ParsedSource, named_children, node_text, walk_descendants};

/// A callable the workflow builder can expand into.
#[derive(Debug, Clone)]
pub struct Callable<'t> {
    pub name: String,
    /// Class member (`this.name()`) rather than a module-level function.
    pub is_method: bool,
    /// The declaring node (method, field, function declaration or declarator).
    pub definition: Node<'t>,
    pub function: Node<'t>,
    pub body: Option<Node<'t>>,
    pub is_async: bool,
    pub parameters: Vec<String>,
}

impl Callable<'_> {
    pub fn body_location(&self) -> Option<Location> {
        self.body.map(Location::of)
    }
}

/// A resolved call site.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'t> {
    pub call: Node<'t>,
    pub is_this: bool,
}

pub struct CallGraph {
    pub graph: DiGraph<String, ()>,
    pub node_indices: HashMap<String, NodeIndex>,
}

pub struct MethodTable<'t> {
    callables: IndexMap<String, Callable<'t>>,
    calls: CallGraph,
}

impl<'t> MethodTable<'t> {
    pub fn build(parsed: &'t ParsedSource, class: Option<&FlowClass<'t>>) -> Self {
        let source = parsed.source();
        let mut callables: IndexMap<String, Callable<'t>> = IndexMap::new();

        for stmt in named_children(parsed.root()) {
            let decl = match stmt.kind() {
                "export_statement" => match stmt.child_by_field_name("declaration") {
                    Some(d) => d,
                    None => continue,
                },
                _ => stmt,
            };
            for callable in module_functions(decl, source) {
                callables.entry(callable.name.clone()).or_insert(callable);
            }
        }
        if let Some(class) = class {
            for method in class.methods(source) {
                let name = method.name(source).to_string();
                callables.insert(
                    name.clone(),
                    Callable {
                        name,
                        is_method: true,
                        definition: method.member,
                        function: method.function,
                        body: method.body,
                        is_async: method.is_async,
                        parameters: parameter_names(method.function, source),
                    },
                );
            }
        }

        let calls = CallGraph::build(&callables, source);
        tracing::debug!(
            callables = callables.len(),
            edges = calls.graph.edge_count(),
            "built method call graph"
        );
        MethodTable { callables, calls }
    }

    pub fn get(&self, name: &str) -> Option<&Callable<'t>> {
        self.callables.get(name)
    }

    pub fn callables(&self) -> impl Iterator<Item = &Callable<'t>> {
        self.callables.values()
    }

    /// Resolve `this.name(...)` or `name(...)` against the table.
    pub fn resolve_call(&self, call: Node<'t>, source: &str) -> Option<(&Callable<'t>, CallSite<'t>)> {
        let (name, is_this) = call_target(call, source)?;
        let callable = self.callables.get(name)?;
        if callable.is_method != is_this {
            return None;
        }
        Some((callable, CallSite { call, is_this }))
    }

    /// Names reachable from `name` through calls, excluding `name` unless it
    /// calls itself back.
    pub fn reachable_from(&self, name: &str) -> Vec<String> {
        let Some(&start) = self.calls.node_indices.get(name) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut dfs = Dfs::new(&self.calls.graph, start);
        while let Some(idx) = dfs.next(&self.calls.graph) {
            if idx != start {
                out.push(self.calls.graph[idx].clone());
            }
        }
        if self.calls.graph.find_edge(start, start).is_some()
            || self
                .calls
                .graph
                .neighbors_directed(start, petgraph::Direction::Incoming)
                .any(|p| out.contains(&self.calls.graph[p]))
        {
            out.push(name.to_string());
        }
        out
    }

    /// Whether the callable, or anything it transitively calls, contains a
    /// located bubble.
    pub fn contains_bubbles(&self, name: &str, bubbles: &BTreeMap<VariableId, ParsedBubble>) -> bool {
        let mut names = self.reachable_from(name);
        names.push(name.to_string());
        names.iter().any(|n| {
            self.callables
                .get(n)
                .and_then(|c| c.body_location())
                .is_some_and(|body| bubbles.values().any(|b| body.encloses(&b.location)))
        })
    }

    /// Definition span, body span and call lines of each class method other
    /// than `handle`.
    pub fn instance_method_locations(&self, source: &str) -> IndexMap<String, InstanceMethodLocation> {
        let mut invocations: HashMap<&str, Vec<usize>> = HashMap::new();
        for callable in self.callables.values() {
            let Some(body) = callable.body else {
                continue;
            };
            walk_descendants(body, |node| {
                if node.kind() != "call_expression" {
                    return;
                }
                if let Some((name, true)) = call_target(node, source) {
                    if let Some((key, _)) = self.callables.get_key_value(name) {
                        invocations
                            .entry(key.as_str())
                            .or_default()
                            .push(node.start_position().row + 1);
                    }
                }
            });
        }

        let mut out = IndexMap::new();
        for callable in self.callables.values() {
            if !callable.is_method || callable.name == "handle" {
                continue;
            }
            let mut lines = invocations.remove(callable.name.as_str()).unwrap_or_default();
            lines.sort_unstable();
            lines.dedup();
            out.insert(
                callable.name.clone(),
                InstanceMethodLocation {
                    definition: Location::of(callable.definition),
                    body: callable
                        .body_location()
                        .unwrap_or_else(|| Location::of(callable.function)),
                    invocation_lines: lines,
                    is_async: callable.is_async,
                    parameters: callable.parameters.clone(),
                },
            );
        }
        out
    }
}

impl CallGraph {
    fn build(callables: &IndexMap<String, Callable<'_>>, source: &str) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for name in callables.keys() {
            let idx = graph.add_node(name.clone());
            node_indices.insert(name.clone(), idx);
        }

        for (caller, callable) in callables {
            let Some(body) = callable.body else {
                continue;
            };
            let from = node_indices[caller];
            walk_descendants(body, |node| {
                if node.kind() != "call_expression" {
                    return;
                }
                let Some((name, is_this)) = call_target(node, source) else {
                    return;
                };
                let Some(target) = callables.get(name) else {
                    return;
                };
                if target.is_method != is_this {
                    return;
                }
                let to = node_indices[name];
                if graph.find_edge(from, to).is_none() {
                    graph.add_edge(from, to, ());
                }
            });
        }

        CallGraph { graph, node_indices }
    }
}

/// `(name, is_this)` of a call to `this.name(...)` or `name(...)`.
pub fn call_target<'s>(call: Node<'_>, source: &'s str) -> Option<(&'s str, bool)> {
    let function = strip_parens(call.child_by_field_name("function")?);
    match function.kind() {
        "identifier" => Some((node_text(function, source), false)),
        "member_expression" => {
            let object = function.child_by_field_name("object")?;
            if object.kind() != "this" {
                return None;
            }
            let property = function.child_by_field_name("property")?;
            Some((node_text(property, source), true))
        }
        _ => None,
    }
}

/// Function declarations and function-valued `const` bindings at module level.
fn module_functions<'t>(decl: Node<'t>, source: &str) -> Vec<Callable<'t>> {
    match decl.kind() {
        "function_declaration" | "generator_function_declaration" => {
            let Some(name) = decl.child_by_field_name("name") else {
                return Vec::new();
            };
            vec![Callable {
                name: node_text(name, source).to_string(),
                is_method: false,
                definition: decl,
                function: decl,
                body: decl.child_by_field_name("body"),
                is_async: is_async(decl),
                parameters: parameter_names(decl, source),
            }]
        }
        "lexical_declaration" | "variable_declaration" => named_children(decl)
            .into_iter()
            .filter(|d| d.kind() == "variable_declarator")
            .filter_map(|declarator| {
                let name = declarator.child_by_field_name("name")?;
                if name.kind() != "identifier" {
                    return None;
                }
                let value = strip_parens(declarator.child_by_field_name("value")?);
                if !matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                    return None;
                }
                Some(Callable {
                    name: node_text(name, source).to_string(),
                    is_method: false,
                    definition: declarator,
                    function: value,
                    body: value.child_by_field_name("body"),
                    is_async: is_async(value),
                    parameters: parameter_names(value, source),
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}
