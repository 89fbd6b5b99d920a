//! Dependency Graph Builder.
//!
//! Expands each located bubble's registry-declared sub-dependencies (plus an
//! agent's configured `tools` list) into a flat closure and a hierarchical
//! tree with deterministic ids.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::LazyLock;

use regex::Regex;

use crate::ir::types::{BubbleNodeType, DependencyGraphNode, ParsedBubble, VariableId};
use crate::registry::{BubbleDescriptor, CapabilityRegistry, DependencyInstance};

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name\s*:\s*['"`]([^'"`]+)['"`]"#).unwrap());
static STRING_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"`]([^'"`]+)['"`]"#).unwrap());

/// Fill `dependencies` and `dependency_graph` on every bubble.
pub fn attach_dependencies(
    bubbles: &mut BTreeMap<VariableId, ParsedBubble>,
    registry: &dyn CapabilityRegistry,
) {
    for bubble in bubbles.values_mut() {
        let flat = flatten_dependencies(bubble, registry);
        let tree = build_dependency_tree(bubble, registry);
        bubble.dependencies = Some(flat);
        bubble.dependency_graph = Some(tree);
    }
}

/// Registered tool names configured through an agent's `tools` parameter.
/// Object entries (`{ name: 'web-search-tool' }`) win over bare strings.
pub fn configured_tools(bubble: &ParsedBubble, registry: &dyn CapabilityRegistry) -> Vec<String> {
    let Some(text) = bubble.parameter("tools").and_then(|p| p.value.as_str()) else {
        return Vec::new();
    };
    let named: Vec<&str> = TOOL_NAME
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    let candidates: Vec<&str> = if named.is_empty() {
        STRING_ELEMENT
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    } else {
        named
    };
    let mut out: Vec<String> = Vec::new();
    for name in candidates {
        if registry.get(name).is_some() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Breadth-first closure of dependency names reachable from the bubble, in
/// first-discovery order, each name at most once and never the bubble itself.
pub fn flatten_dependencies(bubble: &ParsedBubble, registry: &dyn CapabilityRegistry) -> Vec<String> {
    let root = bubble.bubble_name.as_str();
    let mut seen: HashSet<String> = HashSet::from([root.to_string()]);
    let mut queue: VecDeque<String> = VecDeque::from([root.to_string()]);
    let mut out = Vec::new();

    while let Some(name) = queue.pop_front() {
        let Some(descriptor) = registry.get(&name) else {
            continue;
        };
        let mut next = descriptor.direct_dependency_names();
        if name == root && descriptor.is_agent {
            next.extend(configured_tools(bubble, registry));
        }
        for dep in next {
            if seen.insert(dep.clone()) {
                out.push(dep.clone());
                queue.push_back(dep);
            }
        }
    }
    out
}

/// Deterministic id for a non-root dependency node: a 32-bit string hash
/// over UTF-16 code units folded into `100000..1000000`.
pub fn hash_to_variable_id(unique_id: &str) -> VariableId {
    let mut hash: i32 = 0;
    for unit in unique_id.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    100_000 + VariableId::from(hash.unsigned_abs() % 900_000)
}

struct TreeBuilder<'a> {
    registry: &'a dyn CapabilityRegistry,
    ordinals: HashMap<(String, String), usize>,
    /// Bubble names on the current root-to-node path.
    path: Vec<String>,
}

pub fn build_dependency_tree(
    bubble: &ParsedBubble,
    registry: &dyn CapabilityRegistry,
) -> DependencyGraphNode {
    let mut builder = TreeBuilder {
        registry,
        ordinals: HashMap::new(),
        path: vec![bubble.bubble_name.clone()],
    };
    let unique_id = bubble.variable_id.to_string();
    let mut dependencies = Vec::new();
    if let Some(descriptor) = registry.get(&bubble.bubble_name) {
        let tools = if descriptor.is_agent {
            configured_tools(bubble, registry)
        } else {
            Vec::new()
        };
        dependencies = builder.children(descriptor, &tools, &unique_id);
    }
    DependencyGraphNode {
        name: bubble.bubble_name.clone(),
        variable_name: Some(bubble.variable_name.clone()),
        node_type: bubble.node_type,
        unique_id,
        variable_id: bubble.variable_id,
        dependencies,
    }
}

impl<'a> TreeBuilder<'a> {
    fn children(
        &mut self,
        descriptor: &BubbleDescriptor,
        tools: &[String],
        parent: &str,
    ) -> Vec<DependencyGraphNode> {
        let mut out = Vec::new();
        for spec in descriptor.dependency_specs() {
            for instance in spec.expanded_instances() {
                out.push(self.expand(&spec.name, &instance, parent));
            }
        }
        for tool in tools {
            out.push(self.expand(tool, &DependencyInstance::default(), parent));
        }
        out
    }

    fn expand(&mut self, name: &str, instance: &DependencyInstance, parent: &str) -> DependencyGraphNode {
        let ordinal = self
            .ordinals
            .entry((parent.to_string(), name.to_string()))
            .or_insert(0);
        *ordinal += 1;
        let unique_id = format!("{}.{}#{}", parent, name, ordinal);
        let registry = self.registry;
        let descriptor = registry.get(name);
        let node_type = descriptor.map(|d| d.node_type).unwrap_or(BubbleNodeType::Unknown);

        let dependencies = match descriptor {
            None => Vec::new(),
            Some(d) if self.path.iter().any(|p| p == name) => {
                if d.is_agent {
                    // Re-entered agent: keep only its configured tools.
                    self.path.push(name.to_string());
                    let tools: Vec<DependencyGraphNode> = instance
                        .tools
                        .iter()
                        .map(|tool| self.expand(tool, &DependencyInstance::default(), &unique_id))
                        .collect();
                    self.path.pop();
                    tools
                } else {
                    Vec::new()
                }
            }
            Some(d) => {
                self.path.push(name.to_string());
                let tools = if d.is_agent { instance.tools.clone() } else { Vec::new() };
                let children = self.children(d, &tools, &unique_id);
                self.path.pop();
                children
            }
        };

        DependencyGraphNode {
            name: name.to_string(),
            variable_name: instance.variable_name.clone(),
            node_type,
            variable_id: hash_to_variable_id(&unique_id),
            unique_id,
            dependencies,
        }
    }
}
