//! Credential rollup over located bubbles and their dependency closure.

use std::collections::{BTreeMap, BTreeSet};

use super::dependencies::flatten_dependencies;
use crate::ir::types::{ParsedBubble, VariableId};
use crate::registry::CapabilityRegistry;

/// Sorted credential names each bubble needs, counting every bubble it
/// depends on. Bubbles needing none are omitted.
pub fn required_credentials(
    bubbles: &BTreeMap<VariableId, ParsedBubble>,
    registry: &dyn CapabilityRegistry,
) -> BTreeMap<VariableId, Vec<String>> {
    let mut out = BTreeMap::new();
    for (id, bubble) in bubbles {
        let dependencies = match &bubble.dependencies {
            Some(deps) => deps.clone(),
            None => flatten_dependencies(bubble, registry),
        };
        let credentials: BTreeSet<String> = std::iter::once(bubble.bubble_name.as_str())
            .chain(dependencies.iter().map(String::as_str))
            .filter_map(|name| registry.get(name))
            .flat_map(|d| d.credentials.iter().cloned())
            .collect();
        if !credentials.is_empty() {
            out.insert(*id, credentials.into_iter().collect());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{BubbleNodeType, Location};
    use crate::registry::{BubbleDescriptor, BubbleRegistry};

    fn bubble(id: VariableId, name: &str, deps: Option<Vec<String>>) -> ParsedBubble {
        ParsedBubble {
            variable_id: id,
            variable_name: format!("b{}", id),
            bubble_name: name.into(),
            class_name: String::new(),
            parameters: Vec::new(),
            has_await: false,
            has_action_call: false,
            node_type: BubbleNodeType::Service,
            location: Location::default(),
            description: None,
            dependencies: deps,
            dependency_graph: None,
        }
    }

    #[test]
    fn rolls_up_dependency_credentials() {
        let registry = BubbleRegistry::from_descriptors([
            BubbleDescriptor::new("web-search-tool", "WebSearchTool", BubbleNodeType::Tool)
                .with_dependencies(&["firecrawl"]),
            BubbleDescriptor::new("firecrawl", "FirecrawlBubble", BubbleNodeType::Service)
                .with_credentials(&["FIRECRAWL_API_KEY"]),
            BubbleDescriptor::new("slack", "SlackBubble", BubbleNodeType::Service)
                .with_credentials(&["SLACK_CRED", "SLACK_CRED"]),
            BubbleDescriptor::new("http", "HttpBubble", BubbleNodeType::Service),
        ]);
        let bubbles = BTreeMap::from([
            (1, bubble(1, "web-search-tool", None)),
            (2, bubble(2, "slack", Some(Vec::new()))),
            (3, bubble(3, "http", None)),
        ]);
        let creds = required_credentials(&bubbles, &registry);
        assert_eq!(creds[&1], vec!["FIRECRAWL_API_KEY"]);
        assert_eq!(creds[&2], vec!["SLACK_CRED"]);
        assert!(!creds.contains_key(&3));
    }
}
