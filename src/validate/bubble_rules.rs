//! Per-bubble constructor rules (V008).

use crate::error::FlowError;
use crate::lower::params::unquote;
use crate::parse::{ParsedSource, named_children, node_text, walk_descendants};
use crate::registry::CapabilityRegistry;

/// Registered bubbles built from an object literal must set every parameter
/// the registry marks required. Literals with a spread are not checked.
pub fn validate_bubble_parameters(parsed: &ParsedSource, registry: &dyn CapabilityRegistry) -> Vec<FlowError> {
    let source = parsed.source();
    let mut errors = Vec::new();

    walk_descendants(parsed.root(), |node| {
        if node.kind() != "new_expression" {
            return;
        }
        let Some(ctor) = node.child_by_field_name("constructor") else {
            return;
        };
        let Some(descriptor) = registry.bubble_for_class(node_text(ctor, source)) else {
            return;
        };
        let required: Vec<&str> = descriptor
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        if required.is_empty() {
            return;
        }
        let Some(object) = node
            .child_by_field_name("arguments")
            .and_then(|args| named_children(args).into_iter().next())
        else {
            return;
        };
        if object.kind() != "object" {
            return;
        }

        let mut present = Vec::new();
        for member in named_children(object) {
            match member.kind() {
                "spread_element" => return,
                "pair" | "method_definition" => {
                    let key = member
                        .child_by_field_name("key")
                        .or_else(|| member.child_by_field_name("name"));
                    if let Some(key) = key {
                        present.push(unquote(node_text(key, source)));
                    }
                }
                "shorthand_property_identifier" => present.push(node_text(member, source)),
                _ => {}
            }
        }

        for name in required {
            if !present.contains(&name) {
                errors.push(FlowError::validate(
                    "V008",
                    format!(
                        "{} is missing required parameter '{}'",
                        descriptor.class_name, name
                    ),
                    Some(node.start_position().row + 1),
                ));
            }
        }
    });

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::BubbleNodeType;
    use crate::parse::parse_source;
    use crate::registry::{BubbleDescriptor, BubbleRegistry};

    fn registry() -> BubbleRegistry {
        BubbleRegistry::from_descriptors([BubbleDescriptor::new(
            "postgresql",
            "PostgreSQLBubble",
            BubbleNodeType::Service,
        )
        .with_parameter("query", "string", true)
        .with_parameter("parameters", "array", false)])
    }

    fn lines(src: &str) -> Vec<Option<usize>> {
        let parsed = parse_source(src).unwrap();
        validate_bubble_parameters(&parsed, &registry())
            .into_iter()
            .map(|e| e.line)
            .collect()
    }

    #[test]
    fn required_parameter_present() {
        assert!(lines("new PostgreSQLBubble({ query: 'select 1' });\n").is_empty());
        assert!(lines("const query = 'x';\nnew PostgreSQLBubble({ query });\n").is_empty());
        assert!(lines("new PostgreSQLBubble({ 'query': 'select 1' });\n").is_empty());
    }

    #[test]
    fn required_parameter_missing() {
        assert_eq!(lines("const a = 1;\nnew PostgreSQLBubble({ parameters: [] });\n"), vec![Some(2)]);
    }

    #[test]
    fn spread_and_non_object_are_skipped() {
        assert!(lines("new PostgreSQLBubble({ ...base });\n").is_empty());
        assert!(lines("new PostgreSQLBubble(config);\n").is_empty());
    }
}
