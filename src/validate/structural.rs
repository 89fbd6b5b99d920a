//! Flow-contract structural validation rules (V001–V007).

use std::collections::HashSet;

use tree_sitter::Node;

use crate::config::AnalyzerOptions;
use crate::error::FlowError;
use crate::parse::{FlowClass, ParsedSource, find_flow_classes, node_text, package_imports, walk_descendants};
use crate::registry::CapabilityRegistry;

/// Run all structural validation rules. Returns all errors found.
pub fn validate_structural(
    parsed: &ParsedSource,
    registry: &dyn CapabilityRegistry,
    options: &AnalyzerOptions,
) -> Vec<FlowError> {
    let mut errors = Vec::new();
    let source = parsed.source();
    let classes = find_flow_classes(parsed.root(), source, &options.flow_base_class);

    v001_flow_class_present(&classes, options, &mut errors);
    v002_single_flow_class(&classes, source, &mut errors);
    if let Some(class) = classes.first() {
        v003_flow_class_exported(class, source, &mut errors);
        v004_to_v006_handle_contract(class, source, &mut errors);
    }
    v007_bubble_classes_registered(parsed, registry, options, &mut errors);

    errors
}

fn v001_flow_class_present(classes: &[FlowClass<'_>], options: &AnalyzerOptions, errors: &mut Vec<FlowError>) {
    if classes.is_empty() {
        errors.push(FlowError::validate(
            "V001",
            format!("No class extending {} found", options.flow_base_class),
            None,
        ));
    }
}

fn v002_single_flow_class(classes: &[FlowClass<'_>], source: &str, errors: &mut Vec<FlowError>) {
    for extra in classes.iter().skip(1) {
        errors.push(FlowError::validate(
            "V002",
            format!(
                "Only one flow class is allowed per script, found another: '{}'",
                extra.name(source)
            ),
            Some(extra.line()),
        ));
    }
}

fn v003_flow_class_exported(class: &FlowClass<'_>, source: &str, errors: &mut Vec<FlowError>) {
    if !class.exported {
        errors.push(FlowError::validate(
            "V003",
            format!("Flow class '{}' must be exported", class.name(source)),
            Some(class.line()),
        ));
    }
}

fn v004_to_v006_handle_contract(class: &FlowClass<'_>, source: &str, errors: &mut Vec<FlowError>) {
    let Some(handle) = class.handle(source) else {
        errors.push(FlowError::validate(
            "V004",
            format!("Flow class '{}' must implement a handle method", class.name(source)),
            Some(class.line()),
        ));
        return;
    };
    let line = handle.member.start_position().row + 1;

    if !handle.is_async {
        errors.push(FlowError::validate("V005", "handle must be declared async", Some(line)));
    }
    if let Some(return_type) = handle.return_type(source) {
        if !return_type.starts_with("Promise") {
            errors.push(FlowError::validate(
                "V005",
                format!("handle must return a Promise, declared '{}'", return_type),
                Some(line),
            ));
        }
    }

    let params = handle.parameters();
    if params.len() > 1 {
        errors.push(FlowError::validate(
            "V006",
            format!("handle takes at most one payload parameter, found {}", params.len()),
            Some(line),
        ));
    }
}

/// `new` expressions must name registered bubble classes when the class is
/// imported from the bubble package, or looks like a bubble and is not
/// declared in the script.
fn v007_bubble_classes_registered(
    parsed: &ParsedSource,
    registry: &dyn CapabilityRegistry,
    options: &AnalyzerOptions,
    errors: &mut Vec<FlowError>,
) {
    let source = parsed.source();
    let imported = package_imports(parsed.root(), source, &options.bubble_package);
    let declared = declared_classes(parsed.root(), source);
    let mut reported = HashSet::new();

    walk_descendants(parsed.root(), |node| {
        if node.kind() != "new_expression" {
            return;
        }
        let Some(ctor) = node.child_by_field_name("constructor") else {
            return;
        };
        if ctor.kind() != "identifier" {
            return;
        }
        let local = node_text(ctor, source);
        let class_name = match imported.get(local) {
            Some(original) => original.as_str(),
            None if local.ends_with("Bubble") && !declared.contains(local) => local,
            None => return,
        };
        if registry.bubble_for_class(class_name).is_some() || registry.bubble_for_class(local).is_some() {
            return;
        }
        if reported.insert((local.to_string(), node.start_position().row)) {
            errors.push(FlowError::validate(
                "V007",
                format!("'{}' is not a registered bubble class", class_name),
                Some(node.start_position().row + 1),
            ));
        }
    });
}

fn declared_classes(root: Node<'_>, source: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    walk_descendants(root, |node| {
        if matches!(node.kind(), "class_declaration" | "abstract_class_declaration" | "class") {
            if let Some(name) = node.child_by_field_name("name") {
                out.insert(node_text(name, source).to_string());
            }
        }
    });
    out
}
