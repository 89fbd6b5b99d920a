//! Lowering phase: parsed source → analysis artifacts.
//!
//! Runs the bubble locator, expands dependency graphs, builds the method table
//! of the flow class and lowers `handle` into the workflow tree.

pub mod comments;
pub mod credentials;
pub mod dependencies;
pub mod locate;
pub mod methods;
pub mod params;
pub mod schema;
pub mod trigger;
pub mod workflow;

use std::collections::{BTreeMap, BTreeSet};

use crate::config::AnalyzerOptions;
use crate::error::FlowError;
use crate::ir::types::*;
use crate::ir::{validate_analysis, validate_reachable_bubbles};
use crate::parse::{ParsedSource, find_flow_classes, parse_source};
use crate::registry::CapabilityRegistry;

use methods::MethodTable;

/// Parse and analyze one revision of a flow script.
pub fn analyze(
    source: &str,
    registry: &dyn CapabilityRegistry,
    options: &AnalyzerOptions,
) -> Result<ParseResult, Vec<FlowError>> {
    let parsed = parse_source(source)?;
    analyze_parsed(&parsed, registry, options)
}

/// Analyze an already parsed source.
///
/// A script without a flow class or without `handle` still yields its
/// located bubbles, with an empty workflow tree; structural validation
/// reports those problems.
pub fn analyze_parsed(
    parsed: &ParsedSource,
    registry: &dyn CapabilityRegistry,
    options: &AnalyzerOptions,
) -> Result<ParseResult, Vec<FlowError>> {
    let source = parsed.source();

    // 1. Locate bubbles and expand their dependencies
    let mut bubbles = locate::locate_bubbles(parsed, registry, options)?;
    dependencies::attach_dependencies(&mut bubbles, registry);

    // 2. Method table of the (first) flow class
    let classes = find_flow_classes(parsed.root(), source, &options.flow_base_class);
    let class = classes.first();
    let methods = MethodTable::build(parsed, class);

    // 3. Workflow tree of handle
    let workflow = match class.and_then(|c| c.handle(source)) {
        Some(handle) => workflow::build_workflow(parsed, &handle, &bubbles, &methods, options),
        None => {
            tracing::debug!("no handle method found; workflow tree is empty");
            ParsedWorkflow {
                root: Vec::new(),
                bubbles: Default::default(),
            }
        }
    };

    let expected = match class.and_then(|c| c.handle(source)) {
        Some(_) => reachable_bubbles(&bubbles, &methods, options),
        None => BTreeSet::new(),
    };
    for (id, bubble) in &bubbles {
        if !expected.contains(id) {
            tracing::warn!(
                variable_id = id,
                name = %bubble.variable_name,
                line = bubble.location.start_line,
                "bubble is not reachable from handle"
            );
        }
    }

    let result = ParseResult {
        bubbles,
        instance_method_locations: methods.instance_method_locations(source),
        workflow,
    };

    // 4. Invariant check
    let mut violations = validate_analysis(&result);
    violations.extend(validate_reachable_bubbles(&result, &expected));
    if !violations.is_empty() {
        return Err(violations.into_iter().map(FlowError::from).collect());
    }

    tracing::debug!(
        bubbles = result.bubbles.len(),
        workflow_bubbles = result.workflow.bubbles.len(),
        methods = result.instance_method_locations.len(),
        "analysis complete"
    );
    Ok(result)
}

/// Bubbles enclosed by the body of `handle` or of any callable it reaches
/// through calls. Without method expansion only `handle` itself counts.
fn reachable_bubbles(
    bubbles: &BTreeMap<VariableId, ParsedBubble>,
    methods: &MethodTable<'_>,
    options: &AnalyzerOptions,
) -> BTreeSet<VariableId> {
    let mut names = vec!["handle".to_string()];
    if options.expand_method_calls {
        names.extend(methods.reachable_from("handle"));
    }
    let bodies: Vec<Location> = names
        .iter()
        .filter_map(|name| methods.get(name).and_then(|c| c.body_location()))
        .collect();
    bubbles
        .values()
        .filter(|b| bodies.iter().any(|body| body.encloses(&b.location)))
        .map(|b| b.variable_id)
        .collect()
}
