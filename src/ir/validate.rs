//! Analysis invariant validation.
//!
//! Checks that a `ParseResult` is internally consistent before it leaves the
//! analyzer. A violation here is a bug in the analyzer, never a problem with
//! the user's script.

use std::collections::{BTreeSet, HashSet};

use crate::ir::types::*;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
    /// The bubble the violation was found on, if applicable.
    pub variable_id: Option<VariableId>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.variable_id {
            Some(id) => write!(f, "[{}] {} (at bubble {})", self.code, self.message, id),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// Validate a parse result against all invariants. Returns all errors found.
pub fn validate_analysis(result: &ParseResult) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_leaves_resolve(result, &mut errors);
    validate_no_unreferenced_bubbles(&result.workflow, &mut errors);
    validate_unique_leaves(&result.workflow, &mut errors);
    validate_dependency_ids(result, &mut errors);
    validate_anonymous_order(result, &mut errors);

    errors
}

// ---------------------------------------------------------------------------
// Invariant: every bubble leaf names a located bubble
// ---------------------------------------------------------------------------

fn validate_leaves_resolve(result: &ParseResult, errors: &mut Vec<ValidationError>) {
    for id in result.workflow.bubble_ids() {
        if !result.workflow.bubbles.contains_key(&id) || !result.bubbles.contains_key(&id) {
            errors.push(ValidationError {
                code: "E001",
                message: format!("Workflow leaf references unknown bubble {}", id),
                variable_id: Some(id),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Invariant: the workflow bubble map holds only bubbles the tree references
// ---------------------------------------------------------------------------

fn validate_no_unreferenced_bubbles(workflow: &ParsedWorkflow, errors: &mut Vec<ValidationError>) {
    let referenced: HashSet<VariableId> = workflow.bubble_ids().into_iter().collect();
    for id in workflow.bubbles.keys() {
        if !referenced.contains(id) {
            errors.push(ValidationError {
                code: "E002",
                message: format!("Bubble {} is in the workflow map but not in the tree", id),
                variable_id: Some(*id),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Invariant: each bubble appears as a leaf at most once
// ---------------------------------------------------------------------------

fn validate_unique_leaves(workflow: &ParsedWorkflow, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for id in workflow.bubble_ids() {
        if !seen.insert(id) {
            errors.push(ValidationError {
                code: "E003",
                message: format!("Bubble {} appears more than once in the workflow tree", id),
                variable_id: Some(id),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Invariant: dependency node ids are unique within a bubble's graph
// ---------------------------------------------------------------------------

fn validate_dependency_ids(result: &ParseResult, errors: &mut Vec<ValidationError>) {
    for (id, bubble) in &result.bubbles {
        let Some(graph) = &bubble.dependency_graph else {
            continue;
        };
        let mut seen = HashSet::new();
        graph.walk(&mut |node| {
            if !seen.insert(node.unique_id.as_str()) {
                errors.push(ValidationError {
                    code: "E004",
                    message: format!("Duplicate dependency node id '{}'", node.unique_id),
                    variable_id: Some(*id),
                });
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Invariant: anonymous ids count down from -1 in source order
// ---------------------------------------------------------------------------

fn validate_anonymous_order(result: &ParseResult, errors: &mut Vec<ValidationError>) {
    let mut anonymous: Vec<&ParsedBubble> =
        result.bubbles.values().filter(|b| b.is_anonymous()).collect();
    anonymous.sort_by_key(|b| (b.location.start_line, b.location.start_col));
    for (index, bubble) in anonymous.iter().enumerate() {
        let expected = -(index as VariableId) - 1;
        if bubble.variable_id != expected {
            errors.push(ValidationError {
                code: "E005",
                message: format!(
                    "Anonymous bubble at line {} has id {}, expected {}",
                    bubble.location.start_line, bubble.variable_id, expected
                ),
                variable_id: Some(bubble.variable_id),
            });
        }
    }
}

/// Every bubble in `expected` (those inside `handle` and the callables it
/// reaches) must appear as a workflow leaf.
pub fn validate_reachable_bubbles(
    result: &ParseResult,
    expected: &BTreeSet<VariableId>,
) -> Vec<ValidationError> {
    let leaves: HashSet<VariableId> = result.workflow.bubble_ids().into_iter().collect();
    expected
        .iter()
        .filter(|id| !leaves.contains(id))
        .map(|id| ValidationError {
            code: "E006",
            message: format!(
                "Bubble {} is reachable from handle but missing from the workflow tree",
                id
            ),
            variable_id: Some(*id),
        })
        .collect()
}
