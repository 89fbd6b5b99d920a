//! Script-level validation phase.
//!
//! Checks a flow script against the flow contract before (or instead of)
//! analysis. Errors are collected, not fail-fast, so a caller can show every
//! problem at once.

pub mod bubble_rules;
pub mod cron;
pub mod structural;

use crate::config::AnalyzerOptions;
use crate::error::FlowError;
use crate::lower::trigger::{CRON_TRIGGER, KNOWN_TRIGGER_TYPES, extract_trigger, is_known_trigger};
use crate::parse::{ParsedSource, find_flow_classes, parse_source};
use crate::registry::CapabilityRegistry;

use cron::CronExpression;

/// Validate a script: syntax, flow contract, bubble rules, then the trigger.
/// An empty result means the script is valid.
pub fn validate_flow(
    source: &str,
    registry: &dyn CapabilityRegistry,
    options: &AnalyzerOptions,
) -> Vec<FlowError> {
    match parse_source(source) {
        Ok(parsed) => validate_parsed(&parsed, registry, options),
        Err(errors) => errors,
    }
}

/// Validate an already parsed script.
pub fn validate_parsed(
    parsed: &ParsedSource,
    registry: &dyn CapabilityRegistry,
    options: &AnalyzerOptions,
) -> Vec<FlowError> {
    let mut errors = structural::validate_structural(parsed, registry, options);
    errors.extend(bubble_rules::validate_bubble_parameters(parsed, registry));

    // Trigger checks need a well-formed flow class.
    if errors.is_empty() {
        errors.extend(validate_trigger(parsed, options));
    }

    tracing::debug!(errors = errors.len(), "validated flow");
    errors
}

/// Trigger rules (T001–T004).
pub fn validate_trigger(parsed: &ParsedSource, options: &AnalyzerOptions) -> Vec<FlowError> {
    let line = find_flow_classes(parsed.root(), parsed.source(), &options.flow_base_class)
        .first()
        .map(|c| c.line());

    let Some(trigger) = extract_trigger(parsed, options) else {
        return vec![FlowError::trigger(
            "T001",
            format!(
                "Flow class must declare its trigger type, e.g. {}<'webhook/http'>",
                options.flow_base_class
            ),
            line,
        )];
    };

    if !is_known_trigger(&trigger.trigger_type) {
        return vec![FlowError::trigger(
            "T002",
            format!(
                "Unknown trigger type '{}'; expected one of: {}",
                trigger.trigger_type,
                KNOWN_TRIGGER_TYPES.join(", ")
            ),
            line,
        )];
    }

    if trigger.trigger_type != CRON_TRIGGER {
        return Vec::new();
    }
    match trigger.cron_schedule.as_deref() {
        None => vec![FlowError::trigger(
            "T003",
            "Cron flows must define a cronSchedule field",
            line,
        )],
        Some(schedule) => match CronExpression::parse(schedule) {
            Ok(_) => Vec::new(),
            Err(e) => vec![FlowError::trigger(
                "T004",
                format!("Invalid cron expression '{}': {}", schedule, e),
                line,
            )],
        },
    }
}
