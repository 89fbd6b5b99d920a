//! WASM entry points for browser use.
//!
//! Every entry point takes the registry manifest and analyzer options as JSON
//! (an empty options string means defaults) and returns a serde-serialized
//! `{ status: "success" | "errors" }` object.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::AnalyzerOptions;
use crate::error::FlowError;
use crate::ir::types::{BubbleTrigger, JsonSchema, ParseResult, VariableId};
use crate::lower::{analyze, schema, trigger};
use crate::parse::parse_source;
use crate::registry::BubbleRegistry;
use crate::session::FlowSession;

/// Full analysis: bubbles, workflow tree and instance-method locations.
#[wasm_bindgen]
pub fn parse_flow(source: &str, registry_json: &str, options_json: &str) -> JsValue {
    to_js(&parse_flow_inner(source, registry_json, options_json))
}

fn parse_flow_inner(source: &str, registry_json: &str, options_json: &str) -> CallResult<ParseResult> {
    let (registry, options) = match load(registry_json, options_json) {
        Ok(loaded) => loaded,
        Err(errors) => return CallResult::errors(errors),
    };
    match analyze(source, &registry, &options) {
        Ok(result) => CallResult::Success { result },
        Err(errors) => CallResult::errors(errors),
    }
}

/// Validation only. Success carries no payload.
#[wasm_bindgen]
pub fn validate_flow(source: &str, registry_json: &str, options_json: &str) -> JsValue {
    to_js(&validate_flow_inner(source, registry_json, options_json))
}

fn validate_flow_inner(source: &str, registry_json: &str, options_json: &str) -> CallResult<()> {
    let (registry, options) = match load(registry_json, options_json) {
        Ok(loaded) => loaded,
        Err(errors) => return CallResult::errors(errors),
    };
    let errors = crate::validate::validate_flow(source, &registry, &options);
    if errors.is_empty() {
        CallResult::Success { result: () }
    } else {
        CallResult::errors(errors)
    }
}

/// Trigger declared by the flow class, `null` result when none.
#[wasm_bindgen]
pub fn extract_trigger(source: &str, options_json: &str) -> JsValue {
    to_js(&extract_trigger_inner(source, options_json))
}

fn extract_trigger_inner(source: &str, options_json: &str) -> CallResult<Option<BubbleTrigger>> {
    let options = match load_options(options_json) {
        Ok(o) => o,
        Err(e) => return CallResult::errors(vec![e]),
    };
    match parse_source(source) {
        Ok(parsed) => CallResult::Success {
            result: trigger::extract_trigger(&parsed, &options),
        },
        Err(errors) => CallResult::errors(errors),
    }
}

/// JSON schema of the `handle` payload, `null` result when not inferable.
#[wasm_bindgen]
pub fn infer_input_schema(source: &str, options_json: &str) -> JsValue {
    to_js(&infer_input_schema_inner(source, options_json))
}

fn infer_input_schema_inner(source: &str, options_json: &str) -> CallResult<Option<JsonSchema>> {
    let options = match load_options(options_json) {
        Ok(o) => o,
        Err(e) => return CallResult::errors(vec![e]),
    };
    match parse_source(source) {
        Ok(parsed) => CallResult::Success {
            result: schema::infer_input_schema(&parsed, &options),
        },
        Err(errors) => CallResult::errors(errors),
    }
}

/// Rewrite the declaration line of one variable; returns the new source.
#[wasm_bindgen]
pub fn reassign_variable(
    source: &str,
    registry_json: &str,
    options_json: &str,
    variable_id: i64,
    new_value: &str,
) -> JsValue {
    to_js(&reassign_variable_inner(
        source,
        registry_json,
        options_json,
        variable_id,
        new_value,
    ))
}

fn reassign_variable_inner(
    source: &str,
    registry_json: &str,
    options_json: &str,
    variable_id: VariableId,
    new_value: &str,
) -> CallResult<String> {
    let (registry, options) = match load(registry_json, options_json) {
        Ok(loaded) => loaded,
        Err(errors) => return CallResult::errors(errors),
    };
    let mut session = FlowSession::new(source, &registry, options);
    if let Err(errors) = session.parse() {
        return CallResult::errors(errors);
    }
    match session.reassign_variable(variable_id, new_value) {
        Ok(next) => CallResult::Success {
            result: next.to_string(),
        },
        Err(e) => CallResult::errors(vec![FlowError::from(e)]),
    }
}

/// Insert lines at a 1-based line number; returns the new source.
#[wasm_bindgen]
pub fn inject_lines(source: &str, lines: Vec<String>, at: usize) -> JsValue {
    to_js(&inject_lines_inner(source, &lines, at))
}

fn inject_lines_inner(source: &str, lines: &[String], at: usize) -> CallResult<String> {
    let registry = BubbleRegistry::new();
    let mut session = FlowSession::new(source, &registry, AnalyzerOptions::default());
    match session.inject_lines(lines, at) {
        Ok(next) => CallResult::Success {
            result: next.to_string(),
        },
        Err(e) => CallResult::errors(vec![FlowError::from(e)]),
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn load(registry_json: &str, options_json: &str) -> Result<(BubbleRegistry, AnalyzerOptions), Vec<FlowError>> {
    let registry = BubbleRegistry::from_json(registry_json).map_err(|e| {
        vec![FlowError::validate(
            "R001",
            format!("Failed to parse registry JSON: {}", e),
            None,
        )]
    })?;
    let options = load_options(options_json).map_err(|e| vec![e])?;
    Ok((registry, options))
}

fn load_options(options_json: &str) -> Result<AnalyzerOptions, FlowError> {
    AnalyzerOptions::from_json(options_json).map_err(|e| {
        FlowError::validate("R002", format!("Failed to parse options JSON: {}", e), None)
    })
}

fn to_js<T: Serialize>(value: &T) -> JsValue {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    value.serialize(&serializer).unwrap_or(JsValue::NULL)
}

// ---------------------------------------------------------------------------
// DTOs for serialization to JS
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    code: String,
    phase: String,
    message: String,
    line: Option<usize>,
}

impl From<FlowError> for ErrorDto {
    fn from(e: FlowError) -> Self {
        ErrorDto {
            code: e.code,
            phase: e.phase.to_string(),
            message: e.message,
            line: e.line,
        }
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "status")]
enum CallResult<T> {
    #[serde(rename = "success")]
    Success { result: T },
    #[serde(rename = "errors")]
    Errors { errors: Vec<ErrorDto> },
}

impl<T> CallResult<T> {
    fn errors(errors: Vec<FlowError>) -> Self {
        CallResult::Errors {
            errors: errors.into_iter().map(ErrorDto::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Phase;

    const REGISTRY: &str = r#"{"bubbles": [
        {"name": "slack", "className": "SlackBubble", "type": "service", "credentials": ["SLACK_CRED"]}
    ]}"#;

    const FLOW: &str = r#"export class Notify extends BubbleFlow<'webhook/http'> {
  async handle(payload: { channel: string }): Promise<void> {
    const post = new SlackBubble({ channel: payload.channel });
    await post.action();
  }
}
"#;

    #[test]
    fn parse_flow_success_shape() {
        let value = serde_json::to_value(parse_flow_inner(FLOW, REGISTRY, "")).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["result"]["workflow"]["root"][0]["type"], "bubble");
    }

    #[test]
    fn bad_registry_reports_errors() {
        let value = serde_json::to_value(parse_flow_inner(FLOW, "not json", "")).unwrap();
        assert_eq!(value["status"], "errors");
        assert_eq!(value["errors"][0]["code"], "R001");
    }

    #[test]
    fn validate_reports_phase() {
        let value = serde_json::to_value(validate_flow_inner("const a = 1;", REGISTRY, "")).unwrap();
        assert_eq!(value["errors"][0]["code"], "V001");
        assert_eq!(value["errors"][0]["phase"], Phase::Validate.to_string());
    }

    #[test]
    fn mutation_errors_are_tagged() {
        let value = serde_json::to_value(inject_lines_inner("a;\n", &["b;".to_string()], 9)).unwrap();
        assert_eq!(value["status"], "errors");
        assert_eq!(value["errors"][0]["code"], "M004");
    }
}
