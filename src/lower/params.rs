//! Expression/parameter extraction for bubble constructor arguments.

use serde_json::Value;
use tree_sitter::Node;

use crate::ir::types::{BubbleParameter, Location, ParameterSource, ParameterType};
use crate::parse::ScopeTree;
use crate::parse::syntax::ExprKind;
use crate::parse::{named_children, node_text};

/// Extract parameters from a constructor's `arguments` node.
///
/// An object literal yields one parameter per property. Any other first
/// argument yields a single `first-arg` parameter.
pub fn extract_parameters(arguments: Option<Node<'_>>, source: &str) -> Vec<BubbleParameter> {
    let Some(first) = arguments.and_then(|args| named_children(args).into_iter().next()) else {
        return Vec::new();
    };
    if first.kind() == "object" {
        return named_children(first)
            .into_iter()
            .filter_map(|member| object_member(member, source))
            .collect();
    }
    let name = match first.kind() {
        "identifier" => node_text(first, source).to_string(),
        _ => "arg0".to_string(),
    };
    vec![classify(name, first, source, ParameterSource::FirstArg)]
}

fn object_member(member: Node<'_>, source: &str) -> Option<BubbleParameter> {
    match member.kind() {
        "pair" => {
            let key = member.child_by_field_name("key")?;
            let value = member.child_by_field_name("value")?;
            Some(classify(property_key(key, source), value, source, ParameterSource::ObjectProperty))
        }
        "shorthand_property_identifier" => {
            let name = node_text(member, source).to_string();
            Some(BubbleParameter {
                value: Value::String(name.clone()),
                name,
                param_type: ParameterType::Variable,
                variable_id: None,
                location: Location::of(member),
                source: ParameterSource::ObjectProperty,
            })
        }
        "spread_element" => {
            let argument = named_children(member).into_iter().next()?;
            let name = node_text(argument, source).to_string();
            Some(classify(name, argument, source, ParameterSource::Spread))
        }
        "method_definition" => {
            let name = member
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string())?;
            Some(BubbleParameter {
                name,
                value: Value::String(node_text(member, source).to_string()),
                param_type: ParameterType::Unknown,
                variable_id: None,
                location: Location::of(member),
                source: ParameterSource::ObjectProperty,
            })
        }
        _ => None,
    }
}

fn property_key(key: Node<'_>, source: &str) -> String {
    let text = node_text(key, source);
    match key.kind() {
        "string" => unquote(text).to_string(),
        _ => text.to_string(),
    }
}

/// Classify one value expression. The `process.env` check runs before the
/// generic member-expression rule.
pub fn classify(name: String, value: Node<'_>, source: &str, origin: ParameterSource) -> BubbleParameter {
    let text = node_text(value, source);
    let (param_type, json) = match ExprKind::of(value) {
        ExprKind::Member | ExprKind::Subscript if is_env_reference(text) => {
            (ParameterType::Env, Value::String(text.to_string()))
        }
        ExprKind::Identifier | ExprKind::Member | ExprKind::Subscript => {
            (ParameterType::Variable, Value::String(text.to_string()))
        }
        ExprKind::String => (ParameterType::String, Value::String(unquote(text).to_string())),
        ExprKind::Template => {
            let has_substitution = named_children(value)
                .iter()
                .any(|c| c.kind() == "template_substitution");
            let value = if has_substitution {
                text.to_string()
            } else {
                unquote(text).to_string()
            };
            (ParameterType::String, Value::String(value))
        }
        ExprKind::Number => (ParameterType::Number, number_value(text)),
        ExprKind::Boolean => (ParameterType::Boolean, Value::Bool(text == "true")),
        ExprKind::Array => (ParameterType::Array, Value::String(text.to_string())),
        ExprKind::Object => (ParameterType::Object, Value::String(text.to_string())),
        ExprKind::Other => (ParameterType::Expression, Value::String(text.to_string())),
    };
    BubbleParameter {
        name,
        value: json,
        param_type,
        variable_id: None,
        location: Location::of(value),
        source: origin,
    }
}

/// Attach scope ids to `variable` parameters whose base identifier resolves
/// at `line`. Unresolved references keep `variable_id: None`.
pub fn resolve_references(params: &mut [BubbleParameter], scopes: &ScopeTree, line: usize) {
    for param in params.iter_mut() {
        if param.param_type != ParameterType::Variable {
            continue;
        }
        let Some(text) = param.value.as_str() else {
            continue;
        };
        let base = base_identifier(text);
        if base.is_empty() || base == "this" {
            continue;
        }
        param.variable_id = scopes.resolve_variable(base, line);
    }
}

/// Leading identifier of a reference: `items[0].name` → `items`.
pub fn base_identifier(text: &str) -> &str {
    let end = text
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[..end]
}

fn is_env_reference(text: &str) -> bool {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    compact.starts_with("process.env") || compact.starts_with("process?.env")
}

/// Strip one layer of matching quotes or backticks.
pub fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && matches!(first, b'\'' | b'"' | b'`') {
            return &text[1..text.len() - 1];
        }
    }
    text
}

pub fn number_value(text: &str) -> Value {
    let cleaned = text.replace('_', "");
    if let Ok(i) = cleaned.parse::<i64>() {
        return Value::from(i);
    }
    match cleaned.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(text.to_string()),
    }
}
