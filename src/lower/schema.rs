//! Input-schema inference from the `handle` parameter's type annotation.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tree_sitter::Node;

use super::comments::preceding_comment;
use super::params::{number_value, unquote};
use crate::config::AnalyzerOptions;
use crate::ir::types::JsonSchema;
use crate::parse::syntax::strip_parens;
use crate::parse::{ParsedSource, children, find_flow_classes, named_children, node_text};

/// Event type names that stand for a trigger payload when not declared locally.
const EVENT_TYPE_NAMES: &[(&str, &str)] = &[
    ("WebhookEvent", "webhook/http"),
    ("CronEvent", "schedule/cron"),
    ("SlackMentionEvent", "slack/bot_mentioned"),
    ("SlackMessageEvent", "slack/message_received"),
    ("GmailEmailEvent", "gmail/email_received"),
];

/// Infer the payload schema of `handle`. `None` when the flow class, its
/// `handle` method or the parameter's type annotation is missing.
pub fn infer_input_schema(parsed: &ParsedSource, options: &AnalyzerOptions) -> Option<JsonSchema> {
    let source = parsed.source();
    let class = find_flow_classes(parsed.root(), source, &options.flow_base_class)
        .into_iter()
        .next()?;
    let handle = class.handle(source)?;
    let param = handle.parameters().into_iter().next()?;
    let annotation = param.child_by_field_name("type")?;
    let type_node = named_children(annotation).into_iter().next()?;

    let mut resolver = TypeResolver::new(parsed.root(), source, &options.trigger_registry_type);
    let mut schema = resolver.convert(type_node);

    let pattern = param.child_by_field_name("pattern");
    if let Some(pattern) = pattern.filter(|p| p.kind() == "object_pattern") {
        for (name, value) in pattern_defaults(pattern, source) {
            apply_default(&mut schema, &name, value);
        }
    }
    if let (Some(pattern), Some(body)) = (pattern.filter(|p| p.kind() == "identifier"), handle.body) {
        let param_name = node_text(pattern, source);
        for (name, value) in body_defaults(body, param_name, source) {
            apply_default(&mut schema, &name, value);
        }
    }
    Some(schema)
}

/// Fixed payload schema of a known trigger event.
pub fn event_schema(trigger_type: &str) -> Option<JsonSchema> {
    let string = || JsonSchema::typed("string");
    let object = || JsonSchema::typed("object");
    let (props, required): (Vec<(&str, JsonSchema)>, &[&str]) = match trigger_type {
        "webhook/http" => (
            vec![("path", string()), ("body", object())],
            &["path"],
        ),
        "schedule/cron" => (vec![("cron", string())], &["cron"]),
        "slack/bot_mentioned" => (
            vec![
                ("slack_event", object()),
                ("channel", string()),
                ("user", string()),
                ("text", string()),
                ("thread_ts", string()),
            ],
            &["slack_event", "channel", "user", "text"],
        ),
        "slack/message_received" => (
            vec![
                ("slack_event", object()),
                ("channel", string()),
                ("user", string()),
                ("text", string()),
                ("channel_type", string()),
            ],
            &["slack_event", "channel", "user", "text"],
        ),
        "gmail/email_received" => (vec![("email", string())], &["email"]),
        _ => return None,
    };
    Some(JsonSchema::object(
        props.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        required.iter().map(|s| s.to_string()).collect(),
    ))
}

struct TypeResolver<'t, 's> {
    source: &'s str,
    registry_type: &'s str,
    interfaces: HashMap<&'s str, Node<'t>>,
    aliases: HashMap<&'s str, Node<'t>>,
    /// Named types currently being expanded.
    visiting: Vec<String>,
}

impl<'t, 's> TypeResolver<'t, 's> {
    fn new(root: Node<'t>, source: &'s str, registry_type: &'s str) -> Self {
        let mut interfaces = HashMap::new();
        let mut aliases = HashMap::new();
        for stmt in named_children(root) {
            let decl = match stmt.kind() {
                "export_statement" => match stmt.child_by_field_name("declaration") {
                    Some(d) => d,
                    None => continue,
                },
                _ => stmt,
            };
            let Some(name) = decl.child_by_field_name("name") else {
                continue;
            };
            match decl.kind() {
                "interface_declaration" => {
                    interfaces.insert(node_text(name, source), decl);
                }
                "type_alias_declaration" => {
                    aliases.insert(node_text(name, source), decl);
                }
                _ => {}
            }
        }
        TypeResolver {
            source,
            registry_type,
            interfaces,
            aliases,
            visiting: Vec::new(),
        }
    }

    fn text(&self, node: Node<'_>) -> &'s str {
        node_text(node, self.source)
    }

    fn convert(&mut self, node: Node<'t>) -> JsonSchema {
        match node.kind() {
            "predefined_type" => predefined(self.text(node)),
            "type_identifier" => {
                let name = self.text(node);
                self.named(name)
            }
            "generic_type" => self.generic(node),
            "array_type" => match named_children(node).into_iter().next() {
                Some(item) => JsonSchema::array_of(self.convert(item)),
                None => JsonSchema::typed("array"),
            },
            "tuple_type" => JsonSchema::typed("array"),
            "readonly_type" | "parenthesized_type" | "type_annotation" => {
                match named_children(node).into_iter().next() {
                    Some(inner) => self.convert(inner),
                    None => JsonSchema::default(),
                }
            }
            "union_type" => {
                let mut members = Vec::new();
                flatten(node, "union_type", &mut members);
                JsonSchema {
                    any_of: Some(members.into_iter().map(|m| self.convert(m)).collect()),
                    ..Default::default()
                }
            }
            "intersection_type" => {
                let mut members = Vec::new();
                flatten(node, "intersection_type", &mut members);
                JsonSchema {
                    all_of: Some(members.into_iter().map(|m| self.convert(m)).collect()),
                    ..Default::default()
                }
            }
            "literal_type" => self.literal(node),
            "object_type" | "interface_body" => self.object(node),
            "lookup_type" => self.lookup(node),
            _ => JsonSchema::default(),
        }
    }

    fn named(&mut self, name: &str) -> JsonSchema {
        if self.visiting.iter().any(|v| v == name) {
            return JsonSchema::typed("object");
        }
        if let Some(&decl) = self.interfaces.get(name) {
            self.visiting.push(name.to_string());
            let schema = self.interface(decl);
            self.visiting.pop();
            return schema;
        }
        if let Some(value) = self.aliases.get(name).and_then(|d| d.child_by_field_name("value")) {
            self.visiting.push(name.to_string());
            let schema = self.convert(value);
            self.visiting.pop();
            return schema;
        }
        if let Some((_, trigger)) = EVENT_TYPE_NAMES.iter().find(|(n, _)| *n == name) {
            return event_schema(trigger).unwrap_or_default();
        }
        match name {
            "Date" => JsonSchema::typed("string"),
            _ => JsonSchema::default(),
        }
    }

    fn generic(&mut self, node: Node<'t>) -> JsonSchema {
        let Some(name) = node.child_by_field_name("name") else {
            return JsonSchema::default();
        };
        let args: Vec<Node<'t>> = node
            .child_by_field_name("type_arguments")
            .map(named_children)
            .unwrap_or_default();
        match self.text(name) {
            "Array" | "ReadonlyArray" => match args.first() {
                Some(&item) => JsonSchema::array_of(self.convert(item)),
                None => JsonSchema::typed("array"),
            },
            "Promise" | "Readonly" => match args.first() {
                Some(&inner) => self.convert(inner),
                None => JsonSchema::default(),
            },
            "Partial" => match args.first() {
                Some(&inner) => {
                    let mut schema = self.convert(inner);
                    if schema.required.is_some() {
                        schema.required = Some(Vec::new());
                    }
                    schema
                }
                None => JsonSchema::default(),
            },
            "Record" => JsonSchema::typed("object"),
            other => self.named(other),
        }
    }

    fn literal(&self, node: Node<'t>) -> JsonSchema {
        let Some(inner) = named_children(node).into_iter().next() else {
            return JsonSchema::default();
        };
        let text = self.text(inner);
        match inner.kind() {
            "string" => JsonSchema::constant("string", Value::String(unquote(text).to_string())),
            "number" => JsonSchema::constant("number", number_value(text)),
            "unary_expression" => JsonSchema::constant("number", number_value(text)),
            "true" | "false" => JsonSchema::constant("boolean", Value::Bool(text == "true")),
            "null" => JsonSchema::typed("null"),
            _ => JsonSchema::default(),
        }
    }

    fn lookup(&mut self, node: Node<'t>) -> JsonSchema {
        let parts = named_children(node);
        let (Some(&object), Some(&index)) = (parts.first(), parts.get(1)) else {
            return JsonSchema::default();
        };
        if self.text(object) != self.registry_type {
            return JsonSchema::default();
        }
        let key = unquote(self.text(index).trim());
        event_schema(key).unwrap_or_default()
    }

    fn interface(&mut self, decl: Node<'t>) -> JsonSchema {
        let mut properties = IndexMap::new();
        let mut required = Vec::new();
        for clause in named_children(decl) {
            if clause.kind() != "extends_type_clause" {
                continue;
            }
            for base in named_children(clause) {
                let schema = self.convert(base);
                if let Some(props) = schema.properties {
                    properties.extend(props);
                }
                for r in schema.required.unwrap_or_default() {
                    if !required.contains(&r) {
                        required.push(r);
                    }
                }
            }
        }
        if let Some(body) = decl.child_by_field_name("body") {
            let own = self.object(body);
            for (k, v) in own.properties.unwrap_or_default() {
                properties.insert(k, v);
            }
            for r in own.required.unwrap_or_default() {
                if !required.contains(&r) {
                    required.push(r);
                }
            }
        }
        JsonSchema::object(properties, required)
    }

    fn object(&mut self, node: Node<'t>) -> JsonSchema {
        let mut properties = IndexMap::new();
        let mut required = Vec::new();
        for member in named_children(node) {
            if member.kind() != "property_signature" {
                continue;
            }
            let Some(name) = member.child_by_field_name("name") else {
                continue;
            };
            let key = unquote(self.text(name)).to_string();
            let mut schema = member
                .child_by_field_name("type")
                .and_then(|t| named_children(t).into_iter().next())
                .map(|t| self.convert(t))
                .unwrap_or_default();
            schema.description = preceding_comment(member, self.source);
            let optional = children(member).iter().any(|c| c.kind() == "?");
            if !optional {
                required.push(key.clone());
            }
            properties.insert(key, schema);
        }
        JsonSchema::object(properties, required)
    }
}

fn predefined(keyword: &str) -> JsonSchema {
    match keyword {
        "string" | "number" | "boolean" | "object" | "null" => JsonSchema::typed(keyword),
        "bigint" => JsonSchema::typed("integer"),
        _ => JsonSchema::default(),
    }
}

fn flatten<'t>(node: Node<'t>, kind: &str, out: &mut Vec<Node<'t>>) {
    for child in named_children(node) {
        if child.kind() == kind {
            flatten(child, kind, out);
        } else {
            out.push(child);
        }
    }
}

/// Attach a default to a top-level property, descending into `allOf` members.
fn apply_default(schema: &mut JsonSchema, name: &str, value: Value) {
    if let Some(prop) = schema.properties.as_mut().and_then(|p| p.get_mut(name)) {
        prop.default = Some(value);
        return;
    }
    if let Some(members) = schema.all_of.as_mut() {
        for member in members {
            if member.property(name).is_some() {
                apply_default(member, name, value);
                return;
            }
        }
    }
}

/// Defaults from top-level `const { a = <literal> } = param;` statements.
fn body_defaults(body: Node<'_>, param_name: &str, source: &str) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for stmt in named_children(body) {
        if !matches!(stmt.kind(), "lexical_declaration" | "variable_declaration") {
            continue;
        }
        for declarator in named_children(stmt) {
            let (Some(pattern), Some(value)) = (
                declarator.child_by_field_name("name"),
                declarator.child_by_field_name("value"),
            ) else {
                continue;
            };
            if pattern.kind() == "object_pattern" && node_text(strip_parens(value), source) == param_name {
                out.extend(pattern_defaults(pattern, source));
            }
        }
    }
    out
}

/// `(property, default)` pairs of an object pattern whose defaults are literals.
fn pattern_defaults(pattern: Node<'_>, source: &str) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for member in named_children(pattern) {
        let (key, default) = match member.kind() {
            "object_assignment_pattern" => (
                member.child_by_field_name("left"),
                member.child_by_field_name("right"),
            ),
            "pair_pattern" => {
                let value = member.child_by_field_name("value");
                match value.filter(|v| v.kind() == "assignment_pattern") {
                    Some(assign) => (member.child_by_field_name("key"), assign.child_by_field_name("right")),
                    None => continue,
                }
            }
            _ => continue,
        };
        let (Some(key), Some(default)) = (key, default) else {
            continue;
        };
        if let Some(value) = literal_value(default, source) {
            out.push((unquote(node_text(key, source)).to_string(), value));
        }
    }
    out
}

/// JSON value of an expression that needs no evaluation; `None` otherwise.
pub fn literal_value(node: Node<'_>, source: &str) -> Option<Value> {
    let node = strip_parens(node);
    let text = node_text(node, source);
    match node.kind() {
        "string" => Some(Value::String(unquote(text).to_string())),
        "template_string" => {
            let dynamic = named_children(node)
                .iter()
                .any(|c| c.kind() == "template_substitution");
            (!dynamic).then(|| Value::String(unquote(text).to_string()))
        }
        "number" => Some(number_value(text)).filter(Value::is_number),
        "unary_expression" => {
            let operand = node.child_by_field_name("argument")?;
            let operator = node.child_by_field_name("operator").map(|o| node_text(o, source));
            if operand.kind() == "number" && operator == Some("-") {
                Some(number_value(text.replace(' ', "").as_str())).filter(Value::is_number)
            } else {
                None
            }
        }
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "null" => Some(Value::Null),
        "array" => named_children(node)
            .into_iter()
            .map(|e| literal_value(e, source))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        "object" => {
            let mut map = Map::new();
            for member in named_children(node) {
                if member.kind() != "pair" {
                    return None;
                }
                let key = member.child_by_field_name("key")?;
                let value = literal_value(member.child_by_field_name("value")?, source)?;
                map.insert(unquote(node_text(key, source)).to_string(), value);
            }
            Some(Value::Object(map))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_source;
    use serde_json::json;

    fn schema(src: &str) -> Option<JsonSchema> {
        let parsed = parse_source(src).unwrap();
        infer_input_schema(&parsed, &AnalyzerOptions::default())
    }

    #[test]
    fn interface_with_optional_members_and_descriptions() {
        let s = schema(
            r#"interface Payload {
  // Subreddit to scan
  subreddit: string;
  limit?: number;
  tags: string[];
}
export class F extends BubbleFlow<'webhook/http'> {
  async handle(payload: Payload) {}
}
"#,
        )
        .unwrap();
        assert_eq!(s.schema_type.as_deref(), Some("object"));
        assert_eq!(s.required, Some(vec!["subreddit".to_string(), "tags".to_string()]));
        let sub = s.property("subreddit").unwrap();
        assert_eq!(sub.description.as_deref(), Some("Subreddit to scan"));
        let tags = s.property("tags").unwrap();
        assert_eq!(tags.items.as_ref().unwrap().schema_type.as_deref(), Some("string"));
    }

    #[test]
    fn defaults_from_body_destructuring() {
        let s = schema(
            r#"type Payload = { industry?: string; subreddits?: string[]; limit?: number; seed?: number };
export class F extends BubbleFlow<'webhook/http'> {
  async handle(payload: Payload) {
    const { industry = 'general', subreddits = ['a', 'b'], limit = compute(), seed = -3 } = payload;
  }
}
"#,
        )
        .unwrap();
        assert_eq!(s.property("industry").unwrap().default, Some(json!("general")));
        assert_eq!(s.property("subreddits").unwrap().default, Some(json!(["a", "b"])));
        assert_eq!(s.property("limit").unwrap().default, None);
        assert_eq!(s.property("seed").unwrap().default, Some(json!(-3)));
    }

    #[test]
    fn defaults_from_signature_pattern() {
        let s = schema(
            "export class F extends BubbleFlow<'webhook/http'> {\n  async handle({ mode = 'fast' }: { mode?: string }) {}\n}\n",
        )
        .unwrap();
        assert_eq!(s.property("mode").unwrap().default, Some(json!("fast")));
    }

    #[test]
    fn union_intersection_and_literals() {
        let s = schema(
            "type A = { a: string };\ntype B = { b: number };\nexport class F extends BubbleFlow<'webhook/http'> {\n  async handle(p: (A & B) | 'none' | 42) {}\n}\n",
        )
        .unwrap();
        let any_of = s.any_of.unwrap();
        assert_eq!(any_of.len(), 3);
        assert_eq!(any_of[0].all_of.as_ref().unwrap().len(), 2);
        assert_eq!(any_of[1].const_value, Some(json!("none")));
        assert_eq!(any_of[2].const_value, Some(json!(42)));
    }

    #[test]
    fn registry_lookup_resolves_event_schema() {
        let s = schema(
            "export class F extends BubbleFlow<'slack/bot_mentioned'> {\n  async handle(payload: BubbleTriggerEventRegistry['slack/bot_mentioned']) {}\n}\n",
        )
        .unwrap();
        assert_eq!(
            s.required,
            Some(vec!["slack_event".into(), "channel".into(), "user".into(), "text".into()])
        );
        assert!(s.property("thread_ts").is_some());
    }

    #[test]
    fn interface_extends_merges_and_recursion_stops() {
        let s = schema(
            "interface Base { id: string }\ninterface Node extends Base { child?: Node }\nexport class F extends BubbleFlow<'webhook/http'> {\n  async handle(p: Node) {}\n}\n",
        )
        .unwrap();
        assert_eq!(s.required, Some(vec!["id".to_string()]));
        assert_eq!(
            s.property("child").unwrap().schema_type.as_deref(),
            Some("object")
        );
    }

    #[test]
    fn no_annotation_is_none() {
        assert!(schema("export class F extends BubbleFlow<'webhook/http'> {\n  async handle(p) {}\n}\n").is_none());
        assert!(schema("export class F extends BubbleFlow<'webhook/http'> {}\n").is_none());
    }
}
