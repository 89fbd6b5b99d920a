//! Trigger detection: the flow class's generic argument plus, for cron
//! flows, its `cronSchedule` field.

use std::sync::LazyLock;

use regex::Regex;

use super::params::unquote;
use crate::config::AnalyzerOptions;
use crate::ir::types::BubbleTrigger;
use crate::parse::{FlowClass, ParsedSource, find_flow_classes, named_children, node_text};

pub const CRON_TRIGGER: &str = "schedule/cron";

/// Event types a flow may declare.
pub const KNOWN_TRIGGER_TYPES: &[&str] = &[
    "webhook/http",
    CRON_TRIGGER,
    "slack/bot_mentioned",
    "slack/message_received",
    "gmail/email_received",
];

static CRON_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"cronSchedule\s*(?::\s*string\s*)?=\s*['"`]([^'"`]+)['"`]"#).unwrap()
});

/// Read the trigger declared by the flow class. `None` when no trigger type
/// can be found by either the AST or the raw-text fallback.
pub fn extract_trigger(parsed: &ParsedSource, options: &AnalyzerOptions) -> Option<BubbleTrigger> {
    let source = parsed.source();
    let classes = find_flow_classes(parsed.root(), source, &options.flow_base_class);
    let class = classes.first();

    let trigger_type = class
        .and_then(|c| trigger_type_from_ast(c, source))
        .or_else(|| {
            let found = trigger_type_from_text(source, &options.flow_base_class);
            if found.is_some() {
                tracing::warn!("trigger type recovered from raw source text");
            }
            found
        })?;

    let cron_schedule = if trigger_type == CRON_TRIGGER {
        class
            .and_then(|c| cron_from_ast(c, source))
            .or_else(|| {
                CRON_FIELD
                    .captures(source)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            })
    } else {
        None
    };

    Some(BubbleTrigger {
        trigger_type,
        cron_schedule,
    })
}

fn trigger_type_from_ast(class: &FlowClass<'_>, source: &str) -> Option<String> {
    let argument = class.type_argument?;
    let literal = match argument.kind() {
        "literal_type" => named_children(argument).into_iter().next()?,
        "string" => argument,
        _ => return None,
    };
    if literal.kind() != "string" {
        return None;
    }
    Some(unquote(node_text(literal, source)).to_string())
}

fn trigger_type_from_text(source: &str, base_class: &str) -> Option<String> {
    let pattern = format!(
        r#"extends\s+{}\s*<\s*['"]([^'"]+)['"]\s*>"#,
        regex::escape(base_class)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn cron_from_ast(class: &FlowClass<'_>, source: &str) -> Option<String> {
    let value = class.field_value("cronSchedule", source)?;
    match value.kind() {
        "string" => Some(unquote(node_text(value, source)).to_string()),
        "template_string"
            if !named_children(value)
                .iter()
                .any(|c| c.kind() == "template_substitution") =>
        {
            Some(unquote(node_text(value, source)).to_string())
        }
        _ => None,
    }
}

pub fn is_known_trigger(trigger_type: &str) -> bool {
    KNOWN_TRIGGER_TYPES.contains(&trigger_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_source;

    fn trigger(src: &str) -> Option<BubbleTrigger> {
        let parsed = parse_source(src).unwrap();
        extract_trigger(&parsed, &AnalyzerOptions::default())
    }

    #[test]
    fn cron_trigger_with_schedule() {
        let t = trigger(
            "export class Job extends BubbleFlow<'schedule/cron'> {\n  readonly cronSchedule = '0 0 * * *';\n  async handle() {}\n}\n",
        )
        .unwrap();
        assert_eq!(t.trigger_type, "schedule/cron");
        assert_eq!(t.cron_schedule.as_deref(), Some("0 0 * * *"));
    }

    #[test]
    fn webhook_trigger_ignores_cron_field() {
        let t = trigger(
            "export class Hook extends BubbleFlow<\"webhook/http\"> {\n  cronSchedule = '* * * * *';\n}\n",
        )
        .unwrap();
        assert_eq!(t.trigger_type, "webhook/http");
        assert_eq!(t.cron_schedule, None);
    }

    #[test]
    fn missing_type_argument_is_none() {
        assert_eq!(trigger("export class Plain extends BubbleFlow {}\n"), None);
    }

    #[test]
    fn text_fallback_matches_generic() {
        assert_eq!(
            trigger_type_from_text("class X extends BubbleFlow < 'slack/bot_mentioned' > {}", "BubbleFlow")
                .as_deref(),
            Some("slack/bot_mentioned")
        );
    }
}
