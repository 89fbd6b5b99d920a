//! Scope queries and constructor-parameter classification.

mod helpers;

use bubbleflow_parser::ir::types::{ParameterSource, ParameterType};
use bubbleflow_parser::parse::ScopeKind;
use bubbleflow_parser::{AnalyzerOptions, FlowSession};
use helpers::{analyze_ok, flow, registry};
use serde_json::json;

const NESTED: &str = r#"const outer = 1;
function run(limit: number) {
  for (let i = 0; i < limit; i++) {
    const inner = i * 2;
    if (inner) {
      const deep = inner;
    }
  }
}
"#;

fn visible(session: &FlowSession<'_>, line: usize) -> Vec<String> {
    session
        .variables_visible_at(line)
        .unwrap()
        .into_iter()
        .map(|v| v.name.clone())
        .collect()
}

#[test]
fn loop_variables_are_visible_only_inside_the_loop() {
    let registry = registry();
    let mut session = FlowSession::new(NESTED, &registry, AnalyzerOptions::default());
    session.parse().unwrap();

    let at_body = visible(&session, 4);
    for name in ["outer", "run", "limit", "i", "inner"] {
        assert!(at_body.contains(&name.to_string()), "{} missing at line 4: {:?}", name, at_body);
    }
    assert!(!at_body.contains(&"deep".to_string()));

    let before = visible(&session, 2);
    assert!(!before.contains(&"i".to_string()));
    assert!(!before.contains(&"inner".to_string()));

    let nested = visible(&session, 6);
    assert!(nested.contains(&"outer".to_string()));
    assert!(nested.contains(&"deep".to_string()));

    let after = visible(&session, 9);
    assert!(!after.contains(&"inner".to_string()));
}

#[test]
fn scope_info_and_resolution() {
    let registry = registry();
    let mut session = FlowSession::new(NESTED, &registry, AnalyzerOptions::default());
    session.parse().unwrap();

    let info = session.scope_info_at(6).unwrap().unwrap();
    assert_eq!(info.kind, ScopeKind::Block);
    assert_eq!(info.variables.len(), 1);
    assert_eq!(info.variables[0].name, "deep");

    assert_eq!(session.scope_info_at(1).unwrap().unwrap().kind, ScopeKind::Module);

    let outer = session.resolve_variable("outer", 6).unwrap();
    assert_eq!(outer, Some(1));
    assert_eq!(session.resolve_variable("deep", 9).unwrap(), None);
    assert_eq!(session.resolve_variable("Math", 4).unwrap(), None);
}

#[test]
fn parameter_kinds() {
    let source = format!(
        "const someVar = 'x';\n{}",
        flow("    await new HttpBubble({ a: process.env.KEY, b: someVar, c: \"literal\", d: cond ? 1 : 2 }).action();")
    );
    let result = analyze_ok(&source);
    let bubble = &result.bubbles[&-1];

    assert!(bubble.has_await);
    assert!(bubble.has_action_call);
    assert_eq!(bubble.variable_name, "_anonymous_HttpBubble_1");

    let a = bubble.parameter("a").unwrap();
    assert_eq!(a.param_type, ParameterType::Env);
    assert_eq!(a.value, json!("process.env.KEY"));

    let b = bubble.parameter("b").unwrap();
    assert_eq!(b.param_type, ParameterType::Variable);
    assert_eq!(b.variable_id, Some(1));

    let c = bubble.parameter("c").unwrap();
    assert_eq!(c.param_type, ParameterType::String);
    assert_eq!(c.value, json!("literal"));

    let d = bubble.parameter("d").unwrap();
    assert_eq!(d.param_type, ParameterType::Expression);
    assert_eq!(d.source, ParameterSource::ObjectProperty);
}

#[test]
fn anonymous_ids_count_down_in_source_order() {
    let result = analyze_ok(&flow(
        "    await new SlackBubble({ operation: 'a' }).action();\n    const named = new HttpBubble({ url: 'b' });\n    new SlackBubble({ operation: 'c' });",
    ));
    let anonymous: Vec<(i64, bool)> = result
        .bubbles
        .values()
        .filter(|b| b.is_anonymous())
        .map(|b| (b.variable_id, b.has_await))
        .collect();
    assert_eq!(anonymous, vec![(-2, false), (-1, true)]);
    let named = result.bubbles.values().find(|b| b.variable_name == "named").unwrap();
    assert!(named.variable_id > 0);
}
