//! Trigger detection, cron validation and payload-schema inference.

mod helpers;

use bubbleflow_parser::{AnalyzerOptions, FlowSession, validate_flow};
use helpers::{fixture, registry};
use serde_json::json;

fn session_for(source: String, registry: &bubbleflow_parser::BubbleRegistry) -> FlowSession<'_> {
    let mut session = FlowSession::new(source, registry, AnalyzerOptions::default());
    session.parse().unwrap_or_else(|e| panic!("parse failed: {:?}", e));
    session
}

#[test]
fn cron_trigger_is_read_from_the_class() {
    let registry = registry();
    let session = session_for(fixture("nightly_report.ts"), &registry);
    let trigger = session.trigger().unwrap().unwrap();
    insta::assert_json_snapshot!(trigger, @r#"
    {
      "type": "schedule/cron",
      "cronSchedule": "0 0 * * *"
    }
    "#);
}

#[test]
fn nightly_report_validates_cleanly() {
    let errors = validate_flow(&fixture("nightly_report.ts"), &registry(), &AnalyzerOptions::default());
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

#[test]
fn out_of_range_schedule_is_rejected() {
    let source = fixture("nightly_report.ts").replace("'0 0 * * *'", "'99 99 * * *'");
    let errors = validate_flow(&source, &registry(), &AnalyzerOptions::default());
    let codes: Vec<&str> = errors.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes, vec!["T004"]);
    assert!(errors[0].message.contains("99 99 * * *"));
}

#[test]
fn webhook_flow_has_no_schedule() {
    let registry = registry();
    let session = session_for(fixture("reddit_digest.ts"), &registry);
    let trigger = session.trigger().unwrap().unwrap();
    assert_eq!(trigger.trigger_type, "webhook/http");
    assert_eq!(trigger.cron_schedule, None);
}

#[test]
fn interface_payload_schema_carries_defaults_and_descriptions() {
    let registry = registry();
    let session = session_for(fixture("reddit_digest.ts"), &registry);
    let schema = session.input_schema().unwrap().unwrap();

    assert_eq!(schema.schema_type.as_deref(), Some("object"));
    assert_eq!(schema.required.as_deref(), Some(&["channel".to_string()][..]));

    let industry = schema.property("industry").unwrap();
    assert_eq!(industry.schema_type.as_deref(), Some("string"));
    assert_eq!(industry.default, Some(json!("general")));
    assert_eq!(industry.description.as_deref(), Some("Industry to focus the digest on"));

    let subreddits = schema.property("subreddits").unwrap();
    assert_eq!(subreddits.schema_type.as_deref(), Some("array"));
    assert_eq!(
        subreddits.items.as_ref().and_then(|i| i.schema_type.as_deref()),
        Some("string")
    );
    assert_eq!(subreddits.default, Some(json!(["a", "b"])));
    assert_eq!(subreddits.description.as_deref(), Some("Subreddits to scan"));

    let channel = schema.property("channel").unwrap();
    assert_eq!(channel.default, None);

    assert_eq!(schema.property("limit").unwrap().default, Some(json!(10)));
}

#[test]
fn event_type_payload_uses_the_trigger_schema() {
    let registry = registry();
    let session = session_for(fixture("nightly_report.ts"), &registry);
    let schema = session.input_schema().unwrap().unwrap();
    assert!(schema.property("cron").is_some());
    assert_eq!(schema.required.as_deref(), Some(&["cron".to_string()][..]));
}
