#![allow(dead_code)]

use std::collections::BTreeSet;

use bubbleflow_parser::ir::types::{BubbleNodeType, ParseResult, ParsedWorkflow, VariableId};
use bubbleflow_parser::registry::{DependencyInstance, DependencySpec};
use bubbleflow_parser::{AnalyzerOptions, BubbleDescriptor, BubbleRegistry, analyze};

// =============================================================================
// Registry fixture
// =============================================================================

/// A small registry covering services, tools, an agent and an agent-backed tool.
pub fn registry() -> BubbleRegistry {
    BubbleRegistry::from_descriptors([
        BubbleDescriptor::new("slack", "SlackBubble", BubbleNodeType::Service)
            .with_parameter("operation", "string", true)
            .with_credentials(&["SLACK_CRED"]),
        BubbleDescriptor::new("http", "HttpBubble", BubbleNodeType::Service)
            .with_parameter("url", "string", true),
        BubbleDescriptor::new("postgresql", "PostgreSQLBubble", BubbleNodeType::Service)
            .with_parameter("query", "string", true)
            .with_credentials(&["DATABASE_CRED"]),
        BubbleDescriptor::new("ai-agent", "AIAgentBubble", BubbleNodeType::Service)
            .agent()
            .with_parameter("message", "string", true)
            .with_credentials(&["GOOGLE_GEMINI_CRED", "OPENAI_CRED"]),
        BubbleDescriptor::new("firecrawl", "FirecrawlBubble", BubbleNodeType::Service)
            .with_credentials(&["FIRECRAWL_API_KEY"]),
        BubbleDescriptor::new("web-search-tool", "WebSearchTool", BubbleNodeType::Tool)
            .with_dependencies(&["firecrawl"]),
        BubbleDescriptor::new("research-agent-tool", "ResearchAgentTool", BubbleNodeType::Tool)
            .with_dependency(DependencySpec {
                name: "ai-agent".into(),
                instances: vec![DependencyInstance {
                    variable_name: Some("researcher".into()),
                    tools: vec!["web-search-tool".into()],
                }],
            }),
    ])
}

// =============================================================================
// Script builders
// =============================================================================

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {}", path, e))
}

/// A webhook flow whose `handle(payload: any)` body is `body`.
pub fn flow(body: &str) -> String {
    format!(
        "import {{ BubbleFlow }} from '@bubblelab/bubble-core';\n\nexport class TestFlow extends BubbleFlow<'webhook/http'> {{\n  async handle(payload: any): Promise<void> {{\n{}\n  }}\n}}\n",
        body
    )
}

/// 1-based number of the first line containing `needle`.
pub fn line_of(source: &str, needle: &str) -> usize {
    source
        .lines()
        .position(|l| l.contains(needle))
        .map(|i| i + 1)
        .unwrap_or_else(|| panic!("'{}' not found in source", needle))
}

// =============================================================================
// Analysis helpers
// =============================================================================

pub fn analyze_ok(source: &str) -> ParseResult {
    analyze(source, &registry(), &AnalyzerOptions::default())
        .unwrap_or_else(|errors| panic!("analysis failed: {:?}", errors))
}

pub fn tree_bubble_ids(workflow: &ParsedWorkflow) -> BTreeSet<VariableId> {
    workflow.bubble_ids().into_iter().collect()
}
