//! Dependency graph expansion over registry-declared capabilities.

mod helpers;

use bubbleflow_parser::ir::types::{BubbleNodeType, DependencyGraphNode};
use helpers::{analyze_ok, flow};

fn find<'a>(node: &'a DependencyGraphNode, name: &str) -> Vec<&'a DependencyGraphNode> {
    let mut out = Vec::new();
    node.walk(&mut |n| {
        if n.name == name {
            out.push(n);
        }
    });
    out
}

#[test]
fn tool_dependency_tree_snapshot() {
    let result = analyze_ok(&flow("    await new WebSearchTool({ query: 'rust' }).action();"));
    let graph = result.bubbles[&-1].dependency_graph.as_ref().unwrap();
    insta::assert_json_snapshot!(graph, @r#"
    {
      "name": "web-search-tool",
      "variableName": "_anonymous_WebSearchTool_1",
      "nodeType": "tool",
      "uniqueId": "-1",
      "variableId": -1,
      "dependencies": [
        {
          "name": "firecrawl",
          "nodeType": "service",
          "uniqueId": "-1.firecrawl#1",
          "variableId": 990923,
          "dependencies": []
        }
      ]
    }
    "#);
}

#[test]
fn nested_agent_terminates_with_its_own_tools() {
    let result = analyze_ok(&flow(
        "    const agent = new AIAgentBubble({\n      message: 'go',\n      tools: [{ name: 'research-agent-tool' }, { name: 'web-search-tool' }],\n    });\n    await agent.action();",
    ));
    let agent = result
        .bubbles
        .values()
        .find(|b| b.variable_name == "agent")
        .unwrap();
    let graph = agent.dependency_graph.as_ref().unwrap();

    let names: Vec<&str> = graph.dependencies.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["research-agent-tool", "web-search-tool"]);

    let nested = find(graph, "ai-agent");
    // the root plus the researcher inside research-agent-tool
    assert_eq!(nested.len(), 2);
    let researcher = nested[1];
    assert_eq!(researcher.variable_name.as_deref(), Some("researcher"));
    assert_eq!(researcher.node_type, BubbleNodeType::Service);
    assert_eq!(researcher.dependencies.len(), 1);
    assert_eq!(researcher.dependencies[0].name, "web-search-tool");
    assert_eq!(researcher.dependencies[0].dependencies[0].name, "firecrawl");
}

#[test]
fn unique_ids_are_ordinal_per_parent() {
    let result = analyze_ok(&flow(
        "    const agent = new AIAgentBubble({ message: 'go', tools: ['web-search-tool'] });",
    ));
    let agent = result.bubbles.values().next().unwrap();
    let graph = agent.dependency_graph.as_ref().unwrap();
    let root = agent.variable_id.to_string();
    assert_eq!(graph.unique_id, root);
    assert_eq!(graph.dependencies[0].unique_id, format!("{}.web-search-tool#1", root));
    assert_eq!(
        graph.dependencies[0].dependencies[0].unique_id,
        format!("{}.web-search-tool#1.firecrawl#1", root)
    );

    let mut ids = Vec::new();
    graph.walk(&mut |n| ids.push(n.variable_id));
    assert!(ids[1..].iter().all(|id| (100_000..1_000_000).contains(id)));
}

#[test]
fn unknown_tools_are_ignored() {
    let result = analyze_ok(&flow(
        "    const agent = new AIAgentBubble({ message: 'go', tools: [{ name: 'not-a-tool' }] });",
    ));
    let agent = result.bubbles.values().next().unwrap();
    assert_eq!(agent.dependencies.as_deref(), Some(&[][..]));
    assert!(agent.dependency_graph.as_ref().unwrap().dependencies.is_empty());
}
