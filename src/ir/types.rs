//! Analysis result types for parsed flow scripts.
//!
//! The parser turns a flow script (a class extending the flow base with a single
//! `handle` entrypoint) into the artifacts below. They are rebuilt wholesale on
//! every parse and serialize to camelCase JSON for the UI and execution layers.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Positive ids name scope variables; negative ids are synthetic ids for
/// anonymous bubble instantiations.
pub type VariableId = i64;

// =============================================================================
// SOURCE LOCATIONS
// =============================================================================

/// A source span. Lines are 1-based, columns are 0-based byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Location {
    pub fn of(node: tree_sitter::Node<'_>) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Location {
            start_line: start.row + 1,
            start_col: start.column,
            end_line: end.row + 1,
            end_col: end.column,
        }
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    pub fn line_span(&self) -> usize {
        self.end_line - self.start_line
    }

    /// Whether `other` lies entirely within this span.
    pub fn encloses(&self, other: &Location) -> bool {
        (self.start_line, self.start_col) <= (other.start_line, other.start_col)
            && (other.end_line, other.end_col) <= (self.end_line, self.end_col)
    }
}

// =============================================================================
// BUBBLES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Env,
    Variable,
    Expression,
    Unknown,
}

/// How a parameter value reached the bubble constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParameterSource {
    /// `new X({ name: value })`
    ObjectProperty,
    /// `new X(config)`
    FirstArg,
    /// `new X({ ...base })`
    Spread,
}

/// One constructor-argument property of a bubble instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleParameter {
    pub name: String,
    /// Literal value for primitives, source text for everything else.
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_id: Option<VariableId>,
    pub location: Location,
    pub source: ParameterSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BubbleNodeType {
    Service,
    Tool,
    Workflow,
    #[default]
    Unknown,
}

/// One instantiation of a registered bubble, with its location info and
/// (once every bubble of the script is located) its dependency expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedBubble {
    pub variable_id: VariableId,
    pub variable_name: String,
    pub bubble_name: String,
    pub class_name: String,
    pub parameters: Vec<BubbleParameter>,
    pub has_await: bool,
    pub has_action_call: bool,
    pub node_type: BubbleNodeType,
    /// Span of the whole constructor expression, `await` and `.action()` included.
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_graph: Option<DependencyGraphNode>,
}

/// Alias kept for consumers that distinguish the located form from the bare one.
pub type ParsedBubbleWithInfo = ParsedBubble;

impl ParsedBubble {
    pub fn is_anonymous(&self) -> bool {
        self.variable_id < 0
    }

    pub fn parameter(&self, name: &str) -> Option<&BubbleParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// One node of a bubble's expanded capability tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraphNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,
    pub node_type: BubbleNodeType,
    /// `parentUniqueId.name#ordinal`; the root uses the owning bubble's id.
    pub unique_id: String,
    pub variable_id: VariableId,
    pub dependencies: Vec<DependencyGraphNode>,
}

impl DependencyGraphNode {
    /// Visit this node and every descendant depth-first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a DependencyGraphNode)) {
        f(self);
        for child in &self.dependencies {
            child.walk(f);
        }
    }
}

// =============================================================================
// WORKFLOW TREE
// =============================================================================

/// Control-flow skeleton of `handle`, one node per statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowNode {
    Bubble(BubbleRef),
    If(ConditionalNode),
    For(LoopNode),
    While(LoopNode),
    TryCatch(TryCatchNode),
    CodeBlock(CodeNode),
    VariableDeclaration(CodeNode),
    Return(CodeNode),
    FunctionCall(FunctionCallNode),
    ParallelExecution(ParallelNode),
    TransformationFunction(FunctionCallNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleRef {
    pub variable_id: VariableId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalNode {
    pub location: Location,
    pub condition: String,
    pub children: Vec<WorkflowNode>,
    /// A chained `else if` is a single nested `if` node here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub else_branch: Option<Vec<WorkflowNode>>,
    pub then_terminates: bool,
    pub else_terminates: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopNode {
    pub location: Location,
    pub condition: String,
    pub children: Vec<WorkflowNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryCatchNode {
    pub location: Location,
    pub children: Vec<WorkflowNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catch_block: Option<Vec<WorkflowNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finally_block: Option<Vec<WorkflowNode>>,
}

/// Opaque statement text plus whatever bubbles or calls were found inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeNode {
    pub location: Location,
    pub code: String,
    pub children: Vec<WorkflowNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDefinition {
    pub location: Location,
    pub is_async: bool,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallNode {
    pub location: Location,
    pub function_name: String,
    /// `this.`-qualified instance method call.
    pub is_method_call: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_definition: Option<MethodDefinition>,
    /// Name bound by the surrounding declaration or assignment, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_declaration: Option<String>,
    pub code: String,
    pub children: Vec<WorkflowNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelNode {
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_declaration: Option<String>,
    pub code: String,
    pub children: Vec<WorkflowNode>,
}

impl WorkflowNode {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowNode::Bubble(_) => "bubble",
            WorkflowNode::If(_) => "if",
            WorkflowNode::For(_) => "for",
            WorkflowNode::While(_) => "while",
            WorkflowNode::TryCatch(_) => "try_catch",
            WorkflowNode::CodeBlock(_) => "code_block",
            WorkflowNode::VariableDeclaration(_) => "variable_declaration",
            WorkflowNode::Return(_) => "return",
            WorkflowNode::FunctionCall(_) => "function_call",
            WorkflowNode::ParallelExecution(_) => "parallel_execution",
            WorkflowNode::TransformationFunction(_) => "transformation_function",
        }
    }

    /// Every nested node list: children, else branches, catch and finally blocks.
    pub fn branches(&self) -> Vec<&[WorkflowNode]> {
        match self {
            WorkflowNode::Bubble(_) => vec![],
            WorkflowNode::If(n) => {
                let mut out = vec![n.children.as_slice()];
                if let Some(e) = &n.else_branch {
                    out.push(e.as_slice());
                }
                out
            }
            WorkflowNode::For(n) | WorkflowNode::While(n) => vec![n.children.as_slice()],
            WorkflowNode::TryCatch(n) => {
                let mut out = vec![n.children.as_slice()];
                if let Some(c) = &n.catch_block {
                    out.push(c.as_slice());
                }
                if let Some(f) = &n.finally_block {
                    out.push(f.as_slice());
                }
                out
            }
            WorkflowNode::CodeBlock(n)
            | WorkflowNode::VariableDeclaration(n)
            | WorkflowNode::Return(n) => vec![n.children.as_slice()],
            WorkflowNode::FunctionCall(n) | WorkflowNode::TransformationFunction(n) => {
                vec![n.children.as_slice()]
            }
            WorkflowNode::ParallelExecution(n) => vec![n.children.as_slice()],
        }
    }

    /// Variable ids of every `bubble` leaf in this subtree, in tree order.
    pub fn collect_bubble_ids(&self, out: &mut Vec<VariableId>) {
        if let WorkflowNode::Bubble(b) = self {
            out.push(b.variable_id);
        }
        for branch in self.branches() {
            for node in branch {
                node.collect_bubble_ids(out);
            }
        }
    }
}

/// The top-level workflow artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedWorkflow {
    pub root: Vec<WorkflowNode>,
    /// Exactly the bubbles referenced by `root`.
    pub bubbles: BTreeMap<VariableId, ParsedBubble>,
}

impl ParsedWorkflow {
    pub fn bubble_ids(&self) -> Vec<VariableId> {
        let mut ids = Vec::new();
        for node in &self.root {
            node.collect_bubble_ids(&mut ids);
        }
        ids
    }
}

// =============================================================================
// PARSE RESULT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMethodLocation {
    pub definition: Location,
    pub body: Location,
    pub invocation_lines: Vec<usize>,
    pub is_async: bool,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    /// Every located bubble of the script.
    pub bubbles: BTreeMap<VariableId, ParsedBubble>,
    pub workflow: ParsedWorkflow,
    pub instance_method_locations: IndexMap<String, InstanceMethodLocation>,
}

// =============================================================================
// TRIGGER & INPUT SCHEMA
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleTrigger {
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_schedule: Option<String>,
}

/// JSON-Schema subset describing the `handle` payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSchema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<JsonSchema>>,
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl JsonSchema {
    pub fn typed(t: &str) -> Self {
        JsonSchema {
            schema_type: Some(t.to_string()),
            ..Default::default()
        }
    }

    pub fn constant(t: &str, value: serde_json::Value) -> Self {
        JsonSchema {
            schema_type: Some(t.to_string()),
            const_value: Some(value),
            ..Default::default()
        }
    }

    pub fn array_of(items: JsonSchema) -> Self {
        JsonSchema {
            schema_type: Some("array".into()),
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }

    pub fn object(properties: IndexMap<String, JsonSchema>, required: Vec<String>) -> Self {
        JsonSchema {
            schema_type: Some("object".into()),
            properties: Some(properties),
            required: Some(required),
            ..Default::default()
        }
    }

    pub fn property(&self, name: &str) -> Option<&JsonSchema> {
        self.properties.as_ref().and_then(|p| p.get(name))
    }
}
