//! Workflow Tree Builder: the control-flow skeleton of `handle`.
//!
//! Every statement of a block produces exactly one node. Statements that hold
//! a located bubble become `bubble` leaves; calls into class methods or module
//! functions become `function_call` nodes expanded with the callee body (once
//! per callee); anything unrecognised is an opaque `code_block` that still
//! carries the bubbles and calls nested inside it.

use std::collections::{BTreeMap, HashMap, HashSet};

use tree_sitter::Node;

use super::methods::MethodTable;
use crate::config::AnalyzerOptions;
use crate::ir::types::*;
use crate::parse::syntax::{CtorExpr, Statement, promise_all_argument, strip_await, strip_parens};
use crate::parse::{ClassMethod, ParsedSource, named_children, node_text, package_imports};

/// Node kind used when a value-carrying statement has no special shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    Declaration,
    Expression,
    Return,
}

pub struct WorkflowBuilder<'a, 't> {
    parsed: &'t ParsedSource,
    bubbles: &'a BTreeMap<VariableId, ParsedBubble>,
    methods: &'a MethodTable<'t>,
    options: &'a AnalyzerOptions,
    /// Local names of classes imported from the bubble package.
    imports: HashMap<String, String>,
    /// Callees whose body has been expanded somewhere in the tree.
    expanded: HashSet<String>,
    /// Callees currently being expanded.
    stack: Vec<String>,
    /// Bubbles already emitted as leaves.
    used: HashSet<VariableId>,
}

/// Build the workflow tree of `handle`.
pub fn build_workflow<'t>(
    parsed: &'t ParsedSource,
    handle: &ClassMethod<'t>,
    bubbles: &BTreeMap<VariableId, ParsedBubble>,
    methods: &MethodTable<'t>,
    options: &AnalyzerOptions,
) -> ParsedWorkflow {
    let mut builder = WorkflowBuilder {
        parsed,
        bubbles,
        methods,
        options,
        imports: package_imports(parsed.root(), parsed.source(), &options.bubble_package),
        expanded: HashSet::new(),
        stack: vec!["handle".to_string()],
        used: HashSet::new(),
    };
    let root = match handle.body {
        Some(body) => builder.block(body),
        None => Vec::new(),
    };
    let referenced = bubbles
        .iter()
        .filter(|(id, _)| builder.used.contains(*id))
        .map(|(id, b)| (*id, b.clone()))
        .collect();
    tracing::debug!(nodes = root.len(), bubbles = builder.used.len(), "built workflow tree");
    ParsedWorkflow {
        root,
        bubbles: referenced,
    }
}

impl<'a, 't> WorkflowBuilder<'a, 't> {
    fn source(&self) -> &'t str {
        self.parsed.source()
    }

    fn text(&self, node: Node<'_>) -> String {
        node_text(node, self.source()).to_string()
    }

    /// Expand a block, or a single non-block statement, into nodes.
    fn block(&mut self, node: Node<'t>) -> Vec<WorkflowNode> {
        if node.kind() == "statement_block" {
            named_children(node)
                .into_iter()
                .map(|stmt| self.statement(stmt))
                .collect()
        } else {
            vec![self.statement(node)]
        }
    }

    fn statement(&mut self, stmt: Node<'t>) -> WorkflowNode {
        match Statement::classify(stmt) {
            Statement::If {
                node,
                condition,
                consequence,
                alternative,
            } => {
                let mut children = self.scan_fields(node, &["condition"]);
                children.extend(consequence.map(|c| self.block(c)).unwrap_or_default());
                WorkflowNode::If(ConditionalNode {
                    location: Location::of(node),
                    condition: condition.map(|c| self.condition_text(c)).unwrap_or_default(),
                    children,
                    else_branch: alternative.map(|a| self.block(a)),
                    then_terminates: consequence.is_some_and(terminates),
                    else_terminates: alternative.is_some_and(terminates),
                })
            }
            Statement::For { node, body } => {
                let mut children = self.scan_fields(node, &["initializer", "condition", "increment"]);
                children.extend(body.map(|b| self.block(b)).unwrap_or_default());
                WorkflowNode::For(LoopNode {
                    location: Location::of(node),
                    condition: self.for_condition(node),
                    children,
                })
            }
            Statement::ForIn { node, body } => {
                let mut children = self.scan_fields(node, &["right"]);
                children.extend(body.map(|b| self.block(b)).unwrap_or_default());
                WorkflowNode::For(LoopNode {
                    location: Location::of(node),
                    condition: self.for_in_condition(node),
                    children,
                })
            }
            Statement::While {
                node,
                condition,
                body,
            } => {
                let mut children = self.scan_fields(node, &["condition"]);
                children.extend(body.map(|b| self.block(b)).unwrap_or_default());
                WorkflowNode::While(LoopNode {
                    location: Location::of(node),
                    condition: condition.map(|c| self.condition_text(c)).unwrap_or_default(),
                    children,
                })
            }
            Statement::Try {
                node,
                body,
                catch_body,
                finally_body,
            } => WorkflowNode::TryCatch(TryCatchNode {
                location: Location::of(node),
                children: body.map(|b| self.block(b)).unwrap_or_default(),
                catch_block: catch_body.map(|b| self.block(b)),
                finally_block: finally_body.map(|b| self.block(b)),
            }),
            Statement::Declaration { node } => self.declaration(node),
            Statement::Expression { node, expression } => match expression {
                Some(expr) if expr.kind() == "assignment_expression" => {
                    let target = expr.child_by_field_name("left").map(|l| self.text(l));
                    match expr.child_by_field_name("right") {
                        Some(right) => self.value(node, right, target, Fallback::Expression),
                        None => self.opaque(node),
                    }
                }
                Some(expr) => self.value(node, expr, None, Fallback::Expression),
                None => self.opaque(node),
            },
            Statement::Return { node, argument } => match argument {
                Some(arg) => self.value(node, arg, None, Fallback::Return),
                None => self.opaque(node),
            },
            Statement::Block { node } => WorkflowNode::CodeBlock(CodeNode {
                location: Location::of(node),
                code: self.text(node),
                children: self.block(node),
            }),
            Statement::Other(node) => self.opaque(node),
        }
    }

    /// `const x = <value>`: only a single-declarator statement is matched
    /// against bubbles and calls.
    fn declaration(&mut self, node: Node<'t>) -> WorkflowNode {
        let declarators: Vec<Node<'t>> = named_children(node)
            .into_iter()
            .filter(|d| d.kind() == "variable_declarator")
            .collect();
        if let [declarator] = declarators.as_slice() {
            if let Some(value) = declarator.child_by_field_name("value") {
                let binding = declarator.child_by_field_name("name").map(|n| self.text(n));
                return self.value(node, value, binding, Fallback::Declaration);
            }
        }
        let children = self.nested(node);
        self.fallback(node, children, Fallback::Declaration)
    }

    fn value(
        &mut self,
        stmt: Node<'t>,
        expr: Node<'t>,
        binding: Option<String>,
        fallback: Fallback,
    ) -> WorkflowNode {
        if let Some(mut children) = self.bubble_leaves(expr) {
            if children.len() == 1 {
                return children.remove(0);
            }
            return self.fallback(stmt, children, fallback);
        }
        if let Some(call) = self.call(stmt, expr, binding.clone()) {
            return call;
        }
        if let Some(parallel) = self.parallel(stmt, expr, binding) {
            return parallel;
        }
        let children = self.nested(stmt);
        self.fallback(stmt, children, fallback)
    }

    fn fallback(&self, stmt: Node<'t>, children: Vec<WorkflowNode>, fallback: Fallback) -> WorkflowNode {
        let code = CodeNode {
            location: Location::of(stmt),
            code: self.text(stmt),
            children,
        };
        match fallback {
            Fallback::Declaration if !code.children.is_empty() => WorkflowNode::VariableDeclaration(code),
            Fallback::Return if !code.children.is_empty() => WorkflowNode::Return(code),
            _ => WorkflowNode::CodeBlock(code),
        }
    }

    fn opaque(&mut self, stmt: Node<'t>) -> WorkflowNode {
        let children = self.nested(stmt);
        self.fallback(stmt, children, Fallback::Expression)
    }

    /// The bubble leaf for `expr` followed by any bubbles and calls nested in
    /// its constructor arguments. `None` when `expr` is not a located bubble.
    fn bubble_leaves(&mut self, expr: Node<'t>) -> Option<Vec<WorkflowNode>> {
        let (variable_id, arguments) = self.match_bubble(expr)?;
        let mut out = vec![WorkflowNode::Bubble(BubbleRef { variable_id })];
        if let Some(arguments) = arguments {
            out.extend(self.nested(arguments));
        }
        Some(out)
    }

    /// The located bubble whose constructor expression is `expr`, if not yet
    /// emitted, with the constructor's argument list.
    fn match_bubble(&mut self, expr: Node<'t>) -> Option<(VariableId, Option<Node<'t>>)> {
        let ctor = CtorExpr::match_node(expr, self.source())?;
        let local = ctor.class_name(self.source())?;
        let imported = self.imports.get(local).map(String::as_str);
        let at = Location::of(ctor.outer);
        let tolerance = self.options.location_tolerance;
        let id = self
            .bubbles
            .values()
            .filter(|b| !self.used.contains(&b.variable_id))
            .filter(|b| b.class_name == local || Some(b.class_name.as_str()) == imported)
            .filter(|b| b.location.start_line == at.start_line && b.location.end_line == at.end_line)
            .filter(|b| b.location.start_col.abs_diff(at.start_col) <= tolerance)
            .min_by_key(|b| b.location.start_col.abs_diff(at.start_col))
            .map(|b| b.variable_id)?;
        self.used.insert(id);
        Some((id, ctor.arguments))
    }

    /// A call into a known method or module function.
    fn call(&mut self, stmt: Node<'t>, expr: Node<'t>, binding: Option<String>) -> Option<WorkflowNode> {
        let call = strip_await(expr);
        if call.kind() != "call_expression" {
            return None;
        }
        let methods = self.methods;
        let (callable, site) = methods.resolve_call(call, self.source())?;
        let name = callable.name.clone();
        let has_bubbles = methods.contains_bubbles(&name, self.bubbles);

        let mut children = call
            .child_by_field_name("arguments")
            .map(|args| self.nested(args))
            .unwrap_or_default();
        let expand = has_bubbles
            && self.options.expand_method_calls
            && !self.expanded.contains(&name)
            && !self.stack.contains(&name);
        if expand {
            self.expanded.insert(name.clone());
            self.stack.push(name.clone());
            match callable.body {
                Some(body) if body.kind() == "statement_block" => children.extend(self.block(body)),
                Some(body) => children.push(self.value(body, body, None, Fallback::Return)),
                None => {}
            }
            self.stack.pop();
        }

        let node = FunctionCallNode {
            location: Location::of(stmt),
            function_name: name,
            is_method_call: site.is_this,
            method_definition: Some(MethodDefinition {
                location: Location::of(callable.definition),
                is_async: callable.is_async,
                parameters: callable.parameters.clone(),
            }),
            variable_declaration: binding,
            code: self.text(stmt),
            children,
        };
        Some(if has_bubbles || !node.children.is_empty() {
            WorkflowNode::FunctionCall(node)
        } else {
            WorkflowNode::TransformationFunction(node)
        })
    }

    /// `Promise.all([...])`: one child per task.
    fn parallel(&mut self, stmt: Node<'t>, expr: Node<'t>, binding: Option<String>) -> Option<WorkflowNode> {
        let argument = promise_all_argument(expr, self.source())?;
        let children = if argument.kind() == "array" {
            named_children(argument)
                .into_iter()
                .map(|task| self.task(task))
                .collect()
        } else {
            self.nested(argument)
        };
        Some(WorkflowNode::ParallelExecution(ParallelNode {
            location: Location::of(stmt),
            variable_declaration: binding,
            code: self.text(stmt),
            children,
        }))
    }

    fn task(&mut self, task: Node<'t>) -> WorkflowNode {
        if let Some(mut children) = self.bubble_leaves(task) {
            if children.len() == 1 {
                return children.remove(0);
            }
            return self.fallback(task, children, Fallback::Expression);
        }
        if let Some(call) = self.call(task, task, None) {
            return call;
        }
        let mut children = Vec::new();
        self.collect(task, &mut children);
        WorkflowNode::CodeBlock(CodeNode {
            location: Location::of(task),
            code: self.text(task),
            children,
        })
    }

    /// Bubbles and calls nested anywhere below `node`, in source order.
    fn nested(&mut self, node: Node<'t>) -> Vec<WorkflowNode> {
        let mut out = Vec::new();
        for child in named_children(node) {
            self.collect(child, &mut out);
        }
        out
    }

    /// Bubbles and calls found in the given header fields of a control-flow
    /// statement (`if` test, loop clauses), in field order.
    fn scan_fields(&mut self, node: Node<'t>, fields: &[&str]) -> Vec<WorkflowNode> {
        let mut out = Vec::new();
        for field in fields {
            if let Some(child) = node.child_by_field_name(field) {
                self.collect(child, &mut out);
            }
        }
        out
    }

    fn collect(&mut self, node: Node<'t>, out: &mut Vec<WorkflowNode>) {
        if let Some(leaves) = self.bubble_leaves(node) {
            out.extend(leaves);
            return;
        }
        if node.kind() == "call_expression" {
            if let Some(call) = self.call(node, node, None) {
                out.push(call);
                return;
            }
        }
        for child in named_children(node) {
            self.collect(child, out);
        }
    }

    fn condition_text(&self, condition: Node<'_>) -> String {
        let inner = strip_parens(condition);
        self.text(inner)
    }

    /// `init; test; update` of a classic `for` loop.
    fn for_condition(&self, node: Node<'_>) -> String {
        let part = |field: &str| {
            node.child_by_field_name(field)
                .map(|n| {
                    node_text(n, self.source())
                        .trim()
                        .trim_end_matches(';')
                        .trim()
                        .to_string()
                })
                .unwrap_or_default()
        };
        format!("{}; {}; {}", part("initializer"), part("condition"), part("increment"))
    }

    /// `kind left of right` of a `for...in` / `for...of` loop.
    fn for_in_condition(&self, node: Node<'_>) -> String {
        ["kind", "left", "operator", "right"]
            .iter()
            .filter_map(|field| node.child_by_field_name(*field))
            .map(|n| self.text(n))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Whether control never falls through the end of `node`.
fn terminates(node: Node<'_>) -> bool {
    match node.kind() {
        "return_statement" | "throw_statement" => true,
        "statement_block" => named_children(node).last().copied().is_some_and(terminates),
        "if_statement" => match Statement::classify(node) {
            Statement::If {
                consequence,
                alternative,
                ..
            } => consequence.is_some_and(terminates) && alternative.is_some_and(terminates),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::BubbleNodeType;
    use crate::lower::locate::locate_bubbles;
    use crate::parse::{find_flow_classes, parse_source};
    use crate::registry::{BubbleDescriptor, BubbleRegistry};

    fn registry() -> BubbleRegistry {
        BubbleRegistry::from_descriptors([
            BubbleDescriptor::new("slack", "SlackBubble", BubbleNodeType::Service),
            BubbleDescriptor::new("http", "HttpBubble", BubbleNodeType::Service),
        ])
    }

    fn workflow(src: &str) -> ParsedWorkflow {
        workflow_with(src, AnalyzerOptions::default())
    }

    fn workflow_with(src: &str, options: AnalyzerOptions) -> ParsedWorkflow {
        let parsed = parse_source(src).unwrap();
        let bubbles = locate_bubbles(&parsed, &registry(), &options).unwrap();
        let class = find_flow_classes(parsed.root(), parsed.source(), "BubbleFlow")[0];
        let methods = MethodTable::build(&parsed, Some(&class));
        let handle = class.handle(parsed.source()).unwrap();
        build_workflow(&parsed, &handle, &bubbles, &methods, &options)
    }

    #[test]
    fn one_node_per_statement() {
        let wf = workflow(
            r#"export class F extends BubbleFlow<'webhook/http'> {
  async handle(payload: any) {
    const x = 1;
    const res = await new HttpBubble({ url: 'u' }).action();
    await new SlackBubble({ channel: 'c' }).action();
    console.log(res);
    return { ok: true };
  }
}
"#,
        );
        let kinds: Vec<&str> = wf.root.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["code_block", "bubble", "bubble", "code_block", "code_block"]);
        assert_eq!(wf.bubbles.len(), 2);
    }

    #[test]
    fn else_if_nests_inside_else_branch() {
        let wf = workflow(
            r#"export class F extends BubbleFlow<'webhook/http'> {
  async handle(p: any) {
    if (p.a) {
      return 1;
    } else if (p.b) {
      await new SlackBubble({ channel: 'b' }).action();
    } else {
      throw new Error('x');
    }
  }
}
"#,
        );
        let WorkflowNode::If(outer) = &wf.root[0] else {
            panic!("expected if");
        };
        assert_eq!(outer.condition, "p.a");
        assert!(outer.then_terminates);
        assert!(!outer.else_terminates);
        let else_branch = outer.else_branch.as_ref().unwrap();
        assert_eq!(else_branch.len(), 1);
        let WorkflowNode::If(inner) = &else_branch[0] else {
            panic!("expected nested if");
        };
        assert_eq!(inner.condition, "p.b");
        assert_eq!(inner.children[0].kind(), "bubble");
        assert!(inner.else_terminates);
    }

    #[test]
    fn loops_and_try_blocks() {
        let wf = workflow(
            r#"export class F extends BubbleFlow<'webhook/http'> {
  async handle(p: any) {
    for (let i = 0; i < 3; i++) {
      await new HttpBubble({ url: 'a' }).action();
    }
    for (const item of p.items) {}
    while (p.more) {}
    try {
      await new SlackBubble({ channel: 'x' }).action();
    } catch (e) {
      console.error(e);
    } finally {
      done();
    }
  }
}
"#,
        );
        let WorkflowNode::For(classic) = &wf.root[0] else {
            panic!("expected for");
        };
        assert_eq!(classic.condition, "let i = 0; i < 3; i++");
        assert_eq!(classic.children[0].kind(), "bubble");
        let WorkflowNode::For(for_of) = &wf.root[1] else {
            panic!("expected for-of");
        };
        assert_eq!(for_of.condition, "const item of p.items");
        assert_eq!(wf.root[2].kind(), "while");
        let WorkflowNode::TryCatch(t) = &wf.root[3] else {
            panic!("expected try");
        };
        assert_eq!(t.children[0].kind(), "bubble");
        assert_eq!(t.catch_block.as_ref().unwrap().len(), 1);
        assert_eq!(t.finally_block.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn method_calls_expand_once() {
        let wf = workflow(
            r#"export class F extends BubbleFlow<'webhook/http'> {
  async handle(p: any) {
    const data = await this.fetchData(p);
    await this.fetchData(p);
    const clean = this.normalize(data);
  }

  private async fetchData(p: any) {
    return await new HttpBubble({ url: p.url }).action();
  }

  private normalize(d: any) {
    return d;
  }
}
"#,
        );
        let WorkflowNode::FunctionCall(first) = &wf.root[0] else {
            panic!("expected function call");
        };
        assert_eq!(first.function_name, "fetchData");
        assert!(first.is_method_call);
        assert_eq!(first.variable_declaration.as_deref(), Some("data"));
        assert_eq!(first.children[0].kind(), "bubble");
        assert_eq!(first.method_definition.as_ref().unwrap().parameters, vec!["p"]);

        let WorkflowNode::FunctionCall(second) = &wf.root[1] else {
            panic!("expected function call");
        };
        assert!(second.children.is_empty());

        assert_eq!(wf.root[2].kind(), "transformation_function");
        assert_eq!(wf.bubble_ids().len(), 1);
    }

    #[test]
    fn promise_all_becomes_parallel_execution() {
        let wf = workflow(
            r#"export class F extends BubbleFlow<'webhook/http'> {
  async handle(p: any) {
    const [a, b] = await Promise.all([
      new HttpBubble({ url: 'a' }).action(),
      new HttpBubble({ url: 'b' }).action(),
    ]);
  }
}
"#,
        );
        let WorkflowNode::ParallelExecution(par) = &wf.root[0] else {
            panic!("expected parallel execution");
        };
        assert_eq!(par.variable_declaration.as_deref(), Some("[a, b]"));
        assert_eq!(par.children.len(), 2);
        assert!(par.children.iter().all(|c| c.kind() == "bubble"));
    }

    #[test]
    fn nested_bubbles_attach_to_code_blocks() {
        let wf = workflow(
            r#"export class F extends BubbleFlow<'webhook/http'> {
  async handle(p: any) {
    const posts = await Promise.resolve(p.items.map((i: any) => new SlackBubble({ channel: i })));
    switch (p.kind) {
      case 'a':
        await new HttpBubble({ url: 'a' }).action();
        break;
    }
  }
}
"#,
        );
        assert_eq!(wf.root[0].kind(), "variable_declaration");
        assert_eq!(wf.root[1].kind(), "code_block");
        assert_eq!(wf.bubble_ids().len(), 2);
    }

    #[test]
    fn calls_in_control_flow_headers_are_expanded() {
        let wf = workflow(
            r#"export class F extends BubbleFlow<'webhook/http'> {
  async handle(p: any) {
    if (await this.check(p)) {
      console.log('ok');
    }
    for (const row of await this.load()) {}
    while (await this.more()) {}
  }

  private async check(p: any) {
    return await new HttpBubble({ url: 'check' }).action();
  }

  private async load() {
    return await new HttpBubble({ url: 'load' }).action();
  }

  private async more() {
    return await new SlackBubble({ channel: 'more' }).action();
  }
}
"#,
        );
        let WorkflowNode::If(branch) = &wf.root[0] else {
            panic!("expected if");
        };
        let kinds: Vec<&str> = branch.children.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["function_call", "code_block"]);
        let WorkflowNode::FunctionCall(check) = &branch.children[0] else {
            panic!("expected function call");
        };
        assert_eq!(check.function_name, "check");
        assert_eq!(check.children[0].kind(), "bubble");

        let WorkflowNode::For(each) = &wf.root[1] else {
            panic!("expected for-of");
        };
        assert_eq!(each.children[0].kind(), "function_call");
        let WorkflowNode::While(repeat) = &wf.root[2] else {
            panic!("expected while");
        };
        assert_eq!(repeat.children[0].kind(), "function_call");
        assert_eq!(wf.bubble_ids().len(), 3);
    }

    #[test]
    fn unregistered_constructor_never_claims_a_bubble() {
        let options = AnalyzerOptions {
            location_tolerance: 40,
            ..AnalyzerOptions::default()
        };
        let wf = workflow_with(
            r#"export class F extends BubbleFlow<'webhook/http'> {
  async handle(p: any) {
    new Foo(); new SlackBubble({ channel: 'c' });
  }
}
"#,
            options,
        );
        let kinds: Vec<&str> = wf.root.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["code_block", "bubble"]);
        assert_eq!(wf.bubble_ids(), vec![-1]);
    }

    #[test]
    fn calls_inside_constructor_arguments_follow_the_bubble() {
        let wf = workflow(
            r#"export class F extends BubbleFlow<'webhook/http'> {
  async handle(p: any) {
    await new SlackBubble({ text: await this.summarize(p) }).action();
  }

  private async summarize(p: any) {
    return await new HttpBubble({ url: p.url }).action();
  }
}
"#,
        );
        let WorkflowNode::CodeBlock(block) = &wf.root[0] else {
            panic!("expected code block, got {:?}", wf.root[0]);
        };
        let kinds: Vec<&str> = block.children.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["bubble", "function_call"]);
        assert_eq!(wf.bubble_ids().len(), 2);
    }
}
