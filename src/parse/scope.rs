//! Lexical scope analysis over the tree-sitter AST.
//!
//! Scopes form a tree mirroring block nesting (global → module → class /
//! function → block / for / catch). Every declared binding becomes a
//! [`Variable`] with an id drawn from an [`IdCounter`] owned by the parse, so
//! re-parsing unchanged text reproduces the same ids.

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use super::syntax::pattern_names;
use super::{line_count, named_children, node_text};
use crate::ir::types::{Location, VariableId};

pub type ScopeId = usize;

/// Identifiers that are never reported as visible script variables.
const BUILTIN_GLOBALS: &[&str] = &[
    "console", "process", "Array", "Object", "String", "Number", "Boolean", "Math", "JSON",
    "Date", "Promise", "Error", "Map", "Set", "RegExp", "Symbol", "BigInt", "Buffer",
    "globalThis", "window", "document", "undefined", "NaN", "Infinity", "setTimeout",
    "clearTimeout", "setInterval", "clearInterval", "fetch", "URL", "URLSearchParams",
    "parseInt", "parseFloat", "isNaN", "encodeURIComponent", "decodeURIComponent", "require",
    "module", "exports", "arguments",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_GLOBALS.contains(&name)
}

/// Monotonic variable id source, owned by one parse.
#[derive(Debug, Clone)]
pub struct IdCounter {
    next: VariableId,
}

impl IdCounter {
    pub fn new() -> Self {
        IdCounter { next: 1 }
    }

    pub fn next_id(&mut self) -> VariableId {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Global,
    Module,
    Class,
    Function,
    Block,
    For,
    Catch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    Const,
    Let,
    Var,
    Parameter,
    Function,
    Class,
    Import,
    CatchParam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    pub kind: BindingKind,
    /// Span of the binding identifier.
    pub location: Location,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub start_line: usize,
    pub end_line: usize,
    /// Indices into [`ScopeTree::variables`].
    pub variables: Vec<usize>,
}

impl Scope {
    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    fn width(&self) -> usize {
        self.end_line - self.start_line
    }
}

/// The most specific scope at a line, with its direct variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeInfo {
    pub kind: ScopeKind,
    pub start_line: usize,
    pub end_line: usize,
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    variables: Vec<Variable>,
}

impl ScopeTree {
    /// Walk a `program` node and record every scope and binding.
    pub fn build(root: Node<'_>, source: &str, ids: &mut IdCounter) -> Self {
        let mut builder = ScopeBuilder {
            tree: ScopeTree::default(),
            source,
            ids,
        };
        let last_line = line_count(source).max(root.end_position().row + 1);
        let global = builder.push_scope(ScopeKind::Global, None, 1, last_line);
        let module = builder.push_scope(ScopeKind::Module, Some(global), 1, last_line);
        builder.walk_children(root, module);
        builder.tree
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.variables.iter().find(|v| v.id == id)
    }

    /// The variable whose binding identifier sits exactly at `location`.
    pub fn variable_at(&self, name: &str, location: Location) -> Option<&Variable> {
        self.variables
            .iter()
            .find(|v| v.name == name && v.location == location)
    }

    /// Variables visible at `line`: every scope whose range contains the line
    /// plus all of their ancestors, restricted to bindings declared at or
    /// before the line. Built-in globals are never reported.
    pub fn variables_visible_at(&self, line: usize) -> Vec<&Variable> {
        let mut seen = vec![false; self.variables.len()];
        let mut out = Vec::new();
        for scope in self.scopes.iter().filter(|s| s.contains_line(line)) {
            for ancestor in self.ancestors(scope.id) {
                for &idx in &self.scopes[ancestor].variables {
                    if seen[idx] {
                        continue;
                    }
                    seen[idx] = true;
                    let var = &self.variables[idx];
                    if var.location.start_line <= line && !is_builtin(&var.name) {
                        out.push(var);
                    }
                }
            }
        }
        out.sort_by_key(|v| v.id);
        out
    }

    /// The smallest scope containing `line`. On equal ranges a module scope
    /// wins over the global scope, otherwise the more deeply nested one.
    pub fn scope_info_at(&self, line: usize) -> Option<ScopeInfo> {
        let best = self
            .scopes
            .iter()
            .filter(|s| s.contains_line(line))
            .min_by(|a, b| {
                a.width()
                    .cmp(&b.width())
                    .then_with(|| tie_rank(a.kind).cmp(&tie_rank(b.kind)))
                    .then_with(|| b.id.cmp(&a.id))
            })?;
        Some(ScopeInfo {
            kind: best.kind,
            start_line: best.start_line,
            end_line: best.end_line,
            variables: best
                .variables
                .iter()
                .map(|&i| self.variables[i].clone())
                .collect(),
        })
    }

    /// Resolve `name` as seen from `line`. Candidate scopes are searched from
    /// the most specific outwards; `None` when no binding declared at or before
    /// the line matches.
    pub fn resolve_variable(&self, name: &str, line: usize) -> Option<VariableId> {
        let mut containing: Vec<&Scope> = self.scopes.iter().filter(|s| s.contains_line(line)).collect();
        containing.sort_by(|a, b| a.width().cmp(&b.width()).then_with(|| b.id.cmp(&a.id)));
        for scope in containing {
            for ancestor in self.ancestors(scope.id) {
                let found = self.scopes[ancestor]
                    .variables
                    .iter()
                    .map(|&i| &self.variables[i])
                    .filter(|v| v.name == name && v.location.start_line <= line)
                    .max_by_key(|v| v.location.start_line);
                if let Some(var) = found {
                    return Some(var.id);
                }
            }
        }
        None
    }

    /// `scope` followed by each enclosing scope up to the global scope.
    fn ancestors(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut out = vec![scope];
        let mut current = self.scopes[scope].parent;
        while let Some(id) = current {
            out.push(id);
            current = self.scopes[id].parent;
        }
        out
    }
}

fn tie_rank(kind: ScopeKind) -> u8 {
    match kind {
        ScopeKind::Global => 1,
        _ => 0,
    }
}

struct ScopeBuilder<'a> {
    tree: ScopeTree,
    source: &'a str,
    ids: &'a mut IdCounter,
}

impl ScopeBuilder<'_> {
    fn push_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>, start_line: usize, end_line: usize) -> ScopeId {
        let id = self.tree.scopes.len();
        self.tree.scopes.push(Scope {
            id,
            kind,
            parent,
            start_line,
            end_line,
            variables: Vec::new(),
        });
        id
    }

    fn push_node_scope(&mut self, kind: ScopeKind, parent: ScopeId, node: Node<'_>) -> ScopeId {
        self.push_scope(
            kind,
            Some(parent),
            node.start_position().row + 1,
            node.end_position().row + 1,
        )
    }

    fn declare(&mut self, name_node: Node<'_>, kind: BindingKind, scope: ScopeId) {
        let name = node_text(name_node, self.source);
        if name.is_empty() {
            return;
        }
        let idx = self.tree.variables.len();
        self.tree.variables.push(Variable {
            id: self.ids.next_id(),
            name: name.to_string(),
            kind,
            location: Location::of(name_node),
            scope,
        });
        self.tree.scopes[scope].variables.push(idx);
    }

    fn declare_pattern(&mut self, pattern: Node<'_>, kind: BindingKind, scope: ScopeId) {
        for name in pattern_names(pattern) {
            self.declare(name, kind, scope);
        }
    }

    /// Nearest enclosing function or module scope (`var` hoisting target).
    fn hoist_target(&self, mut scope: ScopeId) -> ScopeId {
        loop {
            let s = &self.tree.scopes[scope];
            match (s.kind, s.parent) {
                (ScopeKind::Function | ScopeKind::Module | ScopeKind::Global, _) => return scope,
                (_, Some(parent)) => scope = parent,
                (_, None) => return scope,
            }
        }
    }

    fn walk_children(&mut self, node: Node<'_>, scope: ScopeId) {
        for child in named_children(node) {
            self.walk(child, scope);
        }
    }

    fn walk_field(&mut self, node: Node<'_>, field: &str, scope: ScopeId) {
        if let Some(child) = node.child_by_field_name(field) {
            self.walk(child, scope);
        }
    }

    fn walk(&mut self, node: Node<'_>, scope: ScopeId) {
        match node.kind() {
            "lexical_declaration" | "variable_declaration" => self.walk_declaration(node, scope),
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(name, BindingKind::Function, scope);
                }
                self.walk_function(node, scope);
            }
            "function_expression" | "function" | "generator_function" | "arrow_function"
            | "method_definition" => self.walk_function(node, scope),
            "class_declaration" | "abstract_class_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(name, BindingKind::Class, scope);
                }
                self.walk_class(node, scope);
            }
            "class" => self.walk_class(node, scope),
            "statement_block" | "switch_body" => {
                let block = self.push_node_scope(ScopeKind::Block, scope, node);
                self.walk_children(node, block);
            }
            "for_statement" => {
                let for_scope = self.push_node_scope(ScopeKind::For, scope, node);
                self.walk_field(node, "initializer", for_scope);
                self.walk_field(node, "condition", for_scope);
                self.walk_field(node, "increment", for_scope);
                self.walk_field(node, "body", for_scope);
            }
            "for_in_statement" => {
                let for_scope = self.push_node_scope(ScopeKind::For, scope, node);
                if let Some(left) = node.child_by_field_name("left") {
                    match node.child_by_field_name("kind").map(|k| node_text(k, self.source)) {
                        Some("const") => self.declare_pattern(left, BindingKind::Const, for_scope),
                        Some("let") => self.declare_pattern(left, BindingKind::Let, for_scope),
                        Some(_) => {
                            let target = self.hoist_target(scope);
                            self.declare_pattern(left, BindingKind::Var, target);
                        }
                        None => self.walk(left, for_scope),
                    }
                }
                self.walk_field(node, "right", for_scope);
                self.walk_field(node, "body", for_scope);
            }
            "catch_clause" => {
                let catch_scope = self.push_node_scope(ScopeKind::Catch, scope, node);
                if let Some(param) = node.child_by_field_name("parameter") {
                    self.declare_pattern(param, BindingKind::CatchParam, catch_scope);
                }
                self.walk_field(node, "body", catch_scope);
            }
            "import_statement" => self.walk_import(node, scope),
            // Type-level declarations introduce no value bindings.
            "interface_declaration" | "type_alias_declaration" | "comment" => {}
            _ => self.walk_children(node, scope),
        }
    }

    fn walk_declaration(&mut self, node: Node<'_>, scope: ScopeId) {
        let keyword = node
            .child_by_field_name("kind")
            .map(|k| node_text(k, self.source))
            .unwrap_or("var");
        let (kind, target) = match keyword {
            "const" => (BindingKind::Const, scope),
            "let" => (BindingKind::Let, scope),
            _ => (BindingKind::Var, self.hoist_target(scope)),
        };
        for declarator in named_children(node) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            if let Some(name) = declarator.child_by_field_name("name") {
                self.declare_pattern(name, kind, target);
                // Default values inside the pattern may hold functions.
                if name.kind() != "identifier" {
                    self.walk_pattern_defaults(name, scope);
                }
            }
            self.walk_field(declarator, "value", scope);
        }
    }

    fn walk_pattern_defaults(&mut self, pattern: Node<'_>, scope: ScopeId) {
        for child in named_children(pattern) {
            match child.kind() {
                "object_assignment_pattern" | "assignment_pattern" => {
                    self.walk_field(child, "right", scope)
                }
                "object_pattern" | "array_pattern" | "pair_pattern" => {
                    self.walk_pattern_defaults(child, scope)
                }
                _ => {}
            }
        }
    }

    fn walk_function(&mut self, node: Node<'_>, scope: ScopeId) {
        let fn_scope = self.push_node_scope(ScopeKind::Function, scope, node);
        if let Some(param) = node.child_by_field_name("parameter") {
            self.declare_pattern(param, BindingKind::Parameter, fn_scope);
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            for param in named_children(params) {
                let pattern = param.child_by_field_name("pattern").unwrap_or(param);
                self.declare_pattern(pattern, BindingKind::Parameter, fn_scope);
                self.walk_field(param, "value", fn_scope);
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            if body.kind() == "statement_block" {
                // The body block shares the function scope.
                self.walk_children(body, fn_scope);
            } else {
                self.walk(body, fn_scope);
            }
        }
    }

    fn walk_class(&mut self, node: Node<'_>, scope: ScopeId) {
        let class_scope = self.push_node_scope(ScopeKind::Class, scope, node);
        if let Some(body) = node.child_by_field_name("body") {
            for member in named_children(body) {
                match member.kind() {
                    "method_definition" => self.walk_function(member, class_scope),
                    "public_field_definition" | "field_definition" => {
                        self.walk_field(member, "value", class_scope)
                    }
                    _ => self.walk(member, class_scope),
                }
            }
        }
    }

    fn walk_import(&mut self, node: Node<'_>, scope: ScopeId) {
        for child in named_children(node) {
            if child.kind() != "import_clause" {
                continue;
            }
            for part in named_children(child) {
                match part.kind() {
                    "identifier" => self.declare(part, BindingKind::Import, scope),
                    "namespace_import" => {
                        for id in named_children(part) {
                            if id.kind() == "identifier" {
                                self.declare(id, BindingKind::Import, scope);
                            }
                        }
                    }
                    "named_imports" => {
                        for spec in named_children(part) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            let local = spec
                                .child_by_field_name("alias")
                                .or_else(|| spec.child_by_field_name("name"));
                            if let Some(local) = local {
                                self.declare(local, BindingKind::Import, scope);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}
