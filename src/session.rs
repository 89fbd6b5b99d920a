//! Edit sessions: one source buffer, its latest analysis and the line-based
//! mutation API.
//!
//! A session is owned by one logical editor. Every mutation marks the
//! analysis stale; scope queries and reassignments then fail with
//! [`MutationError::Stale`] until [`FlowSession::parse`] runs again.

use std::collections::BTreeMap;

use regex::Regex;
use tree_sitter::{Node, Point};

use crate::config::AnalyzerOptions;
use crate::error::{FlowError, MutationError};
use crate::ir::types::{BubbleTrigger, JsonSchema, ParseResult, VariableId};
use crate::lower::{analyze_parsed, credentials, schema, trigger};
use crate::parse::{ParsedSource, ScopeInfo, Variable, parse_source};
use crate::registry::CapabilityRegistry;
use crate::validate::validate_parsed;

struct Analysis {
    parsed: ParsedSource,
    result: ParseResult,
}

pub struct FlowSession<'r> {
    registry: &'r dyn CapabilityRegistry,
    options: AnalyzerOptions,
    source: String,
    analysis: Option<Analysis>,
}

impl<'r> FlowSession<'r> {
    pub fn new(source: impl Into<String>, registry: &'r dyn CapabilityRegistry, options: AnalyzerOptions) -> Self {
        FlowSession {
            registry,
            options,
            source: source.into(),
            analysis: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    /// Whether the buffer changed since the last successful parse.
    pub fn is_stale(&self) -> bool {
        self.analysis.is_none()
    }

    /// Re-parse and re-analyze the current buffer from scratch. Ids restart
    /// at 1 on every call, so unchanged text yields identical ids.
    pub fn parse(&mut self) -> Result<&ParseResult, Vec<FlowError>> {
        self.analysis = None;
        let parsed = parse_source(&self.source)?;
        let result = analyze_parsed(&parsed, self.registry, &self.options)?;
        let analysis = self.analysis.insert(Analysis { parsed, result });
        Ok(&analysis.result)
    }

    /// The latest analysis, `None` when stale.
    pub fn result(&self) -> Option<&ParseResult> {
        self.analysis.as_ref().map(|a| &a.result)
    }

    fn fresh(&self) -> Result<&Analysis, MutationError> {
        self.analysis.as_ref().ok_or(MutationError::Stale)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn variables_visible_at(&self, line: usize) -> Result<Vec<&Variable>, MutationError> {
        Ok(self.fresh()?.parsed.scopes().variables_visible_at(line))
    }

    pub fn scope_info_at(&self, line: usize) -> Result<Option<ScopeInfo>, MutationError> {
        Ok(self.fresh()?.parsed.scopes().scope_info_at(line))
    }

    pub fn resolve_variable(&self, name: &str, line: usize) -> Result<Option<VariableId>, MutationError> {
        Ok(self.fresh()?.parsed.scopes().resolve_variable(name, line))
    }

    pub fn trigger(&self) -> Result<Option<BubbleTrigger>, MutationError> {
        Ok(trigger::extract_trigger(&self.fresh()?.parsed, &self.options))
    }

    pub fn input_schema(&self) -> Result<Option<JsonSchema>, MutationError> {
        Ok(schema::infer_input_schema(&self.fresh()?.parsed, &self.options))
    }

    pub fn required_credentials(&self) -> Result<BTreeMap<VariableId, Vec<String>>, MutationError> {
        let analysis = self.fresh()?;
        Ok(credentials::required_credentials(&analysis.result.bubbles, self.registry))
    }

    pub fn validate(&self) -> Result<Vec<FlowError>, MutationError> {
        Ok(validate_parsed(&self.fresh()?.parsed, self.registry, &self.options))
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Replace the value assigned to `variable_id` at its declaration with
    /// `new_value`. A `const|let|var name = ...` declarator has just its
    /// initializer replaced, so the rest of the line survives. Otherwise the
    /// declaration line must read `name = ...` with nothing after the value.
    pub fn reassign_variable(&mut self, variable_id: VariableId, new_value: &str) -> Result<&str, MutationError> {
        let analysis = self.fresh()?;
        let variable = analysis
            .parsed
            .scopes()
            .variable(variable_id)
            .ok_or(MutationError::VariableNotFound(variable_id))?;
        let name = variable.name.clone();
        let line = variable.location.start_line;

        let next = match declared_value(&analysis.parsed, variable) {
            Some(value) => {
                if value.start_position().row != value.end_position().row {
                    return Err(MutationError::MultiLineValue { name, line });
                }
                let mut next = String::with_capacity(self.source.len() + new_value.len());
                next.push_str(&self.source[..value.start_byte()]);
                next.push_str(new_value.trim());
                next.push_str(&self.source[value.end_byte()..]);
                next
            }
            None => self.rewrite_line(&name, line, new_value)?,
        };

        tracing::debug!(variable_id, line, "reassigned variable");
        self.replace_source(next);
        Ok(&self.source)
    }

    fn rewrite_line(&self, name: &str, line: usize, new_value: &str) -> Result<String, MutationError> {
        let (mut lines, eol, trailing) = split_lines(&self.source);
        let Some(text) = lines.get(line - 1) else {
            return Err(MutationError::LineOutOfRange {
                line,
                max: lines.len(),
            });
        };
        let replaced = rewrite_assignment(text, name, new_value).ok_or_else(|| {
            MutationError::PatternNotMatched {
                name: name.to_string(),
                line,
                text: text.to_string(),
            }
        })?;
        lines[line - 1] = &replaced;
        Ok(join_lines(&lines, eol, trailing))
    }

    /// Insert `lines` so the first of them becomes line `at` (1-based). `at`
    /// may be one past the last line to append.
    pub fn inject_lines<S: AsRef<str>>(&mut self, new_lines: &[S], at: usize) -> Result<&str, MutationError> {
        let (mut lines, eol, trailing) = split_lines(&self.source);
        let max = lines.len() + 1;
        if at == 0 || at > max {
            return Err(MutationError::LineOutOfRange { line: at, max });
        }
        let index = at - 1;
        lines.splice(index..index, new_lines.iter().map(|l| l.as_ref()));
        let next = join_lines(&lines, eol, trailing);

        tracing::debug!(count = new_lines.len(), at, "injected lines");
        self.replace_source(next);
        Ok(&self.source)
    }

    /// Swap the buffer wholesale, e.g. after an external edit.
    pub fn replace_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.analysis = None;
    }
}

/// The initialiser of the declarator binding `variable` by its plain name.
/// Destructuring patterns yield `None`.
fn declared_value<'t>(parsed: &'t ParsedSource, variable: &Variable) -> Option<Node<'t>> {
    let loc = variable.location;
    let start = Point::new(loc.start_line - 1, loc.start_col);
    let end = Point::new(loc.end_line - 1, loc.end_col);
    let mut node = parsed.root().descendant_for_point_range(start, end)?;
    while node.kind() != "variable_declarator" {
        if matches!(node.kind(), "statement_block" | "program") {
            return None;
        }
        node = node.parent()?;
    }
    let name = node.child_by_field_name("name")?;
    if name.kind() != "identifier" || name.start_position() != start {
        return None;
    }
    node.child_by_field_name("value")
}

/// Rewrite one source line assigning to `name`, keeping indentation, the
/// declaration keyword, any type annotation and the trailing semicolon.
/// Lines carrying anything after the value are left alone.
fn rewrite_assignment(line: &str, name: &str, new_value: &str) -> Option<String> {
    let pattern = format!(
        r"^(\s*)((?:(?:export\s+)?(?:const|let|var)\s+)?{}\b(?:\s*:[^=]*)?\s*=\s*)(.*?)(;?)\s*$",
        regex::escape(name)
    );
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(line)?;
    let value = caps.get(3).map_or("", |m| m.as_str());
    // `name == x`, `name === x` and `name => x` are not assignments
    if value.starts_with('=') || value.starts_with('>') {
        return None;
    }
    // a later statement or comment shares the line
    if value.contains(';') || value.contains("//") || value.contains("/*") {
        return None;
    }
    let indent = caps.get(1).map_or("", |m| m.as_str());
    let head = caps.get(2).map_or("", |m| m.as_str());
    let semi = caps.get(4).map_or("", |m| m.as_str());
    Some(format!("{}{}{}{}", indent, head, new_value.trim(), semi))
}

/// Lines of `source`, its line terminator, and whether it ends with one.
fn split_lines(source: &str) -> (Vec<&str>, &'static str, bool) {
    let eol = if source.contains("\r\n") { "\r\n" } else { "\n" };
    let trailing = source.ends_with('\n');
    let lines = source.lines().collect();
    (lines, eol, trailing)
}

fn join_lines(lines: &[&str], eol: &str, trailing: bool) -> String {
    let mut out = lines.join(eol);
    if trailing && !lines.is_empty() {
        out.push_str(eol);
    }
    out
}
