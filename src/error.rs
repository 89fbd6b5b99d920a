//! Unified analyzer error type used across all phases.

use serde::{Deserialize, Serialize};

use crate::ir::validate::ValidationError;
use crate::ir::types::VariableId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Syntax,
    Validate,
    Trigger,
    Extract,
    Mutate,
    Invariant,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Syntax => write!(f, "Syntax"),
            Phase::Validate => write!(f, "Validate"),
            Phase::Trigger => write!(f, "Trigger"),
            Phase::Extract => write!(f, "Extract"),
            Phase::Mutate => write!(f, "Mutate"),
            Phase::Invariant => write!(f, "Invariant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowError {
    pub code: String,
    pub phase: Phase,
    pub message: String,
    /// 1-based source line the error points at, if any.
    pub line: Option<usize>,
}

impl std::fmt::Display for FlowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(
                f,
                "[{}:{}] {} (line {})",
                self.phase, self.code, self.message, line
            ),
            None => write!(f, "[{}:{}] {}", self.phase, self.code, self.message),
        }
    }
}

impl std::error::Error for FlowError {}

impl From<ValidationError> for FlowError {
    fn from(e: ValidationError) -> Self {
        FlowError {
            code: e.code.to_string(),
            phase: Phase::Invariant,
            message: e.message,
            line: None,
        }
    }
}

impl FlowError {
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        FlowError {
            code: "P001".into(),
            phase: Phase::Syntax,
            message: message.into(),
            line: Some(line),
        }
    }

    pub fn validate(code: &str, message: impl Into<String>, line: Option<usize>) -> Self {
        FlowError {
            code: code.into(),
            phase: Phase::Validate,
            message: message.into(),
            line,
        }
    }

    pub fn trigger(code: &str, message: impl Into<String>, line: Option<usize>) -> Self {
        FlowError {
            code: code.into(),
            phase: Phase::Trigger,
            message: message.into(),
            line,
        }
    }

    pub fn extract(code: &str, message: impl Into<String>, line: Option<usize>) -> Self {
        FlowError {
            code: code.into(),
            phase: Phase::Extract,
            message: message.into(),
            line,
        }
    }
}

/// Failure of a line-based source rewrite. The buffer is never modified when
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("variable {0} was not found in the current scope graph")]
    VariableNotFound(VariableId),
    #[error("line {line} does not contain an assignment to '{name}': {text}")]
    PatternNotMatched {
        name: String,
        line: usize,
        text: String,
    },
    #[error("the value assigned to '{name}' on line {line} spans multiple lines")]
    MultiLineValue { name: String, line: usize },
    #[error("line {line} is out of range (expected 1..={max})")]
    LineOutOfRange { line: usize, max: usize },
    #[error("source must be re-parsed before this operation")]
    Stale,
}

impl From<MutationError> for FlowError {
    fn from(e: MutationError) -> Self {
        let line = match &e {
            MutationError::PatternNotMatched { line, .. }
            | MutationError::MultiLineValue { line, .. }
            | MutationError::LineOutOfRange { line, .. } => Some(*line),
            MutationError::VariableNotFound(_) | MutationError::Stale => None,
        };
        let code = match &e {
            MutationError::VariableNotFound(_) => "M001",
            MutationError::PatternNotMatched { .. } => "M002",
            MutationError::MultiLineValue { .. } => "M003",
            MutationError::LineOutOfRange { .. } => "M004",
            MutationError::Stale => "M005",
        };
        FlowError {
            code: code.into(),
            phase: Phase::Mutate,
            message: e.to_string(),
            line,
        }
    }
}
