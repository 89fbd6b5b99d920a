//! Analysis result model and its invariant checks.

pub mod types;
pub mod validate;

pub use types::*;
pub use validate::{ValidationError, validate_analysis, validate_reachable_bubbles};
